//! Builders for engines, gardens, and strategy parameters.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;

use crate::config::Config;
use crate::domain::{
    AccountId, AssetId, GardenId, GardenPolicy, ProfitSplit, StrategyParams, Visibility,
};
use crate::engine::{CreateGardenParams, Engine};
use crate::integration::{
    IntegrationRegistry, LongShortInstrument, LongShortPairAdapter, VaultAdapter, VaultConfig,
};
use crate::testkit::collaborators::{ConstantRateExchange, StaticOracle};

/// Fixed genesis instant so tests are deterministic.
#[must_use]
pub fn genesis() -> DateTime<Utc> {
    "2026-01-01T00:00:00Z".parse().expect("valid timestamp")
}

/// Expiry of the canonical test pair instrument.
#[must_use]
pub fn pair_expiry() -> DateTime<Utc> {
    genesis() + Duration::days(60)
}

#[must_use]
pub fn weth() -> AssetId {
    AssetId::from("WETH")
}

#[must_use]
pub fn usdc() -> AssetId {
    AssetId::from("USDC")
}

#[must_use]
pub fn governance() -> AccountId {
    AccountId::from("gov")
}

#[must_use]
pub fn keeper() -> AccountId {
    AccountId::from("keeper")
}

#[must_use]
pub fn alice() -> AccountId {
    AccountId::from("alice")
}

#[must_use]
pub fn bob() -> AccountId {
    AccountId::from("bob")
}

/// Garden policy mirroring the canonical integration scenario: 100 WETH
/// cap, 0.1 minimum, 1-day cooldown, 10% quorum, 3..365-day durations.
#[must_use]
pub fn policy() -> GardenPolicy {
    GardenPolicy {
        max_deposit_limit: dec!(100),
        min_liquidity_asset: dec!(100),
        deposit_hardlock_secs: 1,
        min_contribution: dec!(0.1),
        strategy_cooldown_secs: 86_400,
        min_voter_quorum: dec!(0.10),
        min_strategy_duration_secs: 3 * 86_400,
        max_strategy_duration_secs: 365 * 86_400,
        min_voters: 1,
        custom_integrations_enabled: true,
    }
}

/// Canonical strategy financial parameters: 10 WETH requested, 0.1
/// stake, 30-day duration.
#[must_use]
pub fn strategy_params() -> StrategyParams {
    StrategyParams {
        max_capital_requested: dec!(10),
        stake: dec!(0.1),
        duration_secs: 30 * 86_400,
        expected_return: dec!(0.05),
        max_allocation_pct: dec!(0.5),
        max_gas_fee_pct: dec!(0.05),
        max_trade_slippage_pct: dec!(0.09),
    }
}

/// An engine wired to mutable collaborator stubs.
pub struct World {
    pub engine: Engine,
    pub oracle: Arc<StaticOracle>,
    pub exchange: Arc<ConstantRateExchange>,
}

/// Build an engine with the vault and long/short pair adapters
/// registered, a keeper authorized, and exchange/oracle prices seeded.
#[must_use]
pub fn world() -> World {
    world_with_config(&Config::default())
}

/// Same wiring as [`world`], with engine limits and the policy template
/// taken from `config`.
#[must_use]
pub fn world_with_config(config: &Config) -> World {
    let oracle = Arc::new(StaticOracle::new());
    let exchange = Arc::new(ConstantRateExchange::new());

    exchange.set_rate(&weth(), &usdc(), dec!(2000));
    oracle.set_price(&weth(), &usdc(), dec!(2000), genesis());
    oracle.set_price(&usdc(), &weth(), dec!(0.0005), genesis());

    let mut vaults = BTreeMap::new();
    vaults.insert(
        "weth-vault".to_string(),
        VaultConfig {
            asset: weth(),
            rate_per_sec: dec!(0.000000001),
        },
    );

    let mut instruments = BTreeMap::new();
    instruments.insert(
        "GROWTH-0621".to_string(),
        LongShortInstrument {
            collateral: usdc(),
            long_token: AssetId::from("GROWTH-L"),
            short_token: AssetId::from("GROWTH-S"),
            collateral_per_pair: dec!(1),
            expiry: pair_expiry(),
            settlement_base: AssetId::from("GROWTH"),
            floor: dec!(0),
            cap: dec!(2),
        },
    );

    let mut registry = IntegrationRegistry::new();
    registry.register(Arc::new(VaultAdapter::new(vaults)));
    registry.register(Arc::new(LongShortPairAdapter::new(instruments)));

    let mut engine = Engine::from_config(
        config,
        governance(),
        genesis(),
        registry,
        oracle.clone(),
        exchange.clone(),
    );
    engine
        .add_keeper(&governance(), keeper())
        .expect("governance adds keeper");

    World {
        engine,
        oracle,
        exchange,
    }
}

/// Create a garden seeded with 1 WETH from `creator` (funded with 10).
pub fn seeded_garden(world: &mut World, creator: &AccountId) -> GardenId {
    world.engine.fund(creator, &weth(), dec!(10));
    world
        .engine
        .create_garden(
            creator,
            CreateGardenParams {
                reserve_asset: weth(),
                name: "Fountain".to_string(),
                symbol: "FTN".to_string(),
                metadata_uri: "ipfs://fountain".to_string(),
                policy: policy(),
                visibility: Visibility::default(),
                profit_split: ProfitSplit {
                    strategist_pct: dec!(0),
                    steward_pct: dec!(0),
                },
                initial_contribution: dec!(1),
            },
        )
        .expect("garden creation succeeds")
}
