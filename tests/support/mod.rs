//! Shared helpers for integration tests.

#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use verdant::domain::{GardenId, IntegrationId, OperationType, StrategyId, StrategyState};
use verdant::engine::AddStrategyParams;
use verdant::testkit::world::{self, World};

/// A world with a seeded garden: alice created it with 1 WETH and then
/// deposited another 1 WETH, so she holds 2 shares of 2 total.
pub fn garden_world() -> (World, GardenId) {
    let mut w = world::world();
    let garden = world::seeded_garden(&mut w, &world::alice());
    w.engine
        .deposit(
            &world::alice(),
            garden,
            dec!(1),
            Decimal::ZERO,
            &world::alice(),
            None,
        )
        .expect("deposit succeeds");
    (w, garden)
}

/// Proposal parameters with a single vault operation.
pub fn vault_strategy() -> AddStrategyParams {
    AddStrategyParams {
        title: "Park reserve in the vault".to_string(),
        tag: "\u{1f331}".to_string(),
        financial: world::strategy_params(),
        op_types: vec![OperationType::Vault],
        op_integrations: vec![IntegrationId::from("vault")],
        op_params: vec![serde_json::json!({"vault": "weth-vault"})],
    }
}

/// Proposal parameters with long and short legs on the pair instrument.
pub fn long_short_strategy() -> AddStrategyParams {
    AddStrategyParams {
        title: "Execute my custom integration".to_string(),
        tag: "\u{1f48e}".to_string(),
        financial: world::strategy_params(),
        op_types: vec![OperationType::Long, OperationType::Short],
        op_integrations: vec![
            IntegrationId::from("long_short_pair"),
            IntegrationId::from("long_short_pair"),
        ],
        op_params: vec![
            serde_json::json!({"instrument": "GROWTH-0621", "leg": "long"}),
            serde_json::json!({"instrument": "GROWTH-0621", "leg": "short"}),
        ],
    }
}

/// Propose, vote through, and wait out the cooldown so the strategy is
/// ready to execute.
pub fn ready_strategy(w: &mut World, garden: GardenId, params: AddStrategyParams) -> StrategyId {
    let strategy = w
        .engine
        .add_strategy(&world::alice(), garden, params)
        .expect("proposal succeeds");

    let power = w.engine.garden(garden).unwrap().voting_power(&world::alice());
    let state = w
        .engine
        .resolve_voting(
            &world::keeper(),
            strategy,
            &[(world::alice(), power)],
            Decimal::ZERO,
        )
        .expect("resolution succeeds");
    assert_eq!(state, StrategyState::Resolved);

    // Policy cooldown is one day.
    w.engine.advance_time(86_400);
    strategy
}
