//! End-to-end tests for strategies flowing through integration adapters,
//! exercising the two-layer exit gate on the long/short pair instrument.

mod support;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use verdant::domain::{AssetId, IntegrationId, OperationType, StrategyState};
use verdant::engine::AddStrategyParams;
use verdant::error::{Error, TimingError};
use verdant::testkit::world::{self, alice, keeper, usdc, weth, World};

use support::{garden_world, long_short_strategy, ready_strategy};

fn growth_l() -> AssetId {
    AssetId::from("GROWTH-L")
}

fn growth_s() -> AssetId {
    AssetId::from("GROWTH-S")
}

fn growth() -> AssetId {
    AssetId::from("GROWTH")
}

/// Quote both pair tokens against collateral so single-sided legs can
/// sell their unwanted side.
fn seed_pair_liquidity(w: &World) {
    w.exchange.set_rate(&growth_l(), &usdc(), dec!(0.6));
    w.exchange.set_rate(&growth_s(), &usdc(), dec!(0.4));
}

/// Strategy with a single long leg on the canonical pair instrument.
fn long_only_strategy() -> AddStrategyParams {
    AddStrategyParams {
        title: "Long growth".to_string(),
        tag: "\u{1f4c8}".to_string(),
        financial: world::strategy_params(),
        op_types: vec![OperationType::Long],
        op_integrations: vec![IntegrationId::from("long_short_pair")],
        op_params: vec![serde_json::json!({"instrument": "GROWTH-0621", "leg": "long"})],
    }
}

/// Publish a settlement print at-or-after expiry and return its rate.
fn settle(w: &World, rate: Decimal) {
    w.oracle
        .set_price(&growth(), &usdc(), rate, world::pair_expiry());
}

#[test]
fn two_leg_execution_produces_receipts_per_leg() {
    let (mut w, garden) = garden_world();
    seed_pair_liquidity(&w);
    let id = ready_strategy(&mut w, garden, long_short_strategy());

    w.engine
        .execute_strategy(&keeper(), id, dec!(1), Decimal::ZERO)
        .unwrap();

    let s = w.engine.strategy(id).unwrap();
    assert_eq!(s.positions().len(), 2);
    for receipt in s.positions() {
        assert!(!receipt.holdings.is_empty());
        assert!(receipt.holdings.iter().all(|(_, qty)| *qty > Decimal::ZERO));
    }

    // 0.5 WETH per leg at 2000 mints 1000 pairs; each leg keeps its own
    // side and the collateral raised by selling the other.
    let account = s.account();
    assert_eq!(w.engine.ledger().balance(&account, &growth_l()), dec!(1000));
    assert_eq!(w.engine.ledger().balance(&account, &growth_s()), dec!(1000));
    assert_eq!(w.engine.ledger().balance(&account, &usdc()), dec!(1000));
}

#[test]
fn finalize_gated_until_expiry_and_settlement() {
    let (mut w, garden) = garden_world();
    seed_pair_liquidity(&w);
    let id = ready_strategy(&mut w, garden, long_short_strategy());
    w.engine
        .execute_strategy(&keeper(), id, dec!(1), Decimal::ZERO)
        .unwrap();

    // Strategy duration (30d) has elapsed but the pair expires at day 60:
    // the instrument gate holds even though the strategy timer is done.
    w.engine.advance_time(30 * 86_400);
    let err = w
        .engine
        .finalize_strategy(&keeper(), id, Decimal::ZERO, Decimal::ZERO)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Timing(TimingError::ExitPreconditionNotMet { .. })
    ));

    // Past expiry but no settlement print yet: still gated.
    w.engine.advance_time(30 * 86_400);
    let err = w
        .engine
        .finalize_strategy(&keeper(), id, Decimal::ZERO, Decimal::ZERO)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Timing(TimingError::ExitPreconditionNotMet { .. })
    ));
    assert_eq!(w.engine.strategy(id).unwrap().state(), StrategyState::Executed);

    // Settlement received: the gate opens.
    settle(&w, dec!(1.2));
    let outcome = w
        .engine
        .finalize_strategy(&keeper(), id, Decimal::ZERO, Decimal::ZERO)
        .unwrap();

    // At 1.2 the long fraction is 0.6; each leg redeems its side plus the
    // collateral it raised at entry, so both come back whole.
    assert_eq!(outcome.proceeds, dec!(1.0));
    assert_eq!(outcome.profit, Decimal::ZERO);
    assert_eq!(w.engine.strategy(id).unwrap().state(), StrategyState::Finalized);

    let garden_account = w.engine.garden(garden).unwrap().account();
    assert_eq!(
        w.engine.ledger().balance(&garden_account, &weth()),
        dec!(2)
    );
}

#[test]
fn long_leg_profits_when_settlement_runs_high() {
    let (mut w, garden) = garden_world();
    seed_pair_liquidity(&w);
    let id = ready_strategy(&mut w, garden, long_only_strategy());
    w.engine
        .execute_strategy(&keeper(), id, dec!(1), Decimal::ZERO)
        .unwrap();

    let alice_before = w.engine.ledger().balance(&alice(), &weth());
    w.engine.advance_time(60 * 86_400);
    settle(&w, dec!(1.8));

    let outcome = w
        .engine
        .finalize_strategy(&keeper(), id, Decimal::ZERO, Decimal::ZERO)
        .unwrap();

    // 2000 pairs, short side sold for 800 USDC at entry. Settlement 1.8
    // pays the long side 0.9: 1800 + 800 = 2600 USDC = 1.3 WETH.
    assert_eq!(outcome.proceeds, dec!(1.3));
    assert_eq!(outcome.profit, dec!(0.3));
    assert_eq!(outcome.strategist_cut, dec!(0.03));
    assert_eq!(outcome.steward_cut, dec!(0.015));
    assert_eq!(
        w.engine.ledger().balance(&alice(), &weth()),
        alice_before + dec!(0.045)
    );

    // Profitable exit releases the stake intact.
    let g = w.engine.garden(garden).unwrap();
    assert_eq!(g.member(&alice()).unwrap().locked(), Decimal::ZERO);
    assert_eq!(g.total_shares(), dec!(2));
}

#[test]
fn long_leg_loss_slashes_proposer_stake() {
    let (mut w, garden) = garden_world();
    seed_pair_liquidity(&w);
    let id = ready_strategy(&mut w, garden, long_only_strategy());
    w.engine
        .execute_strategy(&keeper(), id, dec!(1), Decimal::ZERO)
        .unwrap();

    w.engine.advance_time(60 * 86_400);
    settle(&w, dec!(0.2));

    let outcome = w
        .engine
        .finalize_strategy(&keeper(), id, Decimal::ZERO, Decimal::ZERO)
        .unwrap();

    // Long fraction 0.1: 200 + 800 = 1000 USDC = 0.5 WETH back on 1 in.
    assert_eq!(outcome.proceeds, dec!(0.5));
    assert_eq!(outcome.profit, dec!(-0.5));
    assert_eq!(outcome.strategist_cut, Decimal::ZERO);
    assert_eq!(outcome.steward_cut, Decimal::ZERO);

    // The whole 0.1 stake burns; the loss in shares exceeds it.
    let g = w.engine.garden(garden).unwrap();
    let member = g.member(&alice()).unwrap();
    assert_eq!(member.shares(), dec!(1.9));
    assert_eq!(member.locked(), Decimal::ZERO);
    assert_eq!(g.total_shares(), dec!(1.9));
}

#[test]
fn settlement_print_from_before_expiry_does_not_open_gate() {
    let (mut w, garden) = garden_world();
    seed_pair_liquidity(&w);
    let id = ready_strategy(&mut w, garden, long_short_strategy());
    w.engine
        .execute_strategy(&keeper(), id, dec!(1), Decimal::ZERO)
        .unwrap();

    // A pre-expiry print must not count as settlement.
    w.oracle.set_price(
        &growth(),
        &usdc(),
        dec!(1.2),
        world::pair_expiry() - chrono::Duration::days(1),
    );
    w.engine.advance_time(60 * 86_400);

    let err = w
        .engine
        .finalize_strategy(&keeper(), id, Decimal::ZERO, Decimal::ZERO)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Timing(TimingError::ExitPreconditionNotMet { .. })
    ));
}

#[test]
fn vault_strategy_accrues_interest_end_to_end() {
    let (mut w, garden) = garden_world();
    let id = ready_strategy(&mut w, garden, support::vault_strategy());
    w.engine
        .execute_strategy(&keeper(), id, dec!(1), Decimal::ZERO)
        .unwrap();

    // The vault pays 1e-9 per second over the 30-day duration.
    w.engine.advance_time(30 * 86_400);
    let outcome = w
        .engine
        .finalize_strategy(&keeper(), id, Decimal::ZERO, Decimal::ZERO)
        .unwrap();

    assert_eq!(outcome.proceeds, dec!(1.002592));
    assert_eq!(outcome.profit, dec!(0.002592));
    assert!(w.engine.garden_nav(garden).unwrap() > dec!(2));
}
