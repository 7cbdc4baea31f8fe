//! Long/short pair adapter.
//!
//! Models a collateralized derivative pair: depositing collateral mints
//! equal amounts of a long and a short token, and at expiry a settlement
//! price decides how the locked collateral splits between the two sides.
//! Exit is gated on the instrument itself - the pair must be expired AND
//! the settlement price must have been received - independent of the
//! owning strategy's duration timer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{AccountId, Amount, AssetId, IntegrationId, OperationType, Rate};
use crate::error::IntegrationError;
use crate::integration::{EnterCall, ExecutionContext, IntegrationAdapter, PositionReceipt};
use crate::oracle::PriceOracle;

/// Which side(s) of the pair a strategy leg holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PairLeg {
    /// Hold both tokens; payout is the full collateral regardless of
    /// settlement.
    #[default]
    Pair,
    /// Sell the short side at entry, hold long only.
    Long,
    /// Sell the long side at entry, hold short only.
    Short,
}

/// Definition of one long/short pair instrument.
#[derive(Debug, Clone)]
pub struct LongShortInstrument {
    pub collateral: AssetId,
    pub long_token: AssetId,
    pub short_token: AssetId,
    /// Collateral locked per long+short pair minted.
    pub collateral_per_pair: Amount,
    /// Expiry of the instrument; no settlement before this.
    pub expiry: DateTime<Utc>,
    /// The settlement price is the price of this asset in collateral.
    pub settlement_base: AssetId,
    /// Settlement at or below the floor pays the long side nothing.
    pub floor: Rate,
    /// Settlement at or above the cap pays the long side everything.
    pub cap: Rate,
}

impl LongShortInstrument {
    /// Fraction of collateral paid to the long side for a settlement
    /// price, linear between floor and cap.
    #[must_use]
    pub fn long_payout_fraction(&self, settlement: Rate) -> Decimal {
        if self.cap <= self.floor {
            return Decimal::ONE;
        }
        ((settlement - self.floor) / (self.cap - self.floor))
            .clamp(Decimal::ZERO, Decimal::ONE)
    }
}

/// Parameters a strategy operation binds to this adapter.
#[derive(Debug, Deserialize)]
struct PairParams {
    instrument: String,
    #[serde(default)]
    leg: PairLeg,
}

/// Position detail stored on the receipt.
#[derive(Debug, Serialize, Deserialize)]
struct PairPosition {
    instrument: String,
    leg: PairLeg,
    long_tokens: Amount,
    short_tokens: Amount,
    /// Collateral raised by selling the unwanted side at entry; sits on
    /// the strategy account until exit.
    #[serde(default)]
    collateral_held: Amount,
}

/// Adapter over a set of named long/short pair instruments.
pub struct LongShortPairAdapter {
    instruments: BTreeMap<String, LongShortInstrument>,
}

impl LongShortPairAdapter {
    /// Create an adapter over the given instruments.
    #[must_use]
    pub fn new(instruments: BTreeMap<String, LongShortInstrument>) -> Self {
        Self { instruments }
    }

    /// Ledger account custodying an instrument's locked collateral.
    #[must_use]
    pub fn custody_account(instrument: &str) -> AccountId {
        AccountId::new(format!("lsp:{instrument}"))
    }

    fn id(&self) -> IntegrationId {
        IntegrationId::from(self.name())
    }

    fn decode_params(&self, params: &serde_json::Value) -> Result<PairParams, IntegrationError> {
        serde_json::from_value(params.clone()).map_err(|e| IntegrationError::InvalidParams {
            integration: self.id(),
            reason: e.to_string(),
        })
    }

    fn instrument(&self, name: &str) -> Result<&LongShortInstrument, IntegrationError> {
        self.instruments
            .get(name)
            .ok_or_else(|| IntegrationError::InvalidParams {
                integration: self.id(),
                reason: format!("unknown instrument '{name}'"),
            })
    }

    /// Settlement print for an instrument, if one has been received
    /// at-or-after expiry.
    fn settlement(
        &self,
        oracle: &dyn PriceOracle,
        instrument: &LongShortInstrument,
    ) -> Option<Rate> {
        match oracle.latest_price(&instrument.settlement_base, &instrument.collateral) {
            Ok(print) if print.timestamp >= instrument.expiry => Some(print.rate),
            _ => None,
        }
    }

    /// Swap helper with a floor derived from the oracle price and the
    /// strategy's slippage ceiling, when a price exists.
    fn swap_with_guard(
        ctx: &mut ExecutionContext<'_>,
        token_in: &AssetId,
        token_out: &AssetId,
        amount_in: Amount,
    ) -> Result<Amount, IntegrationError> {
        let min_out = ctx
            .oracle
            .latest_price(token_in, token_out)
            .map(|p| amount_in * p.rate * (Decimal::ONE - ctx.max_trade_slippage_pct))
            .unwrap_or(Decimal::ZERO);
        ctx.exchange.swap(
            ctx.ledger,
            ctx.strategy_account,
            token_in,
            token_out,
            amount_in,
            min_out,
        )
    }
}

impl IntegrationAdapter for LongShortPairAdapter {
    fn name(&self) -> &'static str {
        "long_short_pair"
    }

    fn supports(&self, op_type: OperationType) -> bool {
        matches!(
            op_type,
            OperationType::Pair | OperationType::Long | OperationType::Short | OperationType::Custom
        )
    }

    fn validate_params(&self, params: &serde_json::Value) -> Result<(), IntegrationError> {
        let decoded = self.decode_params(params)?;
        self.instrument(&decoded.instrument)?;
        Ok(())
    }

    fn enter_position(
        &self,
        ctx: &mut ExecutionContext<'_>,
        call: &EnterCall<'_>,
    ) -> Result<PositionReceipt, IntegrationError> {
        let decoded = self.decode_params(call.params)?;
        let instrument = self.instrument(&decoded.instrument)?;

        let collateral = if &instrument.collateral == ctx.reserve {
            call.capital
        } else {
            Self::swap_with_guard(ctx, ctx.reserve, &instrument.collateral, call.capital)?
        };

        // Lock collateral, mint both sides of the pair.
        let pairs = collateral / instrument.collateral_per_pair;
        ctx.ledger.transfer(
            ctx.strategy_account,
            &Self::custody_account(&decoded.instrument),
            &instrument.collateral,
            collateral,
        )?;
        ctx.ledger
            .mint(ctx.strategy_account, &instrument.long_token, pairs);
        ctx.ledger
            .mint(ctx.strategy_account, &instrument.short_token, pairs);

        // Single-sided legs sell the unwanted token back to the market
        // for collateral; the raised collateral rides along until exit.
        let (long_tokens, short_tokens, collateral_held) = match decoded.leg {
            PairLeg::Pair => (pairs, pairs, Decimal::ZERO),
            PairLeg::Long => {
                let raised = Self::swap_with_guard(
                    ctx,
                    &instrument.short_token,
                    &instrument.collateral,
                    pairs,
                )?;
                (pairs, Decimal::ZERO, raised)
            }
            PairLeg::Short => {
                let raised = Self::swap_with_guard(
                    ctx,
                    &instrument.long_token,
                    &instrument.collateral,
                    pairs,
                )?;
                (Decimal::ZERO, pairs, raised)
            }
        };

        let mut holdings = Vec::new();
        if !long_tokens.is_zero() {
            holdings.push((instrument.long_token.clone(), long_tokens));
        }
        if !short_tokens.is_zero() {
            holdings.push((instrument.short_token.clone(), short_tokens));
        }
        if !collateral_held.is_zero() {
            holdings.push((instrument.collateral.clone(), collateral_held));
        }

        let detail = serde_json::to_value(PairPosition {
            instrument: decoded.instrument,
            leg: decoded.leg,
            long_tokens,
            short_tokens,
            collateral_held,
        })
        .map_err(|e| IntegrationError::AdapterFailed {
            integration: self.id(),
            reason: e.to_string(),
        })?;

        Ok(PositionReceipt {
            integration: self.id(),
            strategy: call.strategy,
            holdings,
            entered_at: ctx.now,
            detail,
        })
    }

    fn can_exit(
        &self,
        oracle: &dyn PriceOracle,
        now: DateTime<Utc>,
        receipt: &PositionReceipt,
    ) -> Result<bool, IntegrationError> {
        let position: PairPosition =
            serde_json::from_value(receipt.detail.clone()).map_err(|e| {
                IntegrationError::InvalidParams {
                    integration: self.id(),
                    reason: e.to_string(),
                }
            })?;
        let instrument = self.instrument(&position.instrument)?;

        if now < instrument.expiry {
            return Ok(false);
        }
        Ok(self.settlement(oracle, instrument).is_some())
    }

    fn exit_position(
        &self,
        ctx: &mut ExecutionContext<'_>,
        receipt: &PositionReceipt,
        min_return: Amount,
    ) -> Result<Amount, IntegrationError> {
        let position: PairPosition =
            serde_json::from_value(receipt.detail.clone()).map_err(|e| {
                IntegrationError::InvalidParams {
                    integration: self.id(),
                    reason: e.to_string(),
                }
            })?;
        let instrument = self.instrument(&position.instrument)?;

        if ctx.now < instrument.expiry {
            return Err(IntegrationError::ExitNotReady {
                reason: format!(
                    "instrument '{}' expires at {}",
                    position.instrument, instrument.expiry
                ),
            });
        }
        let Some(settlement) = self.settlement(ctx.oracle, instrument) else {
            return Err(IntegrationError::ExitNotReady {
                reason: format!(
                    "no settlement price received for '{}' since expiry",
                    position.instrument
                ),
            });
        };

        let long_fraction = instrument.long_payout_fraction(settlement);
        let per_pair = instrument.collateral_per_pair;
        let payout = position.long_tokens * long_fraction * per_pair
            + position.short_tokens * (Decimal::ONE - long_fraction) * per_pair;

        // Burn the redeemed tokens, release their collateral from custody.
        if !position.long_tokens.is_zero() {
            ctx.ledger
                .burn(ctx.strategy_account, &instrument.long_token, position.long_tokens)?;
        }
        if !position.short_tokens.is_zero() {
            ctx.ledger.burn(
                ctx.strategy_account,
                &instrument.short_token,
                position.short_tokens,
            )?;
        }
        ctx.ledger.transfer(
            &Self::custody_account(&position.instrument),
            ctx.strategy_account,
            &instrument.collateral,
            payout,
        )?;

        let total_collateral = payout + position.collateral_held;
        let proceeds = if &instrument.collateral == ctx.reserve {
            total_collateral
        } else {
            Self::swap_with_guard(ctx, &instrument.collateral, ctx.reserve, total_collateral)?
        };

        if proceeds < min_return {
            return Err(IntegrationError::SlippageExceeded {
                received: proceeds,
                minimum: min_return,
            });
        }
        Ok(proceeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::PricePoint;
    use parking_lot::RwLock;
    use rust_decimal_macros::dec;

    struct TableOracle {
        prices: RwLock<BTreeMap<(AssetId, AssetId), PricePoint>>,
    }

    impl TableOracle {
        fn new() -> Self {
            Self {
                prices: RwLock::new(BTreeMap::new()),
            }
        }

        fn set(&self, base: &str, quote: &str, rate: Decimal, at: DateTime<Utc>) {
            self.prices.write().insert(
                (AssetId::from(base), AssetId::from(quote)),
                PricePoint::new(rate, at),
            );
        }
    }

    impl PriceOracle for TableOracle {
        fn latest_price(
            &self,
            base: &AssetId,
            quote: &AssetId,
        ) -> Result<PricePoint, IntegrationError> {
            self.prices
                .read()
                .get(&(base.clone(), quote.clone()))
                .copied()
                .ok_or_else(|| IntegrationError::PriceUnavailable {
                    base: base.to_string(),
                    quote: quote.to_string(),
                })
        }
    }

    fn expiry() -> DateTime<Utc> {
        "2026-06-21T00:00:00Z".parse().unwrap()
    }

    fn instrument() -> LongShortInstrument {
        LongShortInstrument {
            collateral: AssetId::from("USDC"),
            long_token: AssetId::from("GROWTH-L"),
            short_token: AssetId::from("GROWTH-S"),
            collateral_per_pair: dec!(1),
            expiry: expiry(),
            settlement_base: AssetId::from("GROWTH"),
            floor: dec!(0),
            cap: dec!(2),
        }
    }

    fn adapter() -> LongShortPairAdapter {
        let mut instruments = BTreeMap::new();
        instruments.insert("GROWTH-0621".to_string(), instrument());
        LongShortPairAdapter::new(instruments)
    }

    fn receipt() -> PositionReceipt {
        PositionReceipt {
            integration: IntegrationId::from("long_short_pair"),
            strategy: crate::domain::StrategyId::new(1),
            holdings: vec![
                (AssetId::from("GROWTH-L"), dec!(10)),
                (AssetId::from("GROWTH-S"), dec!(10)),
            ],
            entered_at: expiry() - chrono::Duration::days(30),
            detail: serde_json::json!({
                "instrument": "GROWTH-0621",
                "leg": "pair",
                "long_tokens": "10",
                "short_tokens": "10",
            }),
        }
    }

    #[test]
    fn payout_fraction_linear_between_floor_and_cap() {
        let inst = instrument();
        assert_eq!(inst.long_payout_fraction(dec!(-1)), dec!(0));
        assert_eq!(inst.long_payout_fraction(dec!(0)), dec!(0));
        assert_eq!(inst.long_payout_fraction(dec!(1)), dec!(0.5));
        assert_eq!(inst.long_payout_fraction(dec!(2)), dec!(1));
        assert_eq!(inst.long_payout_fraction(dec!(5)), dec!(1));
    }

    #[test]
    fn cannot_exit_before_expiry() {
        let adapter = adapter();
        let oracle = TableOracle::new();
        oracle.set("GROWTH", "USDC", dec!(1.2), expiry() + chrono::Duration::hours(1));

        let before = expiry() - chrono::Duration::days(1);
        assert!(!adapter.can_exit(&oracle, before, &receipt()).unwrap());
    }

    #[test]
    fn cannot_exit_without_settlement_print() {
        let adapter = adapter();
        let oracle = TableOracle::new();

        let after = expiry() + chrono::Duration::days(1);
        assert!(!adapter.can_exit(&oracle, after, &receipt()).unwrap());
    }

    #[test]
    fn stale_print_does_not_settle() {
        let adapter = adapter();
        let oracle = TableOracle::new();
        // A print from before expiry is not a settlement.
        oracle.set("GROWTH", "USDC", dec!(1.2), expiry() - chrono::Duration::days(2));

        let after = expiry() + chrono::Duration::days(1);
        assert!(!adapter.can_exit(&oracle, after, &receipt()).unwrap());
    }

    #[test]
    fn exit_ready_after_expiry_and_print() {
        let adapter = adapter();
        let oracle = TableOracle::new();
        oracle.set("GROWTH", "USDC", dec!(1.2), expiry() + chrono::Duration::hours(1));

        let after = expiry() + chrono::Duration::days(1);
        assert!(adapter.can_exit(&oracle, after, &receipt()).unwrap());
    }

    #[test]
    fn rejects_unknown_instrument() {
        let adapter = adapter();
        assert!(adapter
            .validate_params(&serde_json::json!({"instrument": "nope"}))
            .is_err());
        assert!(adapter
            .validate_params(&serde_json::json!({"instrument": "GROWTH-0621", "leg": "long"}))
            .is_ok());
    }
}
