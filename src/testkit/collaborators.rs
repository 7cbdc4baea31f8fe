//! In-memory collaborator stubs for tests and simulations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::domain::{AccountId, Amount, AssetId, Rate};
use crate::error::IntegrationError;
use crate::exchange::Exchange;
use crate::ledger::Ledger;
use crate::oracle::{PriceOracle, PricePoint};

/// Oracle backed by a mutable price table.
///
/// Pairs with no entry report [`IntegrationError::PriceUnavailable`],
/// which is how tests model "settlement price not yet received".
#[derive(Default)]
pub struct StaticOracle {
    prices: RwLock<BTreeMap<(AssetId, AssetId), PricePoint>>,
}

impl StaticOracle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a price print for a pair.
    pub fn set_price(&self, base: &AssetId, quote: &AssetId, rate: Rate, at: DateTime<Utc>) {
        self.prices
            .write()
            .insert((base.clone(), quote.clone()), PricePoint::new(rate, at));
    }

    /// Remove a pair's print entirely.
    pub fn clear_price(&self, base: &AssetId, quote: &AssetId) {
        self.prices.write().remove(&(base.clone(), quote.clone()));
    }
}

impl PriceOracle for StaticOracle {
    fn latest_price(&self, base: &AssetId, quote: &AssetId) -> Result<PricePoint, IntegrationError> {
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

/// Exchange that fills any configured pair at a fixed rate with
/// unlimited depth.
#[derive(Default)]
pub struct ConstantRateExchange {
    rates: RwLock<BTreeMap<(AssetId, AssetId), Rate>>,
}

impl ConstantRateExchange {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rate for a pair and its inverse.
    pub fn set_rate(&self, token_in: &AssetId, token_out: &AssetId, rate: Rate) {
        let mut rates = self.rates.write();
        rates.insert((token_in.clone(), token_out.clone()), rate);
        if !rate.is_zero() {
            rates.insert((token_out.clone(), token_in.clone()), Decimal::ONE / rate);
        }
    }
}

impl Exchange for ConstantRateExchange {
    fn swap(
        &self,
        ledger: &mut Ledger,
        account: &AccountId,
        token_in: &AssetId,
        token_out: &AssetId,
        amount_in: Amount,
        min_out: Amount,
    ) -> Result<Amount, IntegrationError> {
        let rate = self
            .rates
            .read()
            .get(&(token_in.clone(), token_out.clone()))
            .copied()
            .ok_or_else(|| IntegrationError::PriceUnavailable {
                base: token_in.to_string(),
                quote: token_out.to_string(),
            })?;

        let amount_out = amount_in * rate;
        if amount_out < min_out {
            return Err(IntegrationError::SlippageExceeded {
                received: amount_out,
                minimum: min_out,
            });
        }

        ledger.burn(account, token_in, amount_in)?;
        ledger.mint(account, token_out, amount_out);
        Ok(amount_out)
    }

    fn add_liquidity(
        &self,
        ledger: &mut Ledger,
        account: &AccountId,
        token_a: &AssetId,
        token_b: &AssetId,
        amount_a: Amount,
        amount_b: Amount,
    ) -> Result<(), IntegrationError> {
        // Depth is unlimited; providing liquidity just escrows the tokens.
        ledger.burn(account, token_a, amount_a)?;
        ledger.burn(account, token_b, amount_b)?;
        Ok(())
    }

    fn venue_name(&self) -> &'static str {
        "constant_rate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn swap_applies_rate_and_checks_slippage() {
        let exchange = ConstantRateExchange::new();
        let weth = AssetId::from("WETH");
        let usdc = AssetId::from("USDC");
        exchange.set_rate(&weth, &usdc, dec!(2000));

        let mut ledger = Ledger::new();
        let alice = AccountId::from("alice");
        ledger.mint(&alice, &weth, dec!(1));

        let out = exchange
            .swap(&mut ledger, &alice, &weth, &usdc, dec!(1), dec!(1900))
            .unwrap();
        assert_eq!(out, dec!(2000));
        assert_eq!(ledger.balance(&alice, &usdc), dec!(2000));

        ledger.mint(&alice, &usdc, dec!(0));
        let err = exchange
            .swap(&mut ledger, &alice, &usdc, &weth, dec!(2000), dec!(1.1))
            .unwrap_err();
        assert!(matches!(err, IntegrationError::SlippageExceeded { .. }));
    }

    #[test]
    fn oracle_reports_missing_pairs() {
        let oracle = StaticOracle::new();
        let weth = AssetId::from("WETH");
        let usdc = AssetId::from("USDC");

        assert!(matches!(
            oracle.latest_price(&weth, &usdc),
            Err(IntegrationError::PriceUnavailable { .. })
        ));

        let now = Utc::now();
        oracle.set_price(&weth, &usdc, dec!(2000), now);
        let print = oracle.latest_price(&weth, &usdc).unwrap();
        assert_eq!(print.rate, dec!(2000));
        assert_eq!(print.timestamp, now);

        oracle.clear_price(&weth, &usdc);
        assert!(oracle.latest_price(&weth, &usdc).is_err());
    }
}
