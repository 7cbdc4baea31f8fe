//! Interest-bearing vault adapter.
//!
//! Models the simplest external protocol: capital goes into a vault and
//! accrues linear interest per second. The vault has no expiry, so its
//! exit precondition always holds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{AccountId, Amount, AssetId, IntegrationId, OperationType, Rate};
use crate::error::IntegrationError;
use crate::integration::{EnterCall, ExecutionContext, IntegrationAdapter, PositionReceipt};
use crate::oracle::PriceOracle;

/// A single vault definition.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// Asset the vault accepts and pays out.
    pub asset: AssetId,
    /// Linear interest per second, as a fraction of principal.
    pub rate_per_sec: Rate,
}

/// Parameters a strategy operation binds to this adapter.
#[derive(Debug, Deserialize)]
struct VaultParams {
    vault: String,
}

/// Position detail stored on the receipt.
#[derive(Debug, Serialize, Deserialize)]
struct VaultPosition {
    vault: String,
    principal: Amount,
}

/// Adapter over a set of named vaults.
pub struct VaultAdapter {
    vaults: BTreeMap<String, VaultConfig>,
}

impl VaultAdapter {
    /// Create an adapter over the given vaults.
    #[must_use]
    pub fn new(vaults: BTreeMap<String, VaultConfig>) -> Self {
        Self { vaults }
    }

    /// Ledger account that custodies a vault's principal.
    #[must_use]
    pub fn vault_account(vault: &str) -> AccountId {
        AccountId::new(format!("vault:{vault}"))
    }

    fn id(&self) -> IntegrationId {
        IntegrationId::from(self.name())
    }

    fn decode_params(&self, params: &serde_json::Value) -> Result<VaultParams, IntegrationError> {
        serde_json::from_value(params.clone()).map_err(|e| IntegrationError::InvalidParams {
            integration: self.id(),
            reason: e.to_string(),
        })
    }

    fn vault(&self, name: &str) -> Result<&VaultConfig, IntegrationError> {
        self.vaults
            .get(name)
            .ok_or_else(|| IntegrationError::InvalidParams {
                integration: self.id(),
                reason: format!("unknown vault '{name}'"),
            })
    }
}

impl IntegrationAdapter for VaultAdapter {
    fn name(&self) -> &'static str {
        "vault"
    }

    fn supports(&self, op_type: OperationType) -> bool {
        matches!(op_type, OperationType::Vault | OperationType::Custom)
    }

    fn validate_params(&self, params: &serde_json::Value) -> Result<(), IntegrationError> {
        let decoded = self.decode_params(params)?;
        self.vault(&decoded.vault)?;
        Ok(())
    }

    fn enter_position(
        &self,
        ctx: &mut ExecutionContext<'_>,
        call: &EnterCall<'_>,
    ) -> Result<PositionReceipt, IntegrationError> {
        let decoded = self.decode_params(call.params)?;
        let vault = self.vault(&decoded.vault)?;

        // Convert the reserve slice into the vault's asset if they differ.
        let principal = if &vault.asset == ctx.reserve {
            call.capital
        } else {
            let min_out = ctx
                .oracle
                .latest_price(ctx.reserve, &vault.asset)
                .map(|p| call.capital * p.rate * (Decimal::ONE - ctx.max_trade_slippage_pct))
                .unwrap_or(Decimal::ZERO);
            ctx.exchange.swap(
                ctx.ledger,
                ctx.strategy_account,
                ctx.reserve,
                &vault.asset,
                call.capital,
                min_out,
            )?
        };

        ctx.ledger.transfer(
            ctx.strategy_account,
            &Self::vault_account(&decoded.vault),
            &vault.asset,
            principal,
        )?;

        let detail = serde_json::to_value(VaultPosition {
            vault: decoded.vault,
            principal,
        })
        .map_err(|e| IntegrationError::AdapterFailed {
            integration: self.id(),
            reason: e.to_string(),
        })?;

        Ok(PositionReceipt {
            integration: self.id(),
            strategy: call.strategy,
            holdings: vec![(vault.asset.clone(), principal)],
            entered_at: ctx.now,
            detail,
        })
    }

    fn can_exit(
        &self,
        _oracle: &dyn PriceOracle,
        _now: DateTime<Utc>,
        _receipt: &PositionReceipt,
    ) -> Result<bool, IntegrationError> {
        // Vault deposits are redeemable at any time.
        Ok(true)
    }

    fn exit_position(
        &self,
        ctx: &mut ExecutionContext<'_>,
        receipt: &PositionReceipt,
        min_return: Amount,
    ) -> Result<Amount, IntegrationError> {
        let position: VaultPosition =
            serde_json::from_value(receipt.detail.clone()).map_err(|e| {
                IntegrationError::InvalidParams {
                    integration: self.id(),
                    reason: e.to_string(),
                }
            })?;
        let vault = self.vault(&position.vault)?;

        let elapsed = (ctx.now - receipt.entered_at).num_seconds().max(0);
        let interest = position.principal * vault.rate_per_sec * Decimal::from(elapsed);

        // Principal comes back from custody; interest is yield the vault
        // generated externally.
        ctx.ledger.transfer(
            &Self::vault_account(&position.vault),
            ctx.strategy_account,
            &vault.asset,
            position.principal,
        )?;
        ctx.ledger
            .mint(ctx.strategy_account, &vault.asset, interest);

        let payout = position.principal + interest;
        let proceeds = if &vault.asset == ctx.reserve {
            payout
        } else {
            ctx.exchange.swap(
                ctx.ledger,
                ctx.strategy_account,
                &vault.asset,
                ctx.reserve,
                payout,
                Decimal::ZERO,
            )?
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
    use rust_decimal_macros::dec;

    fn adapter() -> VaultAdapter {
        let mut vaults = BTreeMap::new();
        vaults.insert(
            "weth-vault".to_string(),
            VaultConfig {
                asset: AssetId::from("WETH"),
                rate_per_sec: dec!(0.000001),
            },
        );
        VaultAdapter::new(vaults)
    }

    #[test]
    fn validates_known_vault() {
        let adapter = adapter();
        assert!(adapter
            .validate_params(&serde_json::json!({"vault": "weth-vault"}))
            .is_ok());
    }

    #[test]
    fn rejects_unknown_vault() {
        let adapter = adapter();
        let err = adapter
            .validate_params(&serde_json::json!({"vault": "nope"}))
            .unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidParams { .. }));
    }

    #[test]
    fn rejects_malformed_params() {
        let adapter = adapter();
        assert!(adapter
            .validate_params(&serde_json::json!({"vlt": "weth-vault"}))
            .is_err());
    }

    #[test]
    fn supports_vault_and_custom_ops() {
        let adapter = adapter();
        assert!(adapter.supports(OperationType::Vault));
        assert!(adapter.supports(OperationType::Custom));
        assert!(!adapter.supports(OperationType::Pair));
    }
}
