//! In-memory asset ledger.
//!
//! Holds every account's balance per asset. The engine clones the whole
//! ledger as part of its working state before each operation, so any
//! failure mid-operation discards all balance movements at once.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::domain::{AccountId, Amount, AssetId};
use crate::error::IntegrationError;

/// Account balances per asset.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    balances: BTreeMap<(AccountId, AssetId), Amount>,
}

impl Ledger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance, zero for unknown accounts.
    #[must_use]
    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> Amount {
        self.balances
            .get(&(account.clone(), asset.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Create `amount` of `asset` out of thin air for `account`.
    ///
    /// Negative amounts are a caller bug: a negative mint would silently
    /// destroy value.
    pub fn mint(&mut self, account: &AccountId, asset: &AssetId, amount: Amount) {
        debug_assert!(amount >= Decimal::ZERO, "negative mint of {amount}");
        if amount.is_zero() {
            return;
        }
        *self
            .balances
            .entry((account.clone(), asset.clone()))
            .or_insert(Decimal::ZERO) += amount;
    }

    /// Destroy `amount` of `asset` held by `account`.
    pub fn burn(
        &mut self,
        account: &AccountId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<(), IntegrationError> {
        if amount < Decimal::ZERO {
            return Err(IntegrationError::NegativeAmount { amount });
        }
        let held = self.balance(account, asset);
        if held < amount {
            return Err(IntegrationError::InsufficientBalance {
                account: account.clone(),
                asset: asset.to_string(),
                held,
                needed: amount,
            });
        }
        let key = (account.clone(), asset.clone());
        let remaining = held - amount;
        if remaining.is_zero() {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, remaining);
        }
        Ok(())
    }

    /// Move `amount` of `asset` between accounts.
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<(), IntegrationError> {
        self.burn(from, asset, amount)?;
        self.mint(to, asset, amount);
        Ok(())
    }

    /// Total supply of an asset across all accounts.
    #[must_use]
    pub fn total_supply(&self, asset: &AssetId) -> Amount {
        self.balances
            .iter()
            .filter(|((_, a), _)| a == asset)
            .map(|(_, amount)| *amount)
            .sum()
    }
}
