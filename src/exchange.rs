//! Exchange collaborator trait.
//!
//! Swaps and liquidity provision execute against the shared ledger so
//! they participate in the engine's clone-run-commit atomicity.

use crate::domain::{AccountId, Amount, AssetId};
use crate::error::IntegrationError;
use crate::ledger::Ledger;

/// A venue that converts between assets for a ledger account.
pub trait Exchange: Send + Sync {
    /// Swap `amount_in` of `token_in` for `token_out` on behalf of
    /// `account`, failing with [`IntegrationError::SlippageExceeded`]
    /// when the output falls short of `min_out`.
    fn swap(
        &self,
        ledger: &mut Ledger,
        account: &AccountId,
        token_in: &AssetId,
        token_out: &AssetId,
        amount_in: Amount,
        min_out: Amount,
    ) -> Result<Amount, IntegrationError>;

    /// Provide liquidity for a pair on behalf of `account`.
    fn add_liquidity(
        &self,
        ledger: &mut Ledger,
        account: &AccountId,
        token_a: &AssetId,
        token_b: &AssetId,
        amount_a: Amount,
        amount_b: Amount,
    ) -> Result<(), IntegrationError>;

    /// Venue name for logging.
    fn venue_name(&self) -> &'static str;
}
