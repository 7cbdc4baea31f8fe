//! Price oracle collaborator.
//!
//! Adapters consult the oracle for exchange rates and for settlement
//! prints of expiring instruments. The engine itself never interprets
//! prices; exit preconditions belong to the adapters.

use chrono::{DateTime, Utc};

use crate::domain::{AssetId, Rate};
use crate::error::IntegrationError;

/// A single observed price with its observation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    pub rate: Rate,
    pub timestamp: DateTime<Utc>,
}

impl PricePoint {
    #[must_use]
    pub fn new(rate: Rate, timestamp: DateTime<Utc>) -> Self {
        Self { rate, timestamp }
    }
}

/// Source of pair prices.
pub trait PriceOracle: Send + Sync {
    /// Latest price of `base` quoted in `quote`.
    ///
    /// Returns [`IntegrationError::PriceUnavailable`] when no print
    /// exists for the pair, which adapters treat as "price has not been
    /// received".
    fn latest_price(&self, base: &AssetId, quote: &AssetId) -> Result<PricePoint, IntegrationError>;
}
