//! Integration adapter abstraction.
//!
//! Adapters are the pluggable capability that enters and exits positions
//! in external protocols on behalf of a strategy. Each adapter decodes
//! its own opaque parameter blob; the engine never interprets it.
//!
//! # Architecture
//!
//! Each adapter implements the [`IntegrationAdapter`] trait, which defines:
//! - `name()` - Unique identifier for registry lookup and logging
//! - `supports()` - Which operation types the adapter handles
//! - `enter_position()` / `can_exit()` / `exit_position()` - The position
//!   lifecycle
//!
//! The [`IntegrationRegistry`] resolves adapter ids once at proposal time;
//! the binding is immutable for the life of the strategy.

pub mod long_short;
pub mod vault;

pub use long_short::{LongShortInstrument, LongShortPairAdapter, PairLeg};
pub use vault::{VaultAdapter, VaultConfig};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{AccountId, Amount, AssetId, Fraction, GardenId, IntegrationId, OperationType, StrategyId};
use crate::error::IntegrationError;
use crate::exchange::Exchange;
use crate::ledger::Ledger;
use crate::oracle::PriceOracle;

/// Mutable world view handed to an adapter for the duration of one
/// enter or exit call.
///
/// The ledger reference points into the engine's working state clone, so
/// anything an adapter does here is discarded wholesale if the engine
/// call fails later.
pub struct ExecutionContext<'a> {
    pub now: DateTime<Utc>,
    pub ledger: &'a mut Ledger,
    pub oracle: &'a dyn PriceOracle,
    pub exchange: &'a dyn Exchange,
    /// The garden's reserve asset; proceeds must come back in this.
    pub reserve: &'a AssetId,
    /// Ledger account holding the strategy's working capital.
    pub strategy_account: &'a AccountId,
    /// Slippage ceiling from the strategy's financial parameters.
    pub max_trade_slippage_pct: Fraction,
}

/// Inputs to [`IntegrationAdapter::enter_position`].
#[derive(Debug, Clone)]
pub struct EnterCall<'a> {
    pub garden: GardenId,
    pub strategy: StrategyId,
    /// Opaque parameters attached to the operation at proposal time.
    pub params: &'a serde_json::Value,
    /// Capital slice allocated to this leg, in the reserve asset.
    pub capital: Amount,
}

/// Durable artifact of an entered position.
///
/// Receipts are the only state the engine keeps about a position; an
/// adapter must be able to exit from a receipt alone.
#[derive(Debug, Clone)]
pub struct PositionReceipt {
    pub integration: IntegrationId,
    pub strategy: StrategyId,
    /// Assets held for this position and their amounts.
    pub holdings: Vec<(AssetId, Amount)>,
    pub entered_at: DateTime<Utc>,
    /// Adapter-specific detail, decoded only by the issuing adapter.
    pub detail: serde_json::Value,
}

/// A pluggable capability that enters/exits a position in an external
/// protocol.
///
/// `enter_position` must be deterministic given the same inputs;
/// idempotent-safety under retry follows from the engine scoping every
/// allocation inside a single atomic execution.
pub trait IntegrationAdapter: Send + Sync {
    /// Unique identifier for this adapter.
    ///
    /// Used as the registry key and in logging.
    fn name(&self) -> &'static str;

    /// Whether the adapter handles the given operation type.
    fn supports(&self, op_type: OperationType) -> bool;

    /// Validate an opaque parameter blob at proposal time.
    ///
    /// Called once when the strategy is proposed; a strategy never binds
    /// parameters its adapter cannot decode.
    fn validate_params(&self, params: &serde_json::Value) -> Result<(), IntegrationError>;

    /// Deploy a capital slice into the external protocol.
    fn enter_position(
        &self,
        ctx: &mut ExecutionContext<'_>,
        call: &EnterCall<'_>,
    ) -> Result<PositionReceipt, IntegrationError>;

    /// Whether the external instrument permits exit.
    ///
    /// This predicate is adapter-specific and may depend on oracle state
    /// the strategy does not control (e.g. derivative expiry plus a
    /// delivered settlement price). The strategy's own duration timer is
    /// checked separately by the engine; both gates must pass.
    fn can_exit(
        &self,
        oracle: &dyn PriceOracle,
        now: DateTime<Utc>,
        receipt: &PositionReceipt,
    ) -> Result<bool, IntegrationError>;

    /// Liquidate the position and return proceeds in the reserve asset.
    ///
    /// Fails with [`IntegrationError::ExitNotReady`] while `can_exit` is
    /// false, and with [`IntegrationError::SlippageExceeded`] when
    /// proceeds fall short of `min_return`.
    fn exit_position(
        &self,
        ctx: &mut ExecutionContext<'_>,
        receipt: &PositionReceipt,
        min_return: Amount,
    ) -> Result<Amount, IntegrationError>;
}

/// Registry of available integration adapters, keyed by name.
///
/// Adapter ids are resolved here exactly once, at proposal time.
#[derive(Clone, Default)]
pub struct IntegrationRegistry {
    adapters: BTreeMap<IntegrationId, Arc<dyn IntegrationAdapter>>,
}

impl IntegrationRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name.
    pub fn register(&mut self, adapter: Arc<dyn IntegrationAdapter>) {
        self.adapters
            .insert(IntegrationId::from(adapter.name()), adapter);
    }

    /// Resolve an adapter by id.
    pub fn get(&self, id: &IntegrationId) -> Result<&Arc<dyn IntegrationAdapter>, IntegrationError> {
        self.adapters
            .get(id)
            .ok_or_else(|| IntegrationError::UnknownIntegration(id.clone()))
    }

    #[must_use]
    pub fn contains(&self, id: &IntegrationId) -> bool {
        self.adapters.contains_key(id)
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Check if registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullAdapter;

    impl IntegrationAdapter for NullAdapter {
        fn name(&self) -> &'static str {
            "null"
        }

        fn supports(&self, _op_type: OperationType) -> bool {
            true
        }

        fn validate_params(&self, _params: &serde_json::Value) -> Result<(), IntegrationError> {
            Ok(())
        }

        fn enter_position(
            &self,
            _ctx: &mut ExecutionContext<'_>,
            call: &EnterCall<'_>,
        ) -> Result<PositionReceipt, IntegrationError> {
            Ok(PositionReceipt {
                integration: IntegrationId::from(self.name()),
                strategy: call.strategy,
                holdings: vec![],
                entered_at: Utc::now(),
                detail: serde_json::Value::Null,
            })
        }

        fn can_exit(
            &self,
            _oracle: &dyn PriceOracle,
            _now: DateTime<Utc>,
            _receipt: &PositionReceipt,
        ) -> Result<bool, IntegrationError> {
            Ok(true)
        }

        fn exit_position(
            &self,
            _ctx: &mut ExecutionContext<'_>,
            _receipt: &PositionReceipt,
            _min_return: Amount,
        ) -> Result<Amount, IntegrationError> {
            Ok(Amount::ZERO)
        }
    }

    #[test]
    fn registry_resolves_by_name() {
        let mut registry = IntegrationRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(NullAdapter));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&IntegrationId::from("null")));
        assert!(registry.get(&IntegrationId::from("null")).is_ok());
    }

    #[test]
    fn unknown_integration_errors() {
        let registry = IntegrationRegistry::new();
        let err = registry.get(&IntegrationId::from("missing")).err().unwrap();
        assert!(matches!(err, IntegrationError::UnknownIntegration(_)));
    }
}
