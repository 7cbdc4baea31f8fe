//! The strategy state machine.
//!
//! A strategy moves `Proposed → Resolved → Executed → Finalized`, with
//! terminal `Rejected` / `Expired` branches when quorum is not met or
//! resolution comes too late. Voting is open for the whole `Proposed`
//! state; execution is transient inside a single atomic engine call and
//! never observable from outside.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::ids::{AccountId, GardenId, IntegrationId, StrategyId};
use crate::domain::money::{Amount, Fraction};
use crate::error::StateError;
use crate::integration::PositionReceipt;

/// Kind of operation a strategy leg performs, dispatched to an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Deposit into an interest-bearing vault.
    Vault,
    /// Enter both sides of a long/short pair instrument.
    Pair,
    /// Enter the long side only.
    Long,
    /// Enter the short side only.
    Short,
    /// Garden-specific custom integration.
    Custom,
}

impl OperationType {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            OperationType::Vault => "vault",
            OperationType::Pair => "pair",
            OperationType::Long => "long",
            OperationType::Short => "short",
            OperationType::Custom => "custom",
        }
    }
}

/// One leg of a strategy: an operation bound to an integration adapter
/// with opaque, adapter-decoded parameters.
///
/// Immutable after proposal; the adapter is resolved once against the
/// registry at proposal time and never re-validated mid-flight.
#[derive(Debug, Clone)]
pub struct Operation {
    op_type: OperationType,
    integration: IntegrationId,
    encoded_params: serde_json::Value,
}

impl Operation {
    #[must_use]
    pub fn new(
        op_type: OperationType,
        integration: IntegrationId,
        encoded_params: serde_json::Value,
    ) -> Self {
        Self {
            op_type,
            integration,
            encoded_params,
        }
    }

    #[must_use]
    pub fn op_type(&self) -> OperationType {
        self.op_type
    }

    #[must_use]
    pub fn integration(&self) -> &IntegrationId {
        &self.integration
    }

    #[must_use]
    pub fn encoded_params(&self) -> &serde_json::Value {
        &self.encoded_params
    }
}

/// Financial parameters fixed at proposal time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Ceiling on capital this strategy may ever hold.
    pub max_capital_requested: Amount,
    /// Proposer shares locked for the life of the strategy.
    pub stake: Amount,
    /// Seconds the strategy must stay invested once executed.
    pub duration_secs: u64,
    /// Return the proposer expects, as a fraction of capital.
    pub expected_return: Fraction,
    /// Ceiling on the fraction of garden principal allocated here.
    pub max_allocation_pct: Fraction,
    /// Ceiling on keeper fees, as a fraction of requested capital.
    pub max_gas_fee_pct: Fraction,
    /// Ceiling on trade slippage when entering/exiting positions.
    pub max_trade_slippage_pct: Fraction,
}

/// A single signed vote: positive weight endorses, negative opposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub voter: AccountId,
    pub weight: Decimal,
}

/// Lifecycle state of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyState {
    /// Proposed and open for voting.
    Proposed,
    /// Quorum reached; waiting out the cooldown before execution.
    Resolved,
    /// Capital deployed into integrations.
    Executed,
    /// Positions exited, proceeds distributed. Terminal.
    Finalized,
    /// Quorum not met at resolution. Terminal.
    Rejected,
    /// Resolution attempted after the proposal window. Terminal.
    Expired,
}

impl StrategyState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            StrategyState::Proposed => "proposed",
            StrategyState::Resolved => "resolved",
            StrategyState::Executed => "executed",
            StrategyState::Finalized => "finalized",
            StrategyState::Rejected => "rejected",
            StrategyState::Expired => "expired",
        }
    }

    /// Terminal states admit no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StrategyState::Finalized | StrategyState::Rejected | StrategyState::Expired
        )
    }
}

impl std::fmt::Display for StrategyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of a finalized strategy.
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    /// Reserve returned to the garden by exiting all positions.
    pub proceeds: Amount,
    /// Proceeds minus allocated capital; negative on a loss.
    pub profit: Amount,
    /// Reserve paid to the strategist (zero on a loss).
    pub strategist_cut: Amount,
    /// Reserve split across stewards (zero on a loss).
    pub steward_cut: Amount,
    pub finalized_at: DateTime<Utc>,
}

/// A proposed, voted, time-bounded investment plan.
#[derive(Debug, Clone)]
pub struct Strategy {
    id: StrategyId,
    garden: GardenId,
    proposer: AccountId,
    title: String,
    tag: String,
    params: StrategyParams,
    operations: Vec<Operation>,
    state: StrategyState,
    votes: Vec<Vote>,
    allocated: Amount,
    positions: Vec<PositionReceipt>,
    proposed_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    executed_at: Option<DateTime<Utc>>,
    outcome: Option<FinalizeOutcome>,
}

impl Strategy {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: StrategyId,
        garden: GardenId,
        proposer: AccountId,
        title: impl Into<String>,
        tag: impl Into<String>,
        params: StrategyParams,
        operations: Vec<Operation>,
        proposed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            garden,
            proposer,
            title: title.into(),
            tag: tag.into(),
            params,
            operations,
            state: StrategyState::Proposed,
            votes: Vec::new(),
            allocated: Decimal::ZERO,
            positions: Vec::new(),
            proposed_at,
            resolved_at: None,
            executed_at: None,
            outcome: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> StrategyId {
        self.id
    }

    #[must_use]
    pub fn garden(&self) -> GardenId {
        self.garden
    }

    /// Ledger account holding this strategy's working capital and
    /// position tokens.
    #[must_use]
    pub fn account(&self) -> AccountId {
        AccountId::new(self.id.to_string())
    }

    #[must_use]
    pub fn proposer(&self) -> &AccountId {
        &self.proposer
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    #[must_use]
    pub fn state(&self) -> StrategyState {
        self.state
    }

    #[must_use]
    pub fn votes(&self) -> &[Vote] {
        &self.votes
    }

    /// Net signed voting weight across recorded votes.
    #[must_use]
    pub fn net_vote_weight(&self) -> Decimal {
        self.votes.iter().map(|v| v.weight).sum()
    }

    /// Capital currently allocated (cumulative across executions).
    #[must_use]
    pub fn allocated(&self) -> Amount {
        self.allocated
    }

    #[must_use]
    pub fn positions(&self) -> &[PositionReceipt] {
        &self.positions
    }

    #[must_use]
    pub fn proposed_at(&self) -> DateTime<Utc> {
        self.proposed_at
    }

    #[must_use]
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    #[must_use]
    pub fn executed_at(&self) -> Option<DateTime<Utc>> {
        self.executed_at
    }

    #[must_use]
    pub fn outcome(&self) -> Option<&FinalizeOutcome> {
        self.outcome.as_ref()
    }

    /// Guard: the strategy must be in `expected` to perform `operation`.
    pub fn ensure_state(
        &self,
        expected: StrategyState,
        operation: &'static str,
    ) -> Result<(), StateError> {
        if self.state != expected {
            return Err(StateError::InvalidTransition {
                strategy: self.id,
                state: self.state.name(),
                operation,
            });
        }
        Ok(())
    }

    pub(crate) fn mark_resolved(&mut self, votes: Vec<Vote>, now: DateTime<Utc>) {
        self.votes = votes;
        self.state = StrategyState::Resolved;
        self.resolved_at = Some(now);
    }

    pub(crate) fn mark_rejected(&mut self, votes: Vec<Vote>) {
        self.votes = votes;
        self.state = StrategyState::Rejected;
    }

    pub(crate) fn mark_expired(&mut self) {
        self.state = StrategyState::Expired;
    }

    /// Record a successful execution: capital deployed, receipts stored.
    ///
    /// The execution timestamp is stamped on the first execution; the
    /// duration clock runs from then.
    pub(crate) fn mark_executed(
        &mut self,
        capital: Amount,
        receipts: Vec<PositionReceipt>,
        now: DateTime<Utc>,
    ) {
        self.allocated += capital;
        self.positions.extend(receipts);
        if self.executed_at.is_none() {
            self.executed_at = Some(now);
        }
        self.state = StrategyState::Executed;
    }

    pub(crate) fn mark_finalized(&mut self, outcome: FinalizeOutcome) {
        self.positions.clear();
        self.state = StrategyState::Finalized;
        self.outcome = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> StrategyParams {
        StrategyParams {
            max_capital_requested: dec!(10),
            stake: dec!(0.1),
            duration_secs: 30 * 86_400,
            expected_return: dec!(0.05),
            max_allocation_pct: dec!(0.1),
            max_gas_fee_pct: dec!(0.05),
            max_trade_slippage_pct: dec!(0.09),
        }
    }

    fn strategy() -> Strategy {
        Strategy::new(
            StrategyId::new(1),
            GardenId::new(1),
            AccountId::from("alice"),
            "Execute my custom integration",
            "\u{1f48e}",
            params(),
            vec![Operation::new(
                OperationType::Pair,
                IntegrationId::from("long_short_pair"),
                serde_json::json!({"instrument": "GROWTH-0621"}),
            )],
            Utc::now(),
        )
    }

    #[test]
    fn new_strategy_is_proposed() {
        let s = strategy();
        assert_eq!(s.state(), StrategyState::Proposed);
        assert!(!s.state().is_terminal());
    }

    #[test]
    fn ensure_state_rejects_wrong_state() {
        let s = strategy();
        let err = s
            .ensure_state(StrategyState::Resolved, "execute_strategy")
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
    }

    #[test]
    fn net_vote_weight_is_signed_sum() {
        let mut s = strategy();
        s.mark_resolved(
            vec![
                Vote {
                    voter: AccountId::from("alice"),
                    weight: dec!(3),
                },
                Vote {
                    voter: AccountId::from("bob"),
                    weight: dec!(-1),
                },
            ],
            Utc::now(),
        );
        assert_eq!(s.net_vote_weight(), dec!(2));
        assert_eq!(s.state(), StrategyState::Resolved);
    }

    #[test]
    fn executed_at_stamped_once() {
        let mut s = strategy();
        let t0 = Utc::now();
        s.mark_resolved(vec![], t0);
        s.mark_executed(dec!(1), vec![], t0);
        let t1 = t0 + chrono::Duration::seconds(600);
        s.mark_executed(dec!(1), vec![], t1);

        assert_eq!(s.executed_at(), Some(t0));
        assert_eq!(s.allocated(), dec!(2));
    }

    #[test]
    fn terminal_states() {
        assert!(StrategyState::Finalized.is_terminal());
        assert!(StrategyState::Rejected.is_terminal());
        assert!(StrategyState::Expired.is_terminal());
        assert!(!StrategyState::Executed.is_terminal());
    }
}
