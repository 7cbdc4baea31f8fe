//! The engine: every public operation of the protocol.
//!
//! Each operation runs against a clone of the engine state and commits
//! only on success, so shared state never shows a half-applied call and
//! any adapter failure rolls the whole operation back. Time advances
//! only through [`Engine::advance_time`]; there is no background
//! scheduler, and timing policy is checked at the start of the next
//! transition.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::controller::Controller;
use crate::domain::{
    AccountId, Amount, AssetId, FinalizeOutcome, Garden, GardenId, GardenPolicy, IntegrationId,
    Operation, OperationType, ProfitSplit, Strategy, StrategyId, StrategyParams, StrategyState,
    Visibility, Vote,
};
use crate::error::{AuthError, IntegrationError, PolicyError, Result, StateError, TimingError};
use crate::exchange::Exchange;
use crate::integration::{EnterCall, ExecutionContext, IntegrationRegistry, PositionReceipt};
use crate::ledger::Ledger;
use crate::oracle::PriceOracle;

/// Upper bound on operations per strategy unless overridden.
pub const DEFAULT_MAX_OPERATIONS: usize = 6;

/// Parameters for [`Engine::create_garden`].
#[derive(Debug, Clone)]
pub struct CreateGardenParams {
    pub reserve_asset: AssetId,
    pub name: String,
    pub symbol: String,
    pub metadata_uri: String,
    pub policy: GardenPolicy,
    pub visibility: Visibility,
    /// Zero-valued fields select the protocol defaults.
    pub profit_split: ProfitSplit,
    pub initial_contribution: Amount,
}

/// Parameters for [`Engine::add_strategy`].
#[derive(Debug, Clone)]
pub struct AddStrategyParams {
    pub title: String,
    pub tag: String,
    pub financial: StrategyParams,
    pub op_types: Vec<OperationType>,
    pub op_integrations: Vec<IntegrationId>,
    pub op_params: Vec<serde_json::Value>,
}

/// Everything that mutates under an operation. Cloned wholesale before
/// each public call; committed only when the call succeeds.
#[derive(Debug, Clone)]
struct EngineState {
    now: DateTime<Utc>,
    ledger: Ledger,
    controller: Controller,
    gardens: BTreeMap<GardenId, Garden>,
    strategies: BTreeMap<StrategyId, Strategy>,
    next_garden_id: u64,
    next_strategy_id: u64,
}

/// The workflow engine: gardens, strategies, and the trust boundary.
pub struct Engine {
    state: EngineState,
    registry: IntegrationRegistry,
    oracle: Arc<dyn PriceOracle>,
    exchange: Arc<dyn Exchange>,
    max_operations: usize,
    default_policy: GardenPolicy,
}

impl Engine {
    /// Create an engine with an empty ledger at the given genesis time.
    pub fn new(
        governance: AccountId,
        genesis: DateTime<Utc>,
        registry: IntegrationRegistry,
        oracle: Arc<dyn PriceOracle>,
        exchange: Arc<dyn Exchange>,
    ) -> Self {
        Self {
            state: EngineState {
                now: genesis,
                ledger: Ledger::new(),
                controller: Controller::new(governance),
                gardens: BTreeMap::new(),
                strategies: BTreeMap::new(),
                next_garden_id: 1,
                next_strategy_id: 1,
            },
            registry,
            oracle,
            exchange,
            max_operations: DEFAULT_MAX_OPERATIONS,
            default_policy: GardenPolicy::default(),
        }
    }

    /// Create an engine with limits and the garden policy template taken
    /// from a loaded configuration.
    pub fn from_config(
        config: &Config,
        governance: AccountId,
        genesis: DateTime<Utc>,
        registry: IntegrationRegistry,
        oracle: Arc<dyn PriceOracle>,
        exchange: Arc<dyn Exchange>,
    ) -> Self {
        let mut engine = Self::new(governance, genesis, registry, oracle, exchange)
            .with_max_operations(config.engine.max_operations);
        engine.default_policy = config.default_policy.clone();
        engine
    }

    /// Override the per-strategy operation cap.
    #[must_use]
    pub fn with_max_operations(mut self, max_operations: usize) -> Self {
        self.max_operations = max_operations;
        self
    }

    /// Policy template for gardens whose creator does not supply one of
    /// their own.
    #[must_use]
    pub fn default_policy(&self) -> &GardenPolicy {
        &self.default_policy
    }

    // ---- read surface -------------------------------------------------

    /// Current engine time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.state.now
    }

    #[must_use]
    pub fn controller(&self) -> &Controller {
        &self.state.controller
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.state.ledger
    }

    #[must_use]
    pub fn registry(&self) -> &IntegrationRegistry {
        &self.registry
    }

    pub fn garden(&self, id: GardenId) -> Result<&Garden> {
        self.state
            .gardens
            .get(&id)
            .ok_or_else(|| StateError::UnknownGarden(id).into())
    }

    pub fn strategy(&self, id: StrategyId) -> Result<&Strategy> {
        self.state
            .strategies
            .get(&id)
            .ok_or_else(|| StateError::UnknownStrategy(id).into())
    }

    /// Net asset value of a garden: unallocated reserve plus capital
    /// allocated to non-finalized strategies.
    pub fn garden_nav(&self, id: GardenId) -> Result<Amount> {
        let garden = self.garden(id)?;
        Ok(self
            .state
            .ledger
            .balance(&garden.account(), garden.reserve_asset())
            + garden.allocated())
    }

    // ---- simulation surface -------------------------------------------

    /// Advance the clock by `secs`. Simulation/test only; production
    /// deployments drive time from the ledger collaborator.
    pub fn advance_time(&mut self, secs: u64) {
        self.state.now += Duration::seconds(secs as i64);
        debug!(now = %self.state.now, advanced_secs = secs, "clock advanced");
    }

    /// Mint reserve into an account. Simulation/test only.
    pub fn fund(&mut self, account: &AccountId, asset: &AssetId, amount: Amount) {
        self.state.ledger.mint(account, asset, amount);
    }

    // ---- controller surface -------------------------------------------

    pub fn add_keeper(&mut self, sender: &AccountId, keeper: AccountId) -> Result<()> {
        self.atomically(|state, _| {
            state.controller.ensure_governance(sender)?;
            state.controller.add_keeper(keeper.clone());
            info!(keeper = %keeper, "keeper added");
            Ok(())
        })
    }

    pub fn remove_keeper(&mut self, sender: &AccountId, keeper: &AccountId) -> Result<()> {
        self.atomically(|state, _| {
            state.controller.ensure_governance(sender)?;
            state.controller.remove_keeper(keeper);
            info!(keeper = %keeper, "keeper removed");
            Ok(())
        })
    }

    pub fn approve_integration(&mut self, sender: &AccountId, integration: IntegrationId) -> Result<()> {
        self.atomically(|state, env| {
            state.controller.ensure_governance(sender)?;
            env.registry.get(&integration)?;
            state.controller.approve_integration(integration.clone());
            info!(integration = %integration, "integration approved");
            Ok(())
        })
    }

    pub fn revoke_integration(&mut self, sender: &AccountId, integration: &IntegrationId) -> Result<()> {
        self.atomically(|state, _| {
            state.controller.ensure_governance(sender)?;
            state.controller.revoke_integration(integration);
            info!(integration = %integration, "integration revoked");
            Ok(())
        })
    }

    // ---- garden surface ------------------------------------------------

    /// Create a garden and seed it with the creator's contribution.
    pub fn create_garden(&mut self, sender: &AccountId, params: CreateGardenParams) -> Result<GardenId> {
        self.atomically(|state, _| {
            params.policy.validate()?;
            let split = params.profit_split.or_default();
            split.validate()?;

            let id = GardenId::new(state.next_garden_id);
            let garden = Garden::new(
                id,
                params.reserve_asset.clone(),
                params.name.clone(),
                params.symbol.clone(),
                params.metadata_uri.clone(),
                sender.clone(),
                params.policy.clone(),
                params.visibility,
                split,
                state.now,
            );

            garden.check_deposit(params.initial_contribution, sender)?;
            state.ledger.transfer(
                sender,
                &garden.account(),
                &params.reserve_asset,
                params.initial_contribution,
            )?;

            let mut garden = garden;
            // Seed deposit mints 1:1.
            garden.record_deposit(
                sender,
                params.initial_contribution,
                params.initial_contribution,
                state.now,
            );

            state.next_garden_id += 1;
            state.controller.register_garden(id);
            state.gardens.insert(id, garden);

            info!(
                garden = %id,
                name = params.name.as_str(),
                reserve = %params.reserve_asset,
                seed = %params.initial_contribution,
                "garden created"
            );
            Ok(id)
        })
    }

    /// Deposit reserve into a garden, minting shares to `recipient`.
    pub fn deposit(
        &mut self,
        sender: &AccountId,
        garden_id: GardenId,
        amount: Amount,
        min_shares_out: Amount,
        recipient: &AccountId,
        referrer: Option<&AccountId>,
    ) -> Result<Amount> {
        self.atomically(|state, _| {
            let garden = state
                .gardens
                .get(&garden_id)
                .ok_or(StateError::UnknownGarden(garden_id))?;
            garden.check_deposit(amount, recipient)?;

            let nav = state.ledger.balance(&garden.account(), garden.reserve_asset())
                + garden.allocated();
            let shares = garden.shares_for_deposit(amount, nav);
            if shares < min_shares_out {
                return Err(PolicyError::BelowMinShares {
                    shares,
                    min_shares: min_shares_out,
                }
                .into());
            }

            let garden_account = garden.account();
            let reserve = garden.reserve_asset().clone();
            state.ledger.transfer(sender, &garden_account, &reserve, amount)?;

            let garden = state.gardens.get_mut(&garden_id).expect("checked above");
            garden.record_deposit(recipient, amount, shares, state.now);

            if let Some(referrer) = referrer {
                debug!(garden = %garden_id, referrer = %referrer, "deposit referred");
            }
            info!(
                garden = %garden_id,
                depositor = %sender,
                recipient = %recipient,
                amount = %amount,
                shares = %shares,
                "deposit"
            );
            Ok(shares)
        })
    }

    /// Redeem shares for reserve at the current price per share.
    pub fn withdraw(
        &mut self,
        sender: &AccountId,
        garden_id: GardenId,
        shares: Amount,
        min_amount_out: Amount,
    ) -> Result<Amount> {
        self.atomically(|state, _| {
            let garden = state
                .gardens
                .get(&garden_id)
                .ok_or(StateError::UnknownGarden(garden_id))?;
            let member = garden.member(sender).ok_or_else(|| AuthError::NotAMember {
                account: sender.clone(),
                garden: garden_id,
            })?;
            garden.check_hardlock(member, state.now)?;
            if member.withdrawable() < shares {
                return Err(PolicyError::InsufficientShares {
                    requested: shares,
                    held: member.withdrawable(),
                }
                .into());
            }

            let reserve = garden.reserve_asset().clone();
            let garden_account = garden.account();
            let unallocated = state.ledger.balance(&garden_account, &reserve);
            let nav = unallocated + garden.allocated();
            let amount = garden.amount_for_shares(shares, nav);

            if amount > unallocated {
                return Err(IntegrationError::InsufficientLiquidity {
                    available: unallocated,
                    needed: amount,
                }
                .into());
            }
            if amount < min_amount_out {
                return Err(PolicyError::BelowMinAmount {
                    amount,
                    min_amount: min_amount_out,
                }
                .into());
            }

            state.ledger.transfer(&garden_account, sender, &reserve, amount)?;
            let garden = state.gardens.get_mut(&garden_id).expect("checked above");
            garden.record_withdrawal(sender, shares, amount);

            info!(
                garden = %garden_id,
                member = %sender,
                shares = %shares,
                amount = %amount,
                "withdrawal"
            );
            Ok(amount)
        })
    }

    /// Propose a strategy on a garden.
    pub fn add_strategy(
        &mut self,
        sender: &AccountId,
        garden_id: GardenId,
        params: AddStrategyParams,
    ) -> Result<StrategyId> {
        let max_operations = self.max_operations;
        self.atomically(|state, env| {
            let garden = state
                .gardens
                .get(&garden_id)
                .ok_or(StateError::UnknownGarden(garden_id))?;
            if !garden.is_member(sender) {
                return Err(AuthError::NotAMember {
                    account: sender.clone(),
                    garden: garden_id,
                }
                .into());
            }
            if !garden.can_propose(sender) {
                return Err(AuthError::NotAStrategist {
                    account: sender.clone(),
                    garden: garden_id,
                }
                .into());
            }

            let (types, integrations, op_params) =
                (&params.op_types, &params.op_integrations, &params.op_params);
            if types.len() != integrations.len() || types.len() != op_params.len() {
                return Err(PolicyError::OperationArityMismatch {
                    types: types.len(),
                    integrations: integrations.len(),
                    params: op_params.len(),
                }
                .into());
            }
            if types.is_empty() {
                return Err(PolicyError::NoOperations.into());
            }
            if types.len() > max_operations {
                return Err(PolicyError::TooManyOperations {
                    count: types.len(),
                    max: max_operations,
                }
                .into());
            }

            let financial = &params.financial;
            if financial.max_allocation_pct <= Decimal::ZERO
                || financial.max_allocation_pct > Decimal::ONE
            {
                return Err(PolicyError::InvalidAllocation {
                    pct: financial.max_allocation_pct,
                }
                .into());
            }
            let policy = garden.policy();
            if financial.duration_secs < policy.min_strategy_duration_secs
                || financial.duration_secs > policy.max_strategy_duration_secs
            {
                return Err(PolicyError::InvalidDuration {
                    duration_secs: financial.duration_secs,
                    min_secs: policy.min_strategy_duration_secs,
                    max_secs: policy.max_strategy_duration_secs,
                }
                .into());
            }

            // Resolve each binding exactly once, now. Unapproved adapters
            // require the garden's custom-integrations flag.
            let mut operations = Vec::with_capacity(types.len());
            for ((op_type, integration), encoded) in
                types.iter().zip(integrations).zip(op_params)
            {
                let adapter = env.registry.get(integration)?;
                if !adapter.supports(*op_type) {
                    return Err(IntegrationError::UnsupportedOperation {
                        integration: integration.clone(),
                        op_type: op_type.name(),
                    }
                    .into());
                }
                adapter.validate_params(encoded)?;
                if !state.controller.is_approved_integration(integration)
                    && !policy.custom_integrations_enabled
                {
                    return Err(PolicyError::CustomIntegrationsDisabled.into());
                }
                operations.push(Operation::new(*op_type, integration.clone(), encoded.clone()));
            }

            let garden = state.gardens.get_mut(&garden_id).expect("checked above");
            garden.lock_stake(sender, financial.stake)?;

            let id = StrategyId::new(state.next_strategy_id);
            state.next_strategy_id += 1;
            garden.push_strategy(id);

            let strategy = Strategy::new(
                id,
                garden_id,
                sender.clone(),
                params.title.clone(),
                params.tag.clone(),
                financial.clone(),
                operations,
                state.now,
            );
            state.strategies.insert(id, strategy);

            info!(
                strategy = %id,
                garden = %garden_id,
                proposer = %sender,
                title = params.title.as_str(),
                "strategy proposed"
            );
            Ok(id)
        })
    }

    // ---- keeper surface ------------------------------------------------

    /// Tally the signed votes for a strategy. Callable once; transitions
    /// to `Resolved`, `Rejected`, or `Expired` and returns the new state.
    pub fn resolve_voting(
        &mut self,
        sender: &AccountId,
        strategy_id: StrategyId,
        votes: &[(AccountId, Decimal)],
        fee: Amount,
    ) -> Result<StrategyState> {
        self.atomically(|state, _| {
            state.controller.ensure_keeper(sender)?;

            let strategy = state
                .strategies
                .get(&strategy_id)
                .ok_or(StateError::UnknownStrategy(strategy_id))?;
            if strategy.state() != StrategyState::Proposed {
                return Err(StateError::AlreadyResolved {
                    strategy: strategy_id,
                }
                .into());
            }

            let garden_id = strategy.garden();
            let garden = state
                .gardens
                .get(&garden_id)
                .ok_or(StateError::UnknownGarden(garden_id))?;
            let policy = garden.policy();

            Self::check_keeper_fee(fee, strategy.params())?;

            // Proposal window: resolution after the longest permitted
            // duration expires the strategy outright.
            let window_end = strategy.proposed_at()
                + Duration::seconds(policy.max_strategy_duration_secs as i64);
            if state.now > window_end {
                let proposer = strategy.proposer().clone();
                let stake = strategy.params().stake;
                Self::pay_keeper_fee(state, garden_id, sender, fee)?;
                let garden = state.gardens.get_mut(&garden_id).expect("checked above");
                garden.release_stake(&proposer, stake);
                let strategy = state.strategies.get_mut(&strategy_id).expect("checked above");
                strategy.mark_expired();
                warn!(strategy = %strategy_id, "strategy expired unresolved");
                return Ok(StrategyState::Expired);
            }

            let mut tally = Vec::with_capacity(votes.len());
            let mut seen = std::collections::BTreeSet::new();
            for (voter, weight) in votes {
                if !seen.insert(voter.clone()) {
                    return Err(PolicyError::InvalidVote {
                        voter: voter.clone(),
                        reason: "duplicate vote".to_string(),
                    }
                    .into());
                }
                let power = garden.voting_power(voter);
                if power.is_zero() {
                    return Err(PolicyError::InvalidVote {
                        voter: voter.clone(),
                        reason: "not a member".to_string(),
                    }
                    .into());
                }
                if weight.abs() > power {
                    return Err(PolicyError::InvalidVote {
                        voter: voter.clone(),
                        reason: format!("weight {} exceeds voting power {}", weight, power),
                    }
                    .into());
                }
                tally.push(Vote {
                    voter: voter.clone(),
                    weight: *weight,
                });
            }

            let net: Decimal = tally.iter().map(|v| v.weight).sum();
            let threshold = policy.min_voter_quorum * garden.total_shares();
            let quorum_met = net >= threshold && tally.len() >= policy.min_voters;

            let proposer = strategy.proposer().clone();
            let stake = strategy.params().stake;
            Self::pay_keeper_fee(state, garden_id, sender, fee)?;

            let strategy = state.strategies.get_mut(&strategy_id).expect("checked above");
            let new_state = if quorum_met {
                strategy.mark_resolved(tally, state.now);
                StrategyState::Resolved
            } else {
                strategy.mark_rejected(tally);
                let garden = state.gardens.get_mut(&garden_id).expect("checked above");
                garden.release_stake(&proposer, stake);
                StrategyState::Rejected
            };

            info!(
                strategy = %strategy_id,
                net_weight = %net,
                threshold = %threshold,
                outcome = %new_state,
                "voting resolved"
            );
            Ok(new_state)
        })
    }

    /// Allocate capital to a resolved strategy and enter its positions.
    ///
    /// Retryable from `Resolved`: any adapter failure aborts the whole
    /// call and no allocation persists.
    pub fn execute_strategy(
        &mut self,
        sender: &AccountId,
        strategy_id: StrategyId,
        capital: Amount,
        fee: Amount,
    ) -> Result<()> {
        self.atomically(|state, env| {
            state.controller.ensure_keeper(sender)?;

            let strategy = state
                .strategies
                .get(&strategy_id)
                .ok_or(StateError::UnknownStrategy(strategy_id))?;
            strategy.ensure_state(StrategyState::Resolved, "execute_strategy")?;

            let garden_id = strategy.garden();
            let garden = state
                .gardens
                .get(&garden_id)
                .ok_or(StateError::UnknownGarden(garden_id))?;
            let policy = garden.policy();
            let params = strategy.params().clone();

            let resolved_at = strategy.resolved_at().expect("resolved strategies are stamped");
            let ready_at = resolved_at + Duration::seconds(policy.strategy_cooldown_secs as i64);
            if state.now < ready_at {
                return Err(TimingError::CooldownActive {
                    remaining_secs: (ready_at - state.now).num_seconds().max(0) as u64,
                }
                .into());
            }

            if capital <= Decimal::ZERO {
                return Err(PolicyError::InvalidCapital { capital }.into());
            }
            let total_after = strategy.allocated() + capital;
            if total_after > params.max_capital_requested {
                return Err(PolicyError::CapitalExceedsRequested {
                    capital: total_after,
                    max_requested: params.max_capital_requested,
                }
                .into());
            }
            let principal = garden.principal();
            if !principal.is_zero() {
                let fraction = total_after / principal;
                if fraction > params.max_allocation_pct {
                    return Err(PolicyError::AllocationExceedsLimit {
                        fraction,
                        max_fraction: params.max_allocation_pct,
                    }
                    .into());
                }
            }
            Self::check_keeper_fee(fee, &params)?;

            let garden_account = garden.account();
            let reserve = garden.reserve_asset().clone();
            let available = state.ledger.balance(&garden_account, &reserve);
            if capital + fee > available {
                return Err(IntegrationError::InsufficientLiquidity {
                    available,
                    needed: capital + fee,
                }
                .into());
            }

            let strategy_account = strategy.account();
            let operations: Vec<Operation> = strategy.operations().to_vec();

            state
                .ledger
                .transfer(&garden_account, &strategy_account, &reserve, capital)?;
            if !fee.is_zero() {
                state.ledger.transfer(&garden_account, sender, &reserve, fee)?;
            }

            // Equal slices per leg; the first absorbs rounding remainder.
            // Truncation keeps the base at or below the exact share, so
            // the first slice never goes negative.
            let n = Decimal::from(operations.len() as u64);
            let base = (capital / n).round_dp_with_strategy(18, RoundingStrategy::ToZero);
            let mut receipts = Vec::with_capacity(operations.len());
            for (i, op) in operations.iter().enumerate() {
                let slice = if i == 0 {
                    capital - base * (n - Decimal::ONE)
                } else {
                    base
                };
                let adapter = env.registry.get(op.integration())?;
                let mut ctx = ExecutionContext {
                    now: state.now,
                    ledger: &mut state.ledger,
                    oracle: env.oracle,
                    exchange: env.exchange,
                    reserve: &reserve,
                    strategy_account: &strategy_account,
                    max_trade_slippage_pct: params.max_trade_slippage_pct,
                };
                let receipt = adapter.enter_position(
                    &mut ctx,
                    &EnterCall {
                        garden: garden_id,
                        strategy: strategy_id,
                        params: op.encoded_params(),
                        capital: slice,
                    },
                )?;
                debug!(
                    strategy = %strategy_id,
                    integration = %op.integration(),
                    slice = %slice,
                    "position entered"
                );
                receipts.push(receipt);
            }

            let garden = state.gardens.get_mut(&garden_id).expect("checked above");
            garden.allocate(capital);
            let strategy = state.strategies.get_mut(&strategy_id).expect("checked above");
            strategy.mark_executed(capital, receipts, state.now);

            info!(
                strategy = %strategy_id,
                garden = %garden_id,
                capital = %capital,
                "strategy executed"
            );
            Ok(())
        })
    }

    /// Exit all positions, return proceeds to the garden, and distribute
    /// profit. Only after the strategy's duration has elapsed AND every
    /// adapter reports its instrument exitable; both gates are necessary.
    pub fn finalize_strategy(
        &mut self,
        sender: &AccountId,
        strategy_id: StrategyId,
        min_return: Amount,
        fee: Amount,
    ) -> Result<FinalizeOutcome> {
        self.atomically(|state, env| {
            state.controller.ensure_keeper(sender)?;

            let strategy = state
                .strategies
                .get(&strategy_id)
                .ok_or(StateError::UnknownStrategy(strategy_id))?;
            strategy.ensure_state(StrategyState::Executed, "finalize_strategy")?;

            let garden_id = strategy.garden();
            let garden = state
                .gardens
                .get(&garden_id)
                .ok_or(StateError::UnknownGarden(garden_id))?;
            let params = strategy.params().clone();

            let executed_at = strategy.executed_at().expect("executed strategies are stamped");
            let ends_at = executed_at + Duration::seconds(params.duration_secs as i64);
            if state.now < ends_at {
                return Err(TimingError::StrategyStillActive {
                    remaining_secs: (ends_at - state.now).num_seconds().max(0) as u64,
                }
                .into());
            }

            // Second gate: every adapter's external instrument must permit
            // exit, regardless of the strategy's own timer.
            for receipt in strategy.positions() {
                let adapter = env.registry.get(&receipt.integration)?;
                if !adapter.can_exit(env.oracle, state.now, receipt)? {
                    return Err(TimingError::ExitPreconditionNotMet {
                        reason: format!("integration '{}' not exitable", receipt.integration),
                    }
                    .into());
                }
            }
            Self::check_keeper_fee(fee, &params)?;

            let garden_account = garden.account();
            let reserve = garden.reserve_asset().clone();
            let strategy_account = strategy.account();
            let split = garden.profit_split();
            let stewards = garden.steward_accounts();
            let proposer = strategy.proposer().clone();
            let allocated = strategy.allocated();
            let receipts: Vec<PositionReceipt> = strategy.positions().to_vec();

            for receipt in &receipts {
                let adapter = env.registry.get(&receipt.integration)?;
                let mut ctx = ExecutionContext {
                    now: state.now,
                    ledger: &mut state.ledger,
                    oracle: env.oracle,
                    exchange: env.exchange,
                    reserve: &reserve,
                    strategy_account: &strategy_account,
                    max_trade_slippage_pct: params.max_trade_slippage_pct,
                };
                adapter.exit_position(&mut ctx, receipt, Decimal::ZERO)?;
            }

            // Everything the exits left on the strategy account goes back
            // to the garden.
            let proceeds = state.ledger.balance(&strategy_account, &reserve);
            if proceeds < min_return {
                return Err(IntegrationError::SlippageExceeded {
                    received: proceeds,
                    minimum: min_return,
                }
                .into());
            }
            state
                .ledger
                .transfer(&strategy_account, &garden_account, &reserve, proceeds)?;
            if !fee.is_zero() {
                state.ledger.transfer(&garden_account, sender, &reserve, fee)?;
            }

            let profit = proceeds - allocated;
            let garden = state.gardens.get_mut(&garden_id).expect("checked above");
            garden.deallocate(allocated);

            let mut strategist_cut = Decimal::ZERO;
            let mut steward_cut = Decimal::ZERO;
            if profit > Decimal::ZERO {
                strategist_cut = profit * split.strategist_pct;
                steward_cut = profit * split.steward_pct;
                state
                    .ledger
                    .transfer(&garden_account, &proposer, &reserve, strategist_cut)?;
                if !stewards.is_empty() && !steward_cut.is_zero() {
                    let each = steward_cut / Decimal::from(stewards.len() as u64);
                    for steward in &stewards {
                        state
                            .ledger
                            .transfer(&garden_account, steward, &reserve, each)?;
                    }
                }
                garden.release_stake(&proposer, params.stake);
            } else {
                // Loss: burn proposer stake up to the loss in shares at
                // the post-return price per share.
                let nav = state.ledger.balance(&garden_account, &reserve) + garden.allocated();
                let loss_shares = if nav.is_zero() || garden.total_shares().is_zero() {
                    params.stake
                } else {
                    (-profit) * garden.total_shares() / nav
                };
                let burned = garden.slash_stake(&proposer, params.stake, loss_shares);
                debug!(strategy = %strategy_id, burned = %burned, "stake slashed");
            }

            let outcome = FinalizeOutcome {
                proceeds,
                profit,
                strategist_cut,
                steward_cut,
                finalized_at: state.now,
            };
            let strategy = state.strategies.get_mut(&strategy_id).expect("checked above");
            strategy.mark_finalized(outcome.clone());

            info!(
                strategy = %strategy_id,
                garden = %garden_id,
                proceeds = %proceeds,
                profit = %profit,
                "strategy finalized"
            );
            Ok(outcome)
        })
    }

    // ---- internals -----------------------------------------------------

    fn check_keeper_fee(fee: Amount, params: &StrategyParams) -> Result<()> {
        let max_fee = params.max_gas_fee_pct * params.max_capital_requested;
        if fee > max_fee {
            return Err(PolicyError::GasFeeExceedsLimit { fee, max_fee }.into());
        }
        Ok(())
    }

    fn pay_keeper_fee(
        state: &mut EngineState,
        garden_id: GardenId,
        keeper: &AccountId,
        fee: Amount,
    ) -> Result<()> {
        if fee.is_zero() {
            return Ok(());
        }
        let garden = state
            .gardens
            .get(&garden_id)
            .ok_or(StateError::UnknownGarden(garden_id))?;
        let account = garden.account();
        let reserve = garden.reserve_asset().clone();
        state.ledger.transfer(&account, keeper, &reserve, fee)?;
        Ok(())
    }

    /// Run `f` against a working copy of the state; commit on success.
    fn atomically<T>(
        &mut self,
        f: impl FnOnce(&mut EngineState, &Collaborators<'_>) -> Result<T>,
    ) -> Result<T> {
        let env = Collaborators {
            registry: &self.registry,
            oracle: self.oracle.as_ref(),
            exchange: self.exchange.as_ref(),
        };
        let mut working = self.state.clone();
        let out = f(&mut working, &env)?;
        self.state = working;
        Ok(out)
    }
}

/// Read-only collaborator handles passed into each operation.
struct Collaborators<'a> {
    registry: &'a IntegrationRegistry,
    oracle: &'a dyn PriceOracle,
    exchange: &'a dyn Exchange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_bound_uses_requested_capital() {
        let params = StrategyParams {
            max_capital_requested: rust_decimal_macros::dec!(10),
            stake: rust_decimal_macros::dec!(0.1),
            duration_secs: 86_400,
            expected_return: rust_decimal_macros::dec!(0.05),
            max_allocation_pct: rust_decimal_macros::dec!(0.1),
            max_gas_fee_pct: rust_decimal_macros::dec!(0.05),
            max_trade_slippage_pct: rust_decimal_macros::dec!(0.09),
        };
        assert!(Engine::check_keeper_fee(rust_decimal_macros::dec!(0.5), &params).is_ok());
        assert!(Engine::check_keeper_fee(rust_decimal_macros::dec!(0.6), &params).is_err());
    }
}
