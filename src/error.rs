use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{AccountId, GardenId, IntegrationId, StrategyId};

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Policy violations: limits, bounds, and proposal shape checks.
///
/// All of these are rejected synchronously with no state change.
#[derive(Error, Debug, Clone)]
pub enum PolicyError {
    #[error("invalid garden policy: {reason}")]
    InvalidPolicy { reason: String },

    #[error("deposit limit exceeded: {deposited} + {amount} > {limit}")]
    DepositLimitExceeded {
        deposited: Decimal,
        amount: Decimal,
        limit: Decimal,
    },

    #[error("contribution below minimum: {amount} < {minimum}")]
    BelowMinContribution { amount: Decimal, minimum: Decimal },

    #[error("shares out below minimum: {shares} < {min_shares}")]
    BelowMinShares { shares: Decimal, min_shares: Decimal },

    #[error("amount out below minimum: {amount} < {min_amount}")]
    BelowMinAmount { amount: Decimal, min_amount: Decimal },

    #[error("garden does not allow custom integrations")]
    CustomIntegrationsDisabled,

    #[error("insufficient withdrawable shares: {requested} requested, {held} held")]
    InsufficientShares { requested: Decimal, held: Decimal },

    #[error("strategy has no operations")]
    NoOperations,

    #[error("too many operations: {count} > {max}")]
    TooManyOperations { count: usize, max: usize },

    #[error("operation lists have mismatched lengths: {types} types, {integrations} integrations, {params} params")]
    OperationArityMismatch {
        types: usize,
        integrations: usize,
        params: usize,
    },

    #[error("invalid allocation percentage: {pct} (must be in (0, 1])")]
    InvalidAllocation { pct: Decimal },

    #[error("strategy duration {duration_secs}s outside policy bounds [{min_secs}s, {max_secs}s]")]
    InvalidDuration {
        duration_secs: u64,
        min_secs: u64,
        max_secs: u64,
    },

    #[error("proposer stake {stake} exceeds held shares {shares}")]
    InsufficientStake { stake: Decimal, shares: Decimal },

    #[error("execution capital must be positive: {capital}")]
    InvalidCapital { capital: Decimal },

    #[error("capital exceeds requested maximum: {capital} > {max_requested}")]
    CapitalExceedsRequested {
        capital: Decimal,
        max_requested: Decimal,
    },

    #[error("allocation exceeds limit: {fraction} > {max_fraction} of garden principal")]
    AllocationExceedsLimit {
        fraction: Decimal,
        max_fraction: Decimal,
    },

    #[error("keeper fee exceeds limit: {fee} > {max_fee}")]
    GasFeeExceedsLimit { fee: Decimal, max_fee: Decimal },

    #[error("invalid vote by {voter}: {reason}")]
    InvalidVote { voter: AccountId, reason: String },
}

/// Authorization failures: caller lacks the role the operation requires.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("account {account} is not an authorized keeper")]
    UnauthorizedKeeper { account: AccountId },

    #[error("account {account} is not the governance account")]
    UnauthorizedGovernance { account: AccountId },

    #[error("account {account} is not a member of garden {garden}")]
    NotAMember {
        account: AccountId,
        garden: GardenId,
    },

    #[error("account {account} may not propose strategies on garden {garden}")]
    NotAStrategist {
        account: AccountId,
        garden: GardenId,
    },

    #[error("garden {garden} is private")]
    PrivateGarden { garden: GardenId },
}

/// Timing gates: the operation is valid but premature. Retry once the
/// condition changes.
#[derive(Error, Debug, Clone)]
pub enum TimingError {
    #[error("strategy still active: {remaining_secs}s of its duration remain")]
    StrategyStillActive { remaining_secs: u64 },

    #[error("cannot exit before token is expired and price has been received: {reason}")]
    ExitPreconditionNotMet { reason: String },

    #[error("strategy cooldown active: {remaining_secs}s remain before execution")]
    CooldownActive { remaining_secs: u64 },

    #[error("deposit hardlock active: {remaining_secs}s remain")]
    DepositHardlockActive { remaining_secs: u64 },
}

/// Lifecycle and lookup errors.
#[derive(Error, Debug, Clone)]
pub enum StateError {
    #[error("voting already resolved for strategy {strategy}")]
    AlreadyResolved { strategy: StrategyId },

    #[error("strategy {strategy} is {state}; operation {operation} not permitted")]
    InvalidTransition {
        strategy: StrategyId,
        state: &'static str,
        operation: &'static str,
    },

    #[error("unknown garden: {0}")]
    UnknownGarden(GardenId),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(StrategyId),
}

/// Failures raised by integration adapters or the ledger beneath them.
///
/// An adapter failure inside `execute_strategy` or `finalize_strategy`
/// aborts the whole call; no partial allocation survives.
#[derive(Error, Debug, Clone)]
pub enum IntegrationError {
    #[error("unknown integration: {0}")]
    UnknownIntegration(IntegrationId),

    #[error("integration {integration} does not support operation type {op_type}")]
    UnsupportedOperation {
        integration: IntegrationId,
        op_type: &'static str,
    },

    #[error("invalid adapter parameters for {integration}: {reason}")]
    InvalidParams {
        integration: IntegrationId,
        reason: String,
    },

    #[error("exit not ready: {reason}")]
    ExitNotReady { reason: String },

    #[error("amount must not be negative: {amount}")]
    NegativeAmount { amount: Decimal },

    #[error("insufficient balance: {account} holds {held} {asset}, needs {needed}")]
    InsufficientBalance {
        account: AccountId,
        asset: String,
        held: Decimal,
        needed: Decimal,
    },

    #[error("insufficient unallocated liquidity: {available} available, {needed} needed")]
    InsufficientLiquidity { available: Decimal, needed: Decimal },

    #[error("slippage exceeded: received {received}, minimum {minimum}")]
    SlippageExceeded { received: Decimal, minimum: Decimal },

    #[error("no price available for pair {base}/{quote}")]
    PriceUnavailable { base: String, quote: String },

    #[error("adapter {integration} failed: {reason}")]
    AdapterFailed {
        integration: IntegrationId,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Timing(#[from] TimingError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Integration(#[from] IntegrationError),
}

pub type Result<T> = std::result::Result<T, Error>;
