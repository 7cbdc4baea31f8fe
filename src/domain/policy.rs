//! Garden policy: pool-level limits, timing windows, and profit splits.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::money::{Amount, Fraction};
use crate::error::PolicyError;

/// Pool-level policy attached to a garden at creation and immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GardenPolicy {
    /// Cap on total principal deposited into the pool.
    pub max_deposit_limit: Amount,
    /// Minimum liquidity the reserve asset must have on the exchange.
    pub min_liquidity_asset: Amount,
    /// Seconds a deposit is locked before it can be withdrawn.
    pub deposit_hardlock_secs: u64,
    /// Minimum size of a single contribution.
    pub min_contribution: Amount,
    /// Seconds between voting resolution and earliest execution.
    pub strategy_cooldown_secs: u64,
    /// Net voting weight required to activate a strategy, as a fraction
    /// of total shares.
    pub min_voter_quorum: Fraction,
    /// Shortest permitted strategy duration.
    pub min_strategy_duration_secs: u64,
    /// Longest permitted strategy duration.
    pub max_strategy_duration_secs: u64,
    /// Minimum number of distinct voters for a valid resolution.
    pub min_voters: usize,
    /// Whether strategies may bind integrations outside the controller's
    /// approved set.
    pub custom_integrations_enabled: bool,
}

impl GardenPolicy {
    /// Validate internal consistency of the policy.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.min_strategy_duration_secs > self.max_strategy_duration_secs {
            return Err(PolicyError::InvalidPolicy {
                reason: format!(
                    "min strategy duration {}s exceeds max {}s",
                    self.min_strategy_duration_secs, self.max_strategy_duration_secs
                ),
            });
        }
        if self.min_contribution > self.max_deposit_limit {
            return Err(PolicyError::InvalidPolicy {
                reason: format!(
                    "min contribution {} exceeds max deposit limit {}",
                    self.min_contribution, self.max_deposit_limit
                ),
            });
        }
        if self.min_voter_quorum <= Decimal::ZERO || self.min_voter_quorum > Decimal::ONE {
            return Err(PolicyError::InvalidPolicy {
                reason: format!("voter quorum {} outside (0, 1]", self.min_voter_quorum),
            });
        }
        if self.max_deposit_limit <= Decimal::ZERO
            || self.min_contribution <= Decimal::ZERO
            || self.min_liquidity_asset < Decimal::ZERO
        {
            return Err(PolicyError::InvalidPolicy {
                reason: "deposit limits must be positive".to_string(),
            });
        }
        if self.min_voters == 0 {
            return Err(PolicyError::InvalidPolicy {
                reason: "minimum voter count must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Conservative policy template; deployments override per garden or via
/// configuration.
impl Default for GardenPolicy {
    fn default() -> Self {
        Self {
            max_deposit_limit: dec!(100),
            min_liquidity_asset: dec!(100),
            deposit_hardlock_secs: 1,
            min_contribution: dec!(0.1),
            strategy_cooldown_secs: 86_400,
            min_voter_quorum: dec!(0.10),
            min_strategy_duration_secs: 3 * 86_400,
            max_strategy_duration_secs: 365 * 86_400,
            min_voters: 1,
            custom_integrations_enabled: false,
        }
    }
}

/// Who may see and act on a garden.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Visibility {
    /// Anyone may deposit when true; otherwise only existing members.
    pub public_garden: bool,
    /// Any member may propose strategies when true.
    pub public_strategists: bool,
    /// Any member may be counted as a steward when true.
    pub public_stewards: bool,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            public_garden: true,
            public_strategists: true,
            public_stewards: true,
        }
    }
}

/// How realized strategy profit is split on finalization.
///
/// Fractions of profit; the remainder accrues to the pool. Zero values
/// select the protocol defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProfitSplit {
    pub strategist_pct: Fraction,
    pub steward_pct: Fraction,
}

impl ProfitSplit {
    /// Protocol default split: 10% strategist, 5% stewards.
    pub fn protocol_default() -> Self {
        Self {
            strategist_pct: dec!(0.10),
            steward_pct: dec!(0.05),
        }
    }

    /// Resolve zero-valued fields to the protocol defaults.
    pub fn or_default(self) -> Self {
        let defaults = Self::protocol_default();
        Self {
            strategist_pct: if self.strategist_pct.is_zero() {
                defaults.strategist_pct
            } else {
                self.strategist_pct
            },
            steward_pct: if self.steward_pct.is_zero() {
                defaults.steward_pct
            } else {
                self.steward_pct
            },
        }
    }

    /// Validate that the split leaves a non-negative remainder for the pool.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.strategist_pct < Decimal::ZERO
            || self.steward_pct < Decimal::ZERO
            || self.strategist_pct + self.steward_pct > Decimal::ONE
        {
            return Err(PolicyError::InvalidPolicy {
                reason: format!(
                    "profit split {} + {} outside [0, 1]",
                    self.strategist_pct, self.steward_pct
                ),
            });
        }
        Ok(())
    }
}

impl Default for ProfitSplit {
    fn default() -> Self {
        Self::protocol_default()
    }
}
