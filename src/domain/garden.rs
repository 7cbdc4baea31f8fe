//! The garden: a member-governed capital pool.
//!
//! A garden owns member share accounting and pool-level policy
//! enforcement. Capital itself lives in the ledger under the garden's
//! account; the engine moves it and keeps the `allocated` counter here
//! in sync.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::ids::{AccountId, AssetId, GardenId, StrategyId};
use crate::domain::money::Amount;
use crate::domain::policy::{GardenPolicy, ProfitSplit, Visibility};
use crate::error::{AuthError, PolicyError, TimingError};

/// A single member's position in a garden.
#[derive(Debug, Clone)]
pub struct Member {
    shares: Amount,
    /// Shares locked as strategy stake; included in voting power,
    /// excluded from withdrawal.
    locked: Amount,
    deposited_at: DateTime<Utc>,
}

impl Member {
    /// Total shares held (voting power).
    #[must_use]
    pub fn shares(&self) -> Amount {
        self.shares
    }

    /// Shares currently locked as strategy stake.
    #[must_use]
    pub fn locked(&self) -> Amount {
        self.locked
    }

    /// Shares available for withdrawal.
    #[must_use]
    pub fn withdrawable(&self) -> Amount {
        self.shares - self.locked
    }

    /// Timestamp of the most recent deposit; the hardlock counts from here.
    #[must_use]
    pub fn deposited_at(&self) -> DateTime<Utc> {
        self.deposited_at
    }
}

/// A member-governed capital pool.
#[derive(Debug, Clone)]
pub struct Garden {
    id: GardenId,
    reserve_asset: AssetId,
    name: String,
    symbol: String,
    metadata_uri: String,
    creator: AccountId,
    policy: GardenPolicy,
    visibility: Visibility,
    profit_split: ProfitSplit,
    members: BTreeMap<AccountId, Member>,
    strategists: BTreeSet<AccountId>,
    stewards: BTreeSet<AccountId>,
    strategies: Vec<StrategyId>,
    total_shares: Amount,
    /// Total deposited principal net of withdrawals; the deposit cap
    /// applies to this, not to NAV.
    principal: Amount,
    /// Capital currently allocated to non-finalized strategies.
    allocated: Amount,
    created_at: DateTime<Utc>,
}

impl Garden {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: GardenId,
        reserve_asset: AssetId,
        name: impl Into<String>,
        symbol: impl Into<String>,
        metadata_uri: impl Into<String>,
        creator: AccountId,
        policy: GardenPolicy,
        visibility: Visibility,
        profit_split: ProfitSplit,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut strategists = BTreeSet::new();
        strategists.insert(creator.clone());
        let mut stewards = BTreeSet::new();
        stewards.insert(creator.clone());

        Self {
            id,
            reserve_asset,
            name: name.into(),
            symbol: symbol.into(),
            metadata_uri: metadata_uri.into(),
            creator,
            policy,
            visibility,
            profit_split,
            members: BTreeMap::new(),
            strategists,
            stewards,
            strategies: Vec::new(),
            total_shares: Decimal::ZERO,
            principal: Decimal::ZERO,
            allocated: Decimal::ZERO,
            created_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> GardenId {
        self.id
    }

    /// Ledger account holding this garden's reserve.
    #[must_use]
    pub fn account(&self) -> AccountId {
        AccountId::new(self.id.to_string())
    }

    #[must_use]
    pub fn reserve_asset(&self) -> &AssetId {
        &self.reserve_asset
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub fn metadata_uri(&self) -> &str {
        &self.metadata_uri
    }

    #[must_use]
    pub fn creator(&self) -> &AccountId {
        &self.creator
    }

    #[must_use]
    pub fn policy(&self) -> &GardenPolicy {
        &self.policy
    }

    #[must_use]
    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    #[must_use]
    pub fn profit_split(&self) -> ProfitSplit {
        self.profit_split
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn total_shares(&self) -> Amount {
        self.total_shares
    }

    /// Total deposited principal net of withdrawals.
    #[must_use]
    pub fn principal(&self) -> Amount {
        self.principal
    }

    /// Capital currently allocated to non-finalized strategies.
    #[must_use]
    pub fn allocated(&self) -> Amount {
        self.allocated
    }

    #[must_use]
    pub fn is_member(&self, account: &AccountId) -> bool {
        self.members.contains_key(account)
    }

    #[must_use]
    pub fn member(&self, account: &AccountId) -> Option<&Member> {
        self.members.get(account)
    }

    /// Voting power equals shares held.
    #[must_use]
    pub fn voting_power(&self, account: &AccountId) -> Amount {
        self.members
            .get(account)
            .map_or(Decimal::ZERO, Member::shares)
    }

    #[must_use]
    pub fn strategies(&self) -> &[StrategyId] {
        &self.strategies
    }

    #[must_use]
    pub fn stewards(&self) -> impl Iterator<Item = &AccountId> {
        self.stewards.iter()
    }

    /// Accounts entitled to the steward share of strategy profit: every
    /// member when the garden has public stewards, the steward set
    /// otherwise.
    #[must_use]
    pub fn steward_accounts(&self) -> Vec<AccountId> {
        if self.visibility.public_stewards {
            self.members.keys().cloned().collect()
        } else {
            self.stewards.iter().cloned().collect()
        }
    }

    /// Whether the account may propose strategies on this garden.
    #[must_use]
    pub fn can_propose(&self, account: &AccountId) -> bool {
        self.is_member(account)
            && (self.visibility.public_strategists || self.strategists.contains(account))
    }

    /// Shares minted for a deposit of `amount` given the pool's current
    /// net asset value (reserve balance plus allocated capital).
    ///
    /// First deposit mints 1:1; later deposits mint proportionally so
    /// that voting power stays proportional to contribution.
    #[must_use]
    pub fn shares_for_deposit(&self, amount: Amount, nav: Amount) -> Amount {
        if self.total_shares.is_zero() || nav.is_zero() {
            amount
        } else {
            amount * self.total_shares / nav
        }
    }

    /// Reserve paid out for redeeming `shares` at the given NAV.
    #[must_use]
    pub fn amount_for_shares(&self, shares: Amount, nav: Amount) -> Amount {
        if self.total_shares.is_zero() {
            Decimal::ZERO
        } else {
            shares * nav / self.total_shares
        }
    }

    /// Validate a deposit against policy and visibility.
    ///
    /// The creator is exempt from the visibility check: their seed
    /// contribution predates their membership record.
    pub fn check_deposit(&self, amount: Amount, recipient: &AccountId) -> Result<(), crate::error::Error> {
        if !self.visibility.public_garden
            && !self.is_member(recipient)
            && recipient != &self.creator
        {
            return Err(AuthError::PrivateGarden { garden: self.id }.into());
        }
        if amount < self.policy.min_contribution {
            return Err(PolicyError::BelowMinContribution {
                amount,
                minimum: self.policy.min_contribution,
            }
            .into());
        }
        if self.principal + amount > self.policy.max_deposit_limit {
            return Err(PolicyError::DepositLimitExceeded {
                deposited: self.principal,
                amount,
                limit: self.policy.max_deposit_limit,
            }
            .into());
        }
        Ok(())
    }

    /// Credit a deposit: mint shares to the recipient and bump principal.
    pub(crate) fn record_deposit(
        &mut self,
        recipient: &AccountId,
        amount: Amount,
        shares: Amount,
        now: DateTime<Utc>,
    ) {
        let member = self.members.entry(recipient.clone()).or_insert(Member {
            shares: Decimal::ZERO,
            locked: Decimal::ZERO,
            deposited_at: now,
        });
        member.shares += shares;
        member.deposited_at = now;
        self.total_shares += shares;
        self.principal += amount;
    }

    /// Check the deposit hardlock for a withdrawing member.
    pub fn check_hardlock(
        &self,
        member: &Member,
        now: DateTime<Utc>,
    ) -> Result<(), TimingError> {
        let unlock_at = member.deposited_at
            + chrono::Duration::seconds(self.policy.deposit_hardlock_secs as i64);
        if now < unlock_at {
            return Err(TimingError::DepositHardlockActive {
                remaining_secs: (unlock_at - now).num_seconds().max(0) as u64,
            });
        }
        Ok(())
    }

    /// Burn redeemed shares and reduce principal by the cost basis of the
    /// redemption (clamped so principal never goes negative on profit).
    pub(crate) fn record_withdrawal(&mut self, account: &AccountId, shares: Amount, amount: Amount) {
        if let Some(member) = self.members.get_mut(account) {
            member.shares -= shares;
            let empty = member.shares.is_zero();
            if empty {
                self.members.remove(account);
            }
        }
        self.total_shares -= shares;
        self.principal = (self.principal - amount).max(Decimal::ZERO);
    }

    pub(crate) fn push_strategy(&mut self, id: StrategyId) {
        self.strategies.push(id);
    }

    /// Lock a proposer's stake in shares.
    pub(crate) fn lock_stake(
        &mut self,
        proposer: &AccountId,
        stake: Amount,
    ) -> Result<(), PolicyError> {
        let member = self.members.get_mut(proposer).ok_or_else(|| {
            PolicyError::InsufficientStake {
                stake,
                shares: Decimal::ZERO,
            }
        })?;
        if member.withdrawable() < stake {
            return Err(PolicyError::InsufficientStake {
                stake,
                shares: member.withdrawable(),
            });
        }
        member.locked += stake;
        Ok(())
    }

    /// Release a previously locked stake (strategy rejected or finalized
    /// at a profit).
    pub(crate) fn release_stake(&mut self, proposer: &AccountId, stake: Amount) {
        if let Some(member) = self.members.get_mut(proposer) {
            member.locked = (member.locked - stake).max(Decimal::ZERO);
        }
    }

    /// Burn up to `stake` of the proposer's locked shares to cover a loss.
    /// Returns the shares actually burned.
    pub(crate) fn slash_stake(&mut self, proposer: &AccountId, stake: Amount, loss_shares: Amount) -> Amount {
        let Some(member) = self.members.get_mut(proposer) else {
            return Decimal::ZERO;
        };
        let burn = stake.min(loss_shares).min(member.shares);
        member.locked = (member.locked - stake).max(Decimal::ZERO);
        member.shares -= burn;
        self.total_shares -= burn;
        burn
    }

    /// Reserve capital for a strategy execution.
    pub(crate) fn allocate(&mut self, amount: Amount) {
        self.allocated += amount;
    }

    /// Return capital from a finalized strategy.
    pub(crate) fn deallocate(&mut self, amount: Amount) {
        self.allocated = (self.allocated - amount).max(Decimal::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn policy() -> GardenPolicy {
        GardenPolicy {
            max_deposit_limit: dec!(100),
            min_liquidity_asset: dec!(100),
            deposit_hardlock_secs: 1,
            min_contribution: dec!(0.1),
            strategy_cooldown_secs: 86_400,
            min_voter_quorum: dec!(0.10),
            min_strategy_duration_secs: 3 * 86_400,
            max_strategy_duration_secs: 365 * 86_400,
            min_voters: 1,
            custom_integrations_enabled: true,
        }
    }

    fn garden() -> Garden {
        Garden::new(
            GardenId::new(1),
            AssetId::from("WETH"),
            "Fountain",
            "FTN",
            "ipfs://fountain",
            AccountId::from("alice"),
            policy(),
            Visibility::default(),
            ProfitSplit::default(),
            Utc::now(),
        )
    }

    #[test]
    fn first_deposit_mints_one_to_one() {
        let g = garden();
        assert_eq!(g.shares_for_deposit(dec!(1), Decimal::ZERO), dec!(1));
    }

    #[test]
    fn later_deposits_mint_proportionally() {
        let mut g = garden();
        let now = Utc::now();
        g.record_deposit(&AccountId::from("alice"), dec!(1), dec!(1), now);

        // Pool NAV doubled without new shares; a 1 WETH deposit now buys
        // half a share.
        let shares = g.shares_for_deposit(dec!(1), dec!(2));
        assert_eq!(shares, dec!(0.5));
    }

    #[test]
    fn deposit_cap_enforced() {
        let g = garden();
        let err = g
            .check_deposit(dec!(150), &AccountId::from("bob"))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Policy(PolicyError::DepositLimitExceeded { .. })
        ));
    }

    #[test]
    fn min_contribution_enforced() {
        let g = garden();
        let err = g
            .check_deposit(dec!(0.01), &AccountId::from("bob"))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Policy(PolicyError::BelowMinContribution { .. })
        ));
    }

    #[test]
    fn private_garden_admits_creator_seed_but_not_strangers() {
        let mut garden = Garden::new(
            GardenId::new(1),
            AssetId::from("WETH"),
            "Walled",
            "WLD",
            "",
            AccountId::from("alice"),
            policy(),
            Visibility {
                public_garden: false,
                public_strategists: true,
                public_stewards: true,
            },
            ProfitSplit::default(),
            Utc::now(),
        );

        // The creator deposits before any membership record exists.
        assert!(garden.check_deposit(dec!(1), &AccountId::from("alice")).is_ok());
        garden.record_deposit(&AccountId::from("alice"), dec!(1), dec!(1), Utc::now());

        assert!(matches!(
            garden.check_deposit(dec!(1), &AccountId::from("bob")).unwrap_err(),
            crate::error::Error::Auth(AuthError::PrivateGarden { .. })
        ));
    }

    #[test]
    fn voting_power_proportional_to_contribution() {
        let mut g = garden();
        let now = Utc::now();
        g.record_deposit(&AccountId::from("alice"), dec!(3), dec!(3), now);
        g.record_deposit(&AccountId::from("bob"), dec!(1), dec!(1), now);

        assert_eq!(g.voting_power(&AccountId::from("alice")), dec!(3));
        assert_eq!(g.voting_power(&AccountId::from("bob")), dec!(1));
        assert_eq!(g.total_shares(), dec!(4));
    }

    #[test]
    fn stake_lock_requires_withdrawable_shares() {
        let mut g = garden();
        let alice = AccountId::from("alice");
        g.record_deposit(&alice, dec!(1), dec!(1), Utc::now());

        assert!(g.lock_stake(&alice, dec!(0.5)).is_ok());
        // Only 0.5 withdrawable now.
        assert!(matches!(
            g.lock_stake(&alice, dec!(0.6)),
            Err(PolicyError::InsufficientStake { .. })
        ));
    }

    #[test]
    fn slash_burns_at_most_stake() {
        let mut g = garden();
        let alice = AccountId::from("alice");
        g.record_deposit(&alice, dec!(1), dec!(1), Utc::now());
        g.lock_stake(&alice, dec!(0.2)).unwrap();

        let burned = g.slash_stake(&alice, dec!(0.2), dec!(5));
        assert_eq!(burned, dec!(0.2));
        assert_eq!(g.voting_power(&alice), dec!(0.8));
        assert_eq!(g.total_shares(), dec!(0.8));
    }
}
