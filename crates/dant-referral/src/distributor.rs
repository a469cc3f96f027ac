use std::collections::BTreeMap;

use dant_core::access::Role;
use dant_core::constants::{DEPOSIT_BOUNDS, REFERRAL_DEPTH, REFERRAL_RATES, TIER_COUNT, ZERO_RATES};
use dant_core::error::DantError;
use dant_core::math::wad_mul;
use dant_core::types::{AccountId, Balance};
use dant_token::AssetLedger;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::tree::ReferralTree;

pub type RateMatrix = [[u128; REFERRAL_DEPTH]; TIER_COUNT];

// ── Configuration ────────────────────────────────────────────────────────────

/// Whose stake selects the tier row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierBasis {
    /// Deposit share by the new principal, staking share by the referred
    /// user's stake at the start of the accrual window.
    #[default]
    Trigger,
    /// Both shares by the receiving ancestor's own stake.
    Referrer,
}

/// When a computed share reaches the ancestor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DividendMode {
    /// Accrue as pending until `claim_dividends`.
    #[default]
    Deferred,
    /// Mint straight to the ancestor.
    Immediate,
}

/// Tier bounds and rate matrices. Fixed once the distributor is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralRewardsConfig {
    /// Descending minimum stake for tiers 0, 1, 2.
    pub deposit_bounds: [Balance; TIER_COUNT],
    pub deposit_rates: RateMatrix,
    pub staking_rates: RateMatrix,
    #[serde(default)]
    pub tier_basis: TierBasis,
    #[serde(default)]
    pub dividend_mode: DividendMode,
}

impl ReferralRewardsConfig {
    /// Preset for the two fixed-term engines.
    pub fn fixed_term() -> Self {
        Self {
            deposit_bounds: DEPOSIT_BOUNDS,
            deposit_rates: REFERRAL_RATES,
            staking_rates: REFERRAL_RATES,
            tier_basis: TierBasis::Trigger,
            dividend_mode: DividendMode::Deferred,
        }
    }

    /// Preset for the open-ended engine: no deposit-triggered share.
    pub fn open_ended() -> Self {
        Self {
            deposit_rates: ZERO_RATES,
            ..Self::fixed_term()
        }
    }

    /// Tier row for a stake, or `None` below the lowest bound.
    pub fn tier_of(&self, stake: Balance) -> Option<usize> {
        self.deposit_bounds.iter().position(|bound| stake >= *bound)
    }
}

impl Default for ReferralRewardsConfig {
    fn default() -> Self {
        Self::fixed_term()
    }
}

// ── ReferralRewards ──────────────────────────────────────────────────────────

/// Splits a share of each deposit and each accrued reward among the
/// triggering user's ancestors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralRewards {
    id: AccountId,
    token: AccountId,
    referral_tree: AccountId,
    config: ReferralRewardsConfig,
    pending: BTreeMap<AccountId, Balance>,
    claimed: BTreeMap<AccountId, Balance>,
}

/// A share owed to one ancestor for activity of one referral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Share {
    pub referral: AccountId,
    pub ancestor: AccountId,
    pub level: usize,
    pub amount: Balance,
}

impl ReferralRewards {
    pub fn new(id: AccountId, token: AccountId, referral_tree: AccountId, config: ReferralRewardsConfig) -> Self {
        Self {
            id,
            token,
            referral_tree,
            config,
            pending: BTreeMap::new(),
            claimed: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn token(&self) -> AccountId {
        self.token
    }

    pub fn referral_tree(&self) -> AccountId {
        self.referral_tree
    }

    pub fn config(&self) -> &ReferralRewardsConfig {
        &self.config
    }

    pub fn get_deposit_bounds(&self) -> [Balance; TIER_COUNT] {
        self.config.deposit_bounds
    }

    pub fn get_deposit_rates(&self) -> RateMatrix {
        self.config.deposit_rates
    }

    pub fn get_staking_rates(&self) -> RateMatrix {
        self.config.staking_rates
    }

    /// Dividends booked for `user` and not yet claimed. Accrual that
    /// `user`'s referrals have not settled is priced by the owning engine.
    pub fn get_referral_reward(&self, user: &AccountId) -> Balance {
        self.pending.get(user).copied().unwrap_or(0)
    }

    /// Lifetime dividends paid to `user`.
    pub fn claimed(&self, user: &AccountId) -> Balance {
        self.claimed.get(user).copied().unwrap_or(0)
    }

    /// Fail early when this distributor could not pay during a hook.
    pub fn check_ready(&self, ledger: &dyn AssetLedger) -> Result<(), DantError> {
        if self.config.dividend_mode == DividendMode::Immediate && !ledger.can_mint(&self.id) {
            return Err(DantError::Unauthorized { account: self.id, role: Role::Minter });
        }
        Ok(())
    }

    /// Share of `amount` owed to the ancestor at `level`, or zero below the
    /// lowest tier.
    pub fn price(
        &self,
        rates: &RateMatrix,
        level: usize,
        amount: Balance,
        trigger_stake: Balance,
        ancestor_stake: Balance,
    ) -> Result<Balance, DantError> {
        let tier = match self.config.tier_basis {
            TierBasis::Trigger => self.config.tier_of(trigger_stake),
            TierBasis::Referrer => self.config.tier_of(ancestor_stake),
        };
        match tier {
            Some(tier) if amount > 0 => wad_mul(amount, rates[tier][level]),
            _ => Ok(0),
        }
    }

    /// Staking-triggered share of `reward` for the ancestor at `level`.
    pub fn staking_share(
        &self,
        level: usize,
        reward: Balance,
        trigger_stake: Balance,
        ancestor_stake: Balance,
    ) -> Result<Balance, DantError> {
        let rates = self.config.staking_rates;
        self.price(&rates, level, reward, trigger_stake, ancestor_stake)
    }

    /// Walk up to three ancestors of `user` and price each level's share of
    /// `amounts[level]`. `trigger_stake` selects the tier under
    /// `TierBasis::Trigger`; `stake_of` supplies ancestor stakes under
    /// `TierBasis::Referrer`.
    pub fn shares(
        &self,
        tree: &ReferralTree,
        user: &AccountId,
        amounts: &[Balance; REFERRAL_DEPTH],
        trigger_stake: Balance,
        rates: &RateMatrix,
        stake_of: &dyn Fn(&AccountId) -> Balance,
    ) -> Result<Vec<Share>, DantError> {
        let mut out = Vec::new();
        for (level, ancestor) in tree.get_referrals(user, REFERRAL_DEPTH).into_iter().enumerate() {
            if ancestor.is_null() {
                break;
            }
            let amount = self.price(rates, level, amounts[level], trigger_stake, stake_of(&ancestor))?;
            if amount > 0 {
                out.push(Share { referral: *user, ancestor, level, amount });
            }
        }
        Ok(out)
    }

    /// Deposit-triggered hook: share of newly staked principal.
    pub fn on_deposit(
        &mut self,
        tree: &ReferralTree,
        ledger: &mut dyn AssetLedger,
        user: &AccountId,
        amount: Balance,
        stake_of: &dyn Fn(&AccountId) -> Balance,
    ) -> Result<Balance, DantError> {
        let rates = self.config.deposit_rates;
        let shares = self.shares(tree, user, &[amount; REFERRAL_DEPTH], amount, &rates, stake_of)?;
        self.credit(ledger, &shares)
    }

    /// Staking-triggered hook: share of a freshly accrued reward.
    /// `user_stake` is the referred user's stake over the accrual window.
    pub fn on_reward(
        &mut self,
        tree: &ReferralTree,
        ledger: &mut dyn AssetLedger,
        user: &AccountId,
        reward: Balance,
        user_stake: Balance,
        stake_of: &dyn Fn(&AccountId) -> Balance,
    ) -> Result<Balance, DantError> {
        self.on_reward_by_level(tree, ledger, user, [reward; REFERRAL_DEPTH], user_stake, stake_of)
    }

    /// Like `on_reward`, for when ancestors have already been paid for part
    /// of the window and each level is owed a share of a different amount.
    pub fn on_reward_by_level(
        &mut self,
        tree: &ReferralTree,
        ledger: &mut dyn AssetLedger,
        user: &AccountId,
        rewards: [Balance; REFERRAL_DEPTH],
        user_stake: Balance,
        stake_of: &dyn Fn(&AccountId) -> Balance,
    ) -> Result<Balance, DantError> {
        let rates = self.config.staking_rates;
        let shares = self.shares(tree, user, &rewards, user_stake, &rates, stake_of)?;
        self.credit(ledger, &shares)
    }

    /// Book `shares` as pending, or mint them straight away in
    /// `DividendMode::Immediate`. Returns the total booked.
    pub fn credit(&mut self, ledger: &mut dyn AssetLedger, shares: &[Share]) -> Result<Balance, DantError> {
        let mut total: Balance = 0;
        for s in shares {
            match self.config.dividend_mode {
                DividendMode::Deferred => {
                    let entry = self.pending.entry(s.ancestor).or_insert(0);
                    *entry = entry.checked_add(s.amount).ok_or(DantError::Overflow)?;
                }
                DividendMode::Immediate => {
                    ledger.mint(&self.id, s.ancestor, s.amount)?;
                    let entry = self.claimed.entry(s.ancestor).or_insert(0);
                    *entry = entry.saturating_add(s.amount);
                }
            }
            debug!(from = %s.referral, ancestor = %s.ancestor, level = s.level, amount = s.amount, "referral share");
            total = total.saturating_add(s.amount);
        }
        Ok(total)
    }

    /// Mint everything stored as pending for `user`. Zero pending is a no-op.
    pub fn claim_dividends(&mut self, user: &AccountId, ledger: &mut dyn AssetLedger) -> Result<Balance, DantError> {
        let pending = self.get_referral_reward(user);
        if pending == 0 {
            return Ok(0);
        }
        ledger.mint(&self.id, *user, pending)?;
        self.pending.remove(user);
        let entry = self.claimed.entry(*user).or_insert(0);
        *entry = entry.saturating_add(pending);
        info!(user = %user, distributor = %self.id, amount = pending, "dividends claimed");
        Ok(pending)
    }
}
