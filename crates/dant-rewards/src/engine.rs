use std::collections::BTreeMap;

use dant_core::access::Role;
use dant_core::account::{Deposit, RequestStatus, UnstakeRequest, UserAccount};
use dant_core::constants::REFERRAL_DEPTH;
use dant_core::error::DantError;
use dant_core::math::accrued;
use dant_core::types::{AccountId, Balance, Timestamp};
use dant_referral::{
    DividendMode, DividendSource, ReferralRewards, ReferralRewardsConfig, ReferralTree, Share,
};
use dant_token::AssetLedger;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::policy::{PolicyConfig, PolicyKind};

// ── Records ──────────────────────────────────────────────────────────────────

/// Everything one engine knows about one user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerRecord {
    pub info: UserAccount,
    /// Append-only; `info.deposit_head` marks the first live entry.
    pub deposits: Vec<Deposit>,
    pub requests: Vec<UnstakeRequest>,
}

/// What one call did for the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub deposited: Balance,
    pub unstaked: Balance,
    /// Reward minted by this call (not cumulative).
    pub reward: Balance,
    /// Principal transferred back to the user by this call.
    pub returned: Balance,
    pub referral_set: bool,
}

// ── Staged mutations ─────────────────────────────────────────────────────────

/// A settled copy of one user's record, committed only after every check
/// for the call has passed.
struct Staged {
    record: StakerRecord,
    reward: Balance,
    /// Principal that left the live stake through maturity.
    matured: Balance,
    /// Principal to hand back in this call.
    released: Balance,
    /// Live stake at the start of the accrual window.
    window_stake: Balance,
}

// ── RewardsEngine ────────────────────────────────────────────────────────────

/// One staking policy instance.
///
/// The engine's own account is its escrow: staked principal and unfrozen
/// principal sit in its token balance until paid back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsEngine {
    id: AccountId,
    token: AccountId,
    config: PolicyConfig,
    total_stake: Balance,
    stakers: BTreeMap<AccountId, StakerRecord>,
    referral_rewards: ReferralRewards,
    /// referral → ancestor → time up to which the ancestor has already been
    /// paid its share of the referral's unsettled accrual. Cleared when the
    /// referral settles.
    #[serde(default)]
    checkpoints: BTreeMap<AccountId, BTreeMap<AccountId, Timestamp>>,
}

impl RewardsEngine {
    pub fn new(
        id: AccountId,
        token: AccountId,
        config: PolicyConfig,
        referral_rewards: ReferralRewards,
    ) -> Self {
        Self {
            id,
            token,
            config,
            total_stake: 0,
            stakers: BTreeMap::new(),
            referral_rewards,
            checkpoints: BTreeMap::new(),
        }
    }

    /// Build an engine together with its own distributor.
    pub fn with_distributor(
        id: AccountId,
        distributor: AccountId,
        token: AccountId,
        tree: AccountId,
        config: PolicyConfig,
        referral: ReferralRewardsConfig,
    ) -> Self {
        Self::new(id, token, config, ReferralRewards::new(distributor, token, tree, referral))
    }

    // ── Views ────────────────────────────────────────────────────────────────

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn token(&self) -> AccountId {
        self.token
    }

    pub fn kind(&self) -> PolicyKind {
        self.config.kind
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn duration(&self) -> i64 {
        self.config.duration_secs
    }

    pub fn reward_per_sec(&self) -> u128 {
        self.config.reward_per_sec
    }

    pub fn total_stake(&self) -> Balance {
        self.total_stake
    }

    pub fn referral_rewards(&self) -> &ReferralRewards {
        &self.referral_rewards
    }

    pub fn referral_rewards_mut(&mut self) -> &mut ReferralRewards {
        &mut self.referral_rewards
    }

    pub fn user_info(&self, user: &AccountId) -> UserAccount {
        self.stakers.get(user).map(|r| r.info).unwrap_or_default()
    }

    pub fn get_deposit(&self, user: &AccountId, index: usize) -> Option<Deposit> {
        self.stakers.get(user).and_then(|r| r.deposits.get(index)).copied()
    }

    pub fn unstake_request(&self, user: &AccountId, index: usize) -> Option<UnstakeRequest> {
        self.stakers.get(user).and_then(|r| r.requests.get(index)).copied()
    }

    pub fn unstake_request_count(&self, user: &AccountId) -> usize {
        self.stakers.get(user).map(|r| r.requests.len()).unwrap_or(0)
    }

    pub fn stakers(&self) -> impl Iterator<Item = (&AccountId, &UserAccount)> {
        self.stakers.iter().map(|(k, r)| (k, &r.info))
    }

    /// Reward the next interaction at `now` would mint.
    pub fn get_reward(&self, user: &AccountId, now: Timestamp) -> Result<Balance, DantError> {
        Ok(self.stage(user, now)?.reward)
    }

    /// Dividends `ancestor` could claim from this engine's distributor at
    /// `now`: booked shares plus the share of every referral's unsettled
    /// accrual.
    pub fn get_referral_reward(
        &self,
        tree: &ReferralTree,
        ancestor: &AccountId,
        now: Timestamp,
    ) -> Result<Balance, DantError> {
        let booked = self.referral_rewards.get_referral_reward(ancestor);
        self.unsettled_shares(tree, ancestor, now)?
            .iter()
            .try_fold(booked, |acc, s| add(acc, s.amount))
    }

    // ── Entry points ─────────────────────────────────────────────────────────

    /// Deposit `amount` (zero to settle only) and optionally join the tree
    /// under `referrer`.
    pub fn stake(
        &mut self,
        ledger: &mut dyn AssetLedger,
        tree: &mut ReferralTree,
        user: AccountId,
        amount: Balance,
        referrer: AccountId,
        now: Timestamp,
    ) -> Result<Receipt, DantError> {
        if user.is_null() {
            return Err(DantError::ZeroAddress);
        }
        let matures_at = match amount {
            0 => now,
            _ => {
                ledger.check_transfer_from(&self.id, &user, amount)?;
                now.checked_add(self.config.duration_secs).ok_or(DantError::Overflow)?
            }
        };
        let distributor = self.referral_rewards.id();
        let assign_referral = if !referrer.is_null() && tree.referral_of(&user).is_null() {
            tree.validate_referral(&distributor, &user, &referrer)?
        } else {
            false
        };

        let mut staged = self.stage(&user, now)?;
        self.preflight(ledger, &staged)?;

        // ── Commit ───────────────────────────────────────────────────────────
        if assign_referral {
            tree.set_referral(&distributor, user, referrer)?;
        }
        if amount > 0 {
            ledger.transfer_from(self.id, user, self.id, amount)?;
            let info = &mut staged.record.info;
            info.amount = info.amount.checked_add(amount).ok_or(DantError::Overflow)?;
            staged.record.deposits.push(Deposit { amount, matures_at });
            info.deposit_tail += 1;
        }

        let mut receipt = self.commit(ledger, tree, user, staged, amount, 0, now)?;
        receipt.referral_set = assign_referral;
        info!(
            policy = %self.config.kind,
            user = %user,
            amount,
            reward = receipt.reward,
            returned = receipt.returned,
            "staked"
        );
        Ok(receipt)
    }

    /// Open-ended policy only: move `amount` (zero meaning all of it) out of
    /// the live stake into a timelocked request.
    pub fn unstake(
        &mut self,
        ledger: &mut dyn AssetLedger,
        tree: &ReferralTree,
        user: AccountId,
        amount: Balance,
        now: Timestamp,
    ) -> Result<Receipt, DantError> {
        self.require_open_ended()?;
        let mut staged = self.stage(&user, now)?;
        let have = staged.record.info.amount;
        let resolved = if amount == 0 { have } else { amount };
        if resolved > have {
            return Err(DantError::InsufficientStake { need: resolved, have });
        }
        self.preflight(ledger, &staged)?;

        if resolved > 0 {
            let timelock = now
                .checked_add(self.config.unstake_timelock_secs)
                .ok_or(DantError::Overflow)?;
            let info = &mut staged.record.info;
            info.amount -= resolved;
            info.unfrozen = info.unfrozen.checked_add(resolved).ok_or(DantError::Overflow)?;
            staged.record.requests.push(UnstakeRequest {
                amount: resolved,
                timelock,
                status: RequestStatus::Pending,
            });
            debug!(user = %user, amount = resolved, timelock, "unstake requested");
        }

        let receipt = self.commit(ledger, tree, user, staged, 0, resolved, now)?;
        info!(policy = %self.config.kind, user = %user, amount = resolved, reward = receipt.reward, "unstaked");
        Ok(receipt)
    }

    /// Open-ended policy only: settle like `stake(0)`, insisting that request
    /// `index` is releasable now.
    pub fn withdraw_request(
        &mut self,
        ledger: &mut dyn AssetLedger,
        tree: &ReferralTree,
        user: AccountId,
        index: usize,
        now: Timestamp,
    ) -> Result<Receipt, DantError> {
        self.require_open_ended()?;
        let request = self
            .unstake_request(&user, index)
            .ok_or(DantError::UnknownRequest { index })?;
        match request.status {
            RequestStatus::Completed => return Err(DantError::RequestAlreadyCompleted { index }),
            RequestStatus::None => return Err(DantError::UnknownRequest { index }),
            RequestStatus::Pending if now <= request.timelock => {
                return Err(DantError::TimelockNotElapsed { timelock: request.timelock });
            }
            RequestStatus::Pending => {}
        }

        let staged = self.stage(&user, now)?;
        self.preflight(ledger, &staged)?;
        let receipt = self.commit(ledger, tree, user, staged, 0, 0, now)?;
        info!(policy = %self.config.kind, user = %user, index, returned = receipt.returned, "request withdrawn");
        Ok(receipt)
    }

    /// Pay `ancestor` everything this engine's distributor owes at `now`.
    ///
    /// Referrals are not settled by the claim. Each one gets a checkpoint
    /// instead, so its next settle only shares the accrual after `now` with
    /// this ancestor.
    pub fn claim_referral_dividends(
        &mut self,
        ledger: &mut dyn AssetLedger,
        tree: &ReferralTree,
        ancestor: &AccountId,
        now: Timestamp,
    ) -> Result<Balance, DantError> {
        let shares = self.unsettled_shares(tree, ancestor, now)?;
        let distributor = self.referral_rewards.id();
        let owed = shares
            .iter()
            .try_fold(self.referral_rewards.get_referral_reward(ancestor), |acc, s| add(acc, s.amount))?;
        if owed > 0 && !ledger.can_mint(&distributor) {
            return Err(DantError::Unauthorized { account: distributor, role: Role::Minter });
        }

        let paying: Vec<Share> = shares.iter().filter(|s| s.amount > 0).copied().collect();
        let credited = self.referral_rewards.credit(ledger, &paying)?;
        for s in &shares {
            self.checkpoints.entry(s.referral).or_default().insert(*ancestor, now);
        }
        let claimed = self.referral_rewards.claim_dividends(ancestor, ledger)?;
        match self.referral_rewards.config().dividend_mode {
            DividendMode::Deferred => Ok(claimed),
            DividendMode::Immediate => add(credited, claimed),
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn require_open_ended(&self) -> Result<(), DantError> {
        if self.config.kind != PolicyKind::OpenEnded {
            return Err(DantError::UnsupportedByPolicy(self.config.kind.name()));
        }
        Ok(())
    }

    /// Reward `record` accrues over `[from, to]` as stored, before any
    /// settle. Principal earns up to its maturity and no further.
    fn window_reward(&self, record: &StakerRecord, from: Timestamp, to: Timestamp) -> Result<Balance, DantError> {
        let rps = self.config.reward_per_sec;
        let mut live = record.info.amount;
        if !self.config.kind.is_fixed_term() {
            return accrued(live, rps, to.saturating_sub(from));
        }
        let mut reward: Balance = 0;
        let mut cursor = from;
        for d in record.deposits.iter().skip(record.info.deposit_head) {
            if !d.is_matured(to) {
                break;
            }
            reward = add(reward, accrued(live, rps, d.matures_at.saturating_sub(cursor))?)?;
            cursor = cursor.max(d.matures_at);
            live -= d.amount;
        }
        add(reward, accrued(live, rps, to.saturating_sub(cursor))?)
    }

    /// Every referral of `ancestor` (up to three levels down), each with the
    /// ancestor's share of the accrual the referral has not settled and the
    /// ancestor has not been paid for. Zero shares are kept so a claim can
    /// checkpoint them too.
    fn unsettled_shares(
        &self,
        tree: &ReferralTree,
        ancestor: &AccountId,
        now: Timestamp,
    ) -> Result<Vec<Share>, DantError> {
        let mut out = Vec::new();
        if ancestor.is_null() {
            return Ok(out);
        }
        let ancestor_stake = self.stakers.get(ancestor).map(|r| r.info.amount).unwrap_or(0);
        for (referral, record) in &self.stakers {
            let level = match tree
                .get_referrals(referral, REFERRAL_DEPTH)
                .iter()
                .position(|a| a == ancestor)
            {
                Some(level) => level,
                None => continue,
            };
            let from = self
                .checkpoints
                .get(referral)
                .and_then(|c| c.get(ancestor))
                .map_or(record.info.last_update, |cp| (*cp).max(record.info.last_update));
            let reward = self.window_reward(record, from, now)?;
            let amount = self
                .referral_rewards
                .staking_share(level, reward, record.info.amount, ancestor_stake)?;
            out.push(Share { referral: *referral, ancestor: *ancestor, level, amount });
        }
        Ok(out)
    }

    /// What each of `user`'s ancestors is still owed a share of when `user`
    /// settles at `now`: the full `reward`, or only the part after that
    /// ancestor's checkpoint.
    fn level_rewards(
        &self,
        tree: &ReferralTree,
        user: &AccountId,
        reward: Balance,
        now: Timestamp,
    ) -> Result<[Balance; REFERRAL_DEPTH], DantError> {
        let mut out = [reward; REFERRAL_DEPTH];
        let (record, checkpoints) = match (self.stakers.get(user), self.checkpoints.get(user)) {
            (Some(r), Some(c)) => (r, c),
            _ => return Ok(out),
        };
        for (level, ancestor) in tree.get_referrals(user, REFERRAL_DEPTH).iter().enumerate() {
            if let Some(cp) = checkpoints.get(ancestor) {
                if *cp > record.info.last_update {
                    out[level] = self.window_reward(record, *cp, now)?;
                }
            }
        }
        Ok(out)
    }

    /// Settle pass on a copy of the user's record.
    fn stage(&self, user: &AccountId, now: Timestamp) -> Result<Staged, DantError> {
        let mut record = self.stakers.get(user).cloned().unwrap_or_default();
        let window_stake = record.info.amount;
        let reward = self.window_reward(&record, record.info.last_update, now)?;
        let mut matured: Balance = 0;
        let mut released: Balance = 0;

        match self.config.kind {
            PolicyKind::FixedAutoExit | PolicyKind::FixedExplicitExit => {
                let info = &mut record.info;
                while let Some(d) = record.deposits.get(info.deposit_head).copied() {
                    if !d.is_matured(now) {
                        break;
                    }
                    info.amount -= d.amount;
                    info.deposit_head += 1;
                    matured = add(matured, d.amount)?;
                }

                if self.config.kind == PolicyKind::FixedAutoExit {
                    released = matured;
                } else {
                    info.unfrozen = add(info.unfrozen, matured)?;
                }
            }
            PolicyKind::OpenEnded => {
                let info = &mut record.info;
                for req in record.requests.iter_mut().filter(|r| r.is_releasable(now)) {
                    req.status = RequestStatus::Completed;
                    info.unfrozen -= req.amount;
                    released = add(released, req.amount)?;
                }
            }
        }

        Ok(Staged { record, reward, matured, released, window_stake })
    }

    /// Every check the commit depends on, run before the first mutation.
    fn preflight(&self, ledger: &dyn AssetLedger, staged: &Staged) -> Result<(), DantError> {
        if staged.reward > 0 && !ledger.can_mint(&self.id) {
            return Err(DantError::Unauthorized { account: self.id, role: Role::Minter });
        }
        self.referral_rewards.check_ready(ledger)
    }

    /// Mutation and payout passes.
    #[allow(clippy::too_many_arguments)]
    fn commit(
        &mut self,
        ledger: &mut dyn AssetLedger,
        tree: &ReferralTree,
        user: AccountId,
        mut staged: Staged,
        deposited: Balance,
        unstaked: Balance,
        now: Timestamp,
    ) -> Result<Receipt, DantError> {
        let total_stake = self
            .total_stake
            .checked_add(deposited)
            .and_then(|t| t.checked_sub(staged.matured))
            .and_then(|t| t.checked_sub(unstaked))
            .ok_or(DantError::Overflow)?;
        let level_rewards = self.level_rewards(tree, &user, staged.reward, now)?;

        let info = &mut staged.record.info;
        info.last_update = now;
        if staged.reward > 0 {
            ledger.mint(&self.id, user, staged.reward)?;
            info.reward = add(info.reward, staged.reward)?;
        }
        // Explicit-exit withdrawal step: pay out whatever has been unfrozen.
        if self.config.kind == PolicyKind::FixedExplicitExit && info.unfrozen > 0 {
            staged.released = add(staged.released, std::mem::take(&mut info.unfrozen))?;
        }
        if staged.released > 0 {
            ledger.transfer(self.id, user, staged.released)?;
        }

        self.stakers.insert(user, staged.record);
        self.total_stake = total_stake;
        self.checkpoints.remove(&user);

        let stakers = &self.stakers;
        let stake_of = |a: &AccountId| stakers.get(a).map(|r| r.info.amount).unwrap_or(0);
        if deposited > 0 {
            self.referral_rewards.on_deposit(tree, ledger, &user, deposited, &stake_of)?;
        }
        if staged.reward > 0 {
            self.referral_rewards
                .on_reward_by_level(tree, ledger, &user, level_rewards, staged.window_stake, &stake_of)?;
        }

        Ok(Receipt {
            deposited,
            unstaked,
            reward: staged.reward,
            returned: staged.released,
            referral_set: false,
        })
    }
}

impl DividendSource for RewardsEngine {
    fn distributor_id(&self) -> AccountId {
        self.referral_rewards.id()
    }

    fn claim_dividends(
        &mut self,
        tree: &ReferralTree,
        user: &AccountId,
        ledger: &mut dyn AssetLedger,
        now: Timestamp,
    ) -> Result<Balance, DantError> {
        self.claim_referral_dividends(ledger, tree, user, now)
    }
}

fn add(a: Balance, b: Balance) -> Result<Balance, DantError> {
    a.checked_add(b).ok_or(DantError::Overflow)
}
