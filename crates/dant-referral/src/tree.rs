use std::collections::BTreeMap;

use dant_core::access::{AccessControl, Role};
use dant_core::error::DantError;
use dant_core::types::{AccountId, Balance, Timestamp};
use dant_token::AssetLedger;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── DividendSource ───────────────────────────────────────────────────────────

/// A claim handle for one registered distributor, used by the
/// `claim_all_dividends` fan-out.
pub trait DividendSource {
    fn distributor_id(&self) -> AccountId;

    /// Pay out everything owed to `user` as of `now`. Returns the amount paid.
    fn claim_dividends(
        &mut self,
        tree: &ReferralTree,
        user: &AccountId,
        ledger: &mut dyn AssetLedger,
        now: Timestamp,
    ) -> Result<Balance, DantError>;
}

/// Outcome of one distributor's claim inside a fan-out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividendClaim {
    pub distributor: AccountId,
    pub paid: Balance,
    pub error: Option<String>,
}

// ── ReferralTree ─────────────────────────────────────────────────────────────

/// Single-upline referral forest anchored at `root`.
///
/// An account joins the tree by getting a referrer that is already in it, and
/// an assignment is never replaced, so the structure cannot form a cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralTree {
    id: AccountId,
    root: AccountId,
    referrals: BTreeMap<AccountId, AccountId>,
    referral_rewards: Vec<AccountId>,
    access: AccessControl,
}

impl ReferralTree {
    pub fn new(id: AccountId, admin: AccountId, root: AccountId) -> Self {
        Self {
            id,
            root,
            referrals: BTreeMap::new(),
            referral_rewards: Vec::new(),
            access: AccessControl::new(admin),
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn tree_root(&self) -> AccountId {
        self.root
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn has_role(&self, role: Role, account: &AccountId) -> bool {
        self.access.has_role(role, account)
    }

    pub fn is_in_tree(&self, account: &AccountId) -> bool {
        !account.is_null() && (*account == self.root || self.referrals.contains_key(account))
    }

    /// Direct upline of `user`, or the null address.
    pub fn referral_of(&self, user: &AccountId) -> AccountId {
        self.referrals.get(user).copied().unwrap_or(AccountId::NULL)
    }

    /// Check a `set_referral` call without applying it. `Ok(true)` means the
    /// call would record a new upline; `Ok(false)` means it would be a no-op.
    pub fn validate_referral(
        &self,
        caller: &AccountId,
        user: &AccountId,
        referrer: &AccountId,
    ) -> Result<bool, DantError> {
        self.access.ensure_role(Role::Rewards, caller)?;
        if !self.is_in_tree(referrer) {
            return Err(DantError::InvalidReferrer(*referrer));
        }
        if user.is_null() {
            return Err(DantError::ZeroAddress);
        }
        Ok(*user != self.root && !self.referrals.contains_key(user))
    }

    /// First assignment wins; later calls with a valid referrer are ignored.
    pub fn set_referral(
        &mut self,
        caller: &AccountId,
        user: AccountId,
        referrer: AccountId,
    ) -> Result<bool, DantError> {
        if !self.validate_referral(caller, &user, &referrer)? {
            return Ok(false);
        }
        self.referrals.insert(user, referrer);
        info!(user = %user, referrer = %referrer, "referral registered");
        Ok(true)
    }

    /// The `depth` nearest ancestors of `user`, nearest first, padded with
    /// the null address once the chain runs out.
    pub fn get_referrals(&self, user: &AccountId, depth: usize) -> Vec<AccountId> {
        let mut out = Vec::with_capacity(depth);
        let mut cursor = *user;
        for _ in 0..depth {
            cursor = self.referral_of(&cursor);
            out.push(cursor);
        }
        out
    }

    // ── Distributor registry ─────────────────────────────────────────────────

    pub fn get_referral_rewards(&self) -> &[AccountId] {
        &self.referral_rewards
    }

    /// Register a distributor; it also gains the right to call `set_referral`.
    pub fn add_referral_reward(&mut self, caller: &AccountId, distributor: AccountId) -> Result<(), DantError> {
        self.access.ensure_role(Role::Admin, caller)?;
        if distributor.is_null() {
            return Err(DantError::ZeroAddress);
        }
        if self.referral_rewards.contains(&distributor) {
            return Err(DantError::DuplicateDistributor(distributor));
        }
        self.access.grant_role(caller, Role::Rewards, distributor)?;
        self.referral_rewards.push(distributor);
        info!(distributor = %distributor, "referral reward registered");
        Ok(())
    }

    pub fn remove_referral_reward(&mut self, caller: &AccountId, distributor: &AccountId) -> Result<(), DantError> {
        self.access.ensure_role(Role::Admin, caller)?;
        if !self.referral_rewards.contains(distributor) {
            return Err(DantError::UnknownDistributor(*distributor));
        }
        self.access.revoke_role(caller, Role::Rewards, distributor)?;
        self.referral_rewards.retain(|d| d != distributor);
        info!(distributor = %distributor, "referral reward removed");
        Ok(())
    }

    pub fn change_admin(&mut self, caller: &AccountId, new_admin: AccountId) -> Result<(), DantError> {
        self.access.change_admin(caller, new_admin)
    }

    pub fn grant_role(&mut self, caller: &AccountId, role: Role, account: AccountId) -> Result<(), DantError> {
        self.access.grant_role(caller, role, account)
    }

    pub fn revoke_role(&mut self, caller: &AccountId, role: Role, account: &AccountId) -> Result<(), DantError> {
        self.access.revoke_role(caller, role, account)
    }

    // ── Fan-out ──────────────────────────────────────────────────────────────

    /// Claim `user`'s dividends from every registered distributor, in
    /// registration order. A failing distributor is reported and skipped.
    pub fn claim_all_dividends(
        &self,
        user: &AccountId,
        sources: &mut [&mut dyn DividendSource],
        ledger: &mut dyn AssetLedger,
        now: Timestamp,
    ) -> Vec<DividendClaim> {
        let mut out = Vec::with_capacity(self.referral_rewards.len());
        for distributor in &self.referral_rewards {
            let result = match sources.iter_mut().find(|s| s.distributor_id() == *distributor) {
                Some(source) => source.claim_dividends(self, user, ledger, now),
                None => Err(DantError::UnknownDistributor(*distributor)),
            };
            let claim = match result {
                Ok(paid) => DividendClaim { distributor: *distributor, paid, error: None },
                Err(e) => {
                    warn!(user = %user, distributor = %distributor, error = %e, "dividend claim failed");
                    DividendClaim { distributor: *distributor, paid: 0, error: Some(e.to_string()) }
                }
            };
            out.push(claim);
        }
        out
    }
}
