//! dant-system
//!
//! Wires the dANT token, the referral tree and the three staking engines into
//! one deployment, and exposes the operations that span components:
//!
//! 1. Token            - initial supply to the deployer
//! 2. Referral tree    - rooted at `tree_root`, administered by the deployer
//! 3. Staking engines  - one per policy, each owning a referral distributor
//!
//! Every engine and distributor is granted the minter role on the token, and
//! every distributor is registered on the tree.

pub mod params;

pub use params::{EngineParams, SystemParams};

use std::collections::BTreeSet;

use dant_core::access::Role;
use dant_core::error::DantError;
use dant_core::types::{AccountId, Balance, Timestamp};
use dant_referral::{DividendClaim, DividendSource, ReferralTree};
use dant_rewards::{PolicyKind, Receipt, RewardsEngine};
use dant_token::{AssetLedger, TokenLedger};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub fn token_address() -> AccountId {
    AccountId::from_label("dant/token")
}

pub fn tree_address() -> AccountId {
    AccountId::from_label("dant/referral-tree")
}

pub fn engine_address(kind: PolicyKind) -> AccountId {
    AccountId::from_label(&format!("dant/rewards/{kind}"))
}

pub fn distributor_address(kind: PolicyKind) -> AccountId {
    AccountId::from_label(&format!("dant/referral-rewards/{kind}"))
}

// ── System ───────────────────────────────────────────────────────────────────

/// A complete deployment. All mutation goes through `&mut self`, so calls
/// are applied one at a time in the order they are made.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    pub token: TokenLedger,
    pub tree: ReferralTree,
    pub engines: Vec<RewardsEngine>,
}

impl System {
    /// Deploy token, tree and engines, then hand out roles.
    pub fn deploy(params: SystemParams) -> Result<Self, DantError> {
        if params.admin.is_null() || params.tree_root.is_null() {
            return Err(DantError::ZeroAddress);
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = params.engines.iter().find(|e| !seen.insert(e.policy.kind)) {
            return Err(DantError::Other(format!("duplicate {} engine", dup.policy.kind)));
        }

        let admin = params.admin;
        let mut token = TokenLedger::new(admin, params.initial_supply);
        let mut tree = ReferralTree::new(tree_address(), admin, params.tree_root);
        let mut engines = Vec::with_capacity(params.engines.len());

        for ep in params.engines {
            let kind = ep.policy.kind;
            let engine = RewardsEngine::with_distributor(
                engine_address(kind),
                distributor_address(kind),
                token_address(),
                tree.id(),
                ep.policy,
                ep.referral,
            );
            token.grant_role(&admin, Role::Minter, engine.id())?;
            token.grant_role(&admin, Role::Minter, engine.referral_rewards().id())?;
            tree.add_referral_reward(&admin, engine.referral_rewards().id())?;
            info!(policy = %kind, engine = %engine.id(), "engine deployed");
            engines.push(engine);
        }

        info!(admin = %admin, root = %params.tree_root, supply = params.initial_supply, "system deployed");
        Ok(Self { token, tree, engines })
    }

    pub fn engine(&self, kind: PolicyKind) -> Result<&RewardsEngine, DantError> {
        self.engines
            .iter()
            .find(|e| e.kind() == kind)
            .ok_or_else(|| DantError::Other(format!("no {kind} engine deployed")))
    }

    // ── Token convenience ────────────────────────────────────────────────────

    /// Transfer from the deployer's holdings.
    pub fn fund(&mut self, to: AccountId, amount: Balance) -> Result<(), DantError> {
        let admin = self.token.access().admin().ok_or(DantError::ZeroAddress)?;
        self.token.transfer(admin, to, amount)
    }

    /// Let `kind`'s engine pull up to `amount` from `owner`.
    pub fn approve(&mut self, owner: AccountId, kind: PolicyKind, amount: Balance) -> Result<(), DantError> {
        let spender = self.engine(kind)?.id();
        self.token.approve(owner, spender, amount)
    }

    // ── Engine operations ────────────────────────────────────────────────────

    pub fn stake(
        &mut self,
        kind: PolicyKind,
        user: AccountId,
        amount: Balance,
        referrer: AccountId,
        now: Timestamp,
    ) -> Result<Receipt, DantError> {
        let engine = self
            .engines
            .iter_mut()
            .find(|e| e.kind() == kind)
            .ok_or_else(|| DantError::Other(format!("no {kind} engine deployed")))?;
        engine.stake(&mut self.token, &mut self.tree, user, amount, referrer, now)
    }

    pub fn unstake(&mut self, kind: PolicyKind, user: AccountId, amount: Balance, now: Timestamp) -> Result<Receipt, DantError> {
        let engine = self
            .engines
            .iter_mut()
            .find(|e| e.kind() == kind)
            .ok_or_else(|| DantError::Other(format!("no {kind} engine deployed")))?;
        engine.unstake(&mut self.token, &self.tree, user, amount, now)
    }

    pub fn withdraw_request(
        &mut self,
        kind: PolicyKind,
        user: AccountId,
        index: usize,
        now: Timestamp,
    ) -> Result<Receipt, DantError> {
        let engine = self
            .engines
            .iter_mut()
            .find(|e| e.kind() == kind)
            .ok_or_else(|| DantError::Other(format!("no {kind} engine deployed")))?;
        engine.withdraw_request(&mut self.token, &self.tree, user, index, now)
    }

    // ── Dividends ────────────────────────────────────────────────────────────

    /// Claim from a single engine's distributor as of `now`.
    pub fn claim_dividends(&mut self, kind: PolicyKind, user: AccountId, now: Timestamp) -> Result<Balance, DantError> {
        let engine = self
            .engines
            .iter_mut()
            .find(|e| e.kind() == kind)
            .ok_or_else(|| DantError::Other(format!("no {kind} engine deployed")))?;
        engine.claim_referral_dividends(&mut self.token, &self.tree, &user, now)
    }

    /// Claim from every distributor registered on the tree.
    pub fn claim_all_dividends(&mut self, user: AccountId, now: Timestamp) -> Vec<DividendClaim> {
        let mut sources: Vec<&mut dyn DividendSource> = self
            .engines
            .iter_mut()
            .map(|e| e as &mut dyn DividendSource)
            .collect();
        self.tree.claim_all_dividends(&user, &mut sources, &mut self.token, now)
    }

    /// Dividends `user` could claim across all engines at `now`, including
    /// shares of their referrals' unsettled accrual.
    pub fn pending_dividends(&self, user: &AccountId, now: Timestamp) -> Result<Balance, DantError> {
        self.engines.iter().try_fold(0, |acc: Balance, e| {
            acc.checked_add(e.get_referral_reward(&self.tree, user, now)?)
                .ok_or(DantError::Overflow)
        })
    }

    // ── Audit ────────────────────────────────────────────────────────────────

    /// Check the conservation invariants across the whole deployment.
    pub fn audit(&self) -> Result<(), DantError> {
        let mut violations = Vec::new();

        let expected_supply = self.token.initial_supply().checked_add(self.token.minted());
        if expected_supply != Some(self.token.total_supply()) {
            violations.push(format!(
                "total supply {} != initial {} + minted {}",
                self.token.total_supply(),
                self.token.initial_supply(),
                self.token.minted()
            ));
        }

        for engine in &self.engines {
            let (live, unfrozen) = engine
                .stakers()
                .fold((0u128, 0u128), |(a, u), (_, info)| (a + info.amount, u + info.unfrozen));
            if live != engine.total_stake() {
                violations.push(format!(
                    "{}: total stake {} != sum of live stakes {}",
                    engine.kind(),
                    engine.total_stake(),
                    live
                ));
            }
            let escrow = self.token.balance_of(&engine.id());
            if escrow != engine.total_stake() + unfrozen {
                violations.push(format!(
                    "{}: escrow {} != total stake {} + unfrozen {}",
                    engine.kind(),
                    escrow,
                    engine.total_stake(),
                    unfrozen
                ));
            }
        }

        if violations.is_empty() {
            return Ok(());
        }
        for v in &violations {
            warn!(violation = %v, "audit");
        }
        Err(DantError::AuditFailed(violations.join("; ")))
    }
}
