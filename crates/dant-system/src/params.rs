use dant_core::constants::{INITIAL_SUPPLY_TOKENS, WAD};
use dant_core::types::{AccountId, Balance};
use dant_referral::{ReferralRewardsConfig, TierBasis};
use dant_rewards::{PolicyConfig, PolicyKind};
use serde::{Deserialize, Serialize};

/// One staking engine and the distributor it owns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineParams {
    pub policy: PolicyConfig,
    pub referral: ReferralRewardsConfig,
}

impl EngineParams {
    pub fn preset(kind: PolicyKind) -> Self {
        let referral = if kind.is_fixed_term() {
            ReferralRewardsConfig::fixed_term()
        } else {
            ReferralRewardsConfig::open_ended()
        };
        Self { policy: PolicyConfig::preset(kind), referral }
    }
}

/// Deployment parameters. Every field falls back to the production preset
/// when omitted from JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemParams {
    /// Deployer: receives the initial supply and every admin role.
    pub admin: AccountId,
    pub tree_root: AccountId,
    /// In wei.
    pub initial_supply: Balance,
    pub engines: Vec<EngineParams>,
}

impl Default for SystemParams {
    fn default() -> Self {
        Self {
            admin: AccountId::from_label("deployer"),
            tree_root: AccountId::from_label("tree-root"),
            initial_supply: INITIAL_SUPPLY_TOKENS * WAD,
            engines: PolicyKind::ALL.iter().map(|k| EngineParams::preset(*k)).collect(),
        }
    }
}

impl SystemParams {
    pub fn preset(admin: AccountId, tree_root: AccountId) -> Self {
        Self { admin, tree_root, ..Self::default() }
    }

    /// Same tier basis on every distributor.
    pub fn with_tier_basis(mut self, basis: TierBasis) -> Self {
        for e in &mut self.engines {
            e.referral.tier_basis = basis;
        }
        self
    }
}
