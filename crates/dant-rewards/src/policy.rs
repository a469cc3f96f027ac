use dant_core::constants::{
    TYPE0_DURATION_SECS, TYPE0_REWARD_PER_SEC, TYPE1_DURATION_SECS, TYPE1_REWARD_PER_SEC,
    TYPE2_DURATION_SECS, TYPE2_REWARD_PER_SEC, UNSTAKE_TIMELOCK_SECS,
};
use serde::{Deserialize, Serialize};

/// The three behavioural branches of the staking engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Type 0: fixed term; matured principal goes straight back to the user.
    FixedAutoExit,
    /// Type 1: fixed term; matured principal is unfrozen, then withdrawn.
    FixedExplicitExit,
    /// Type 2: no maturity; exit through timelocked unstake requests.
    OpenEnded,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [
        PolicyKind::FixedAutoExit,
        PolicyKind::FixedExplicitExit,
        PolicyKind::OpenEnded,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::FixedAutoExit => "fixed-auto-exit",
            PolicyKind::FixedExplicitExit => "fixed-explicit-exit",
            PolicyKind::OpenEnded => "open-ended",
        }
    }

    pub fn is_fixed_term(&self) -> bool {
        !matches!(self, PolicyKind::OpenEnded)
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters of one engine. Immutable after deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub kind: PolicyKind,
    /// Lock period of each deposit; zero for the open-ended policy.
    pub duration_secs: i64,
    /// Reward per second per staked token, 18-decimal fixed point.
    pub reward_per_sec: u128,
    /// Only read by the open-ended policy.
    #[serde(default = "default_unstake_timelock")]
    pub unstake_timelock_secs: i64,
}

fn default_unstake_timelock() -> i64 {
    UNSTAKE_TIMELOCK_SECS
}

impl PolicyConfig {
    pub fn preset(kind: PolicyKind) -> Self {
        let (duration_secs, reward_per_sec) = match kind {
            PolicyKind::FixedAutoExit => (TYPE0_DURATION_SECS, TYPE0_REWARD_PER_SEC),
            PolicyKind::FixedExplicitExit => (TYPE1_DURATION_SECS, TYPE1_REWARD_PER_SEC),
            PolicyKind::OpenEnded => (TYPE2_DURATION_SECS, TYPE2_REWARD_PER_SEC),
        };
        Self {
            kind,
            duration_secs,
            reward_per_sec,
            unstake_timelock_secs: UNSTAKE_TIMELOCK_SECS,
        }
    }

    pub fn type0() -> Self {
        Self::preset(PolicyKind::FixedAutoExit)
    }

    pub fn type1() -> Self {
        Self::preset(PolicyKind::FixedExplicitExit)
    }

    pub fn type2() -> Self {
        Self::preset(PolicyKind::OpenEnded)
    }
}
