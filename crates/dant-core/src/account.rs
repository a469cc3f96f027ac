use serde::{Deserialize, Serialize};

use crate::types::{Balance, Timestamp};

// ── Deposit ──────────────────────────────────────────────────────────────────

/// One stake call's principal. Immutable once recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub amount: Balance,
    pub matures_at: Timestamp,
}

impl Deposit {
    /// Strict comparison: a deposit maturing at `t` still counts as live at `t`.
    pub fn is_matured(&self, now: Timestamp) -> bool {
        self.matures_at < now
    }
}

// ── UserAccount ──────────────────────────────────────────────────────────────

/// Per-user ledger of one staking engine.
///
/// `deposit_head..deposit_tail` indexes the user's append-only deposit list:
/// entries before `deposit_head` have matured and been folded out of `amount`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Live principal that is still earning.
    pub amount: Balance,
    /// Principal released from `amount` and not yet paid back.
    pub unfrozen: Balance,
    /// Cumulative reward minted to this user.
    pub reward: Balance,
    pub last_update: Timestamp,
    pub deposit_head: usize,
    pub deposit_tail: usize,
}

impl UserAccount {
    pub fn open_deposits(&self) -> usize {
        self.deposit_tail - self.deposit_head
    }
}

// ── UnstakeRequest ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    #[default]
    None,
    Pending,
    Completed,
}

/// A timelocked withdrawal created by the open-ended policy's `unstake`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeRequest {
    pub amount: Balance,
    pub timelock: Timestamp,
    pub status: RequestStatus,
}

impl UnstakeRequest {
    /// Finalization needs `now` strictly past the timelock.
    pub fn is_releasable(&self, now: Timestamp) -> bool {
        self.status == RequestStatus::Pending && now > self.timelock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maturity_is_strict() {
        let d = Deposit { amount: 1, matures_at: 100 };
        assert!(!d.is_matured(99));
        assert!(!d.is_matured(100));
        assert!(d.is_matured(101));
    }

    #[test]
    fn request_releases_only_after_timelock() {
        let mut r = UnstakeRequest { amount: 5, timelock: 1_000, status: RequestStatus::Pending };
        assert!(!r.is_releasable(999));
        assert!(!r.is_releasable(1_000));
        assert!(r.is_releasable(1_001));
        r.status = RequestStatus::Completed;
        assert!(!r.is_releasable(2_000));
    }
}
