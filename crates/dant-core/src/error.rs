use thiserror::Error;

use crate::access::Role;
use crate::types::{AccountId, Timestamp};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DantError {
    // ── Authorization ────────────────────────────────────────────────────────
    #[error("bad role: account {account} lacks role {role:?}")]
    Unauthorized { account: AccountId, role: Role },

    #[error("role {0:?} must keep exactly one member")]
    SoleRoleMember(Role),

    // ── Referral errors ──────────────────────────────────────────────────────
    #[error("setReferral: not registered referral {0}")]
    InvalidReferrer(AccountId),

    #[error("referral reward already registered: {0}")]
    DuplicateDistributor(AccountId),

    #[error("referral reward not registered: {0}")]
    UnknownDistributor(AccountId),

    // ── Balance errors ───────────────────────────────────────────────────────
    #[error("transfer amount exceeds balance: need {need}, have {have}")]
    InsufficientBalance { need: u128, have: u128 },

    #[error("transfer amount exceeds allowance: need {need}, have {have}")]
    InsufficientAllowance { need: u128, have: u128 },

    #[error("unstake amount exceeds stake: need {need}, have {have}")]
    InsufficientStake { need: u128, have: u128 },

    #[error("zero address not allowed")]
    ZeroAddress,

    // ── Unstake requests ─────────────────────────────────────────────────────
    #[error("unstake timelock not elapsed (releases after {timelock})")]
    TimelockNotElapsed { timelock: Timestamp },

    #[error("unknown unstake request #{index}")]
    UnknownRequest { index: usize },

    #[error("unstake request #{index} already completed")]
    RequestAlreadyCompleted { index: usize },

    #[error("operation not supported by {0} policy")]
    UnsupportedByPolicy(&'static str),

    // ── Arithmetic / parsing ─────────────────────────────────────────────────
    #[error("arithmetic overflow")]
    Overflow,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    // ── General ──────────────────────────────────────────────────────────────
    #[error("audit failed: {0}")]
    AuditFailed(String),

    #[error("{0}")]
    Other(String),
}
