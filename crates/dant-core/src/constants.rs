/// ─── dANT Staking Protocol Constants ─────────────────────────────────────────
///
/// Token:     Digital Antares Dollar (dANT), 18 decimals
/// Base unit: wei (1 dANT = 10^18 wei)
///
/// All rates are 18-decimal fixed point ("wad"): 1.0 == WAD.

// ── Token ────────────────────────────────────────────────────────────────────

pub const TOKEN_NAME: &str = "Digital Antares Dollar";
pub const TOKEN_SYMBOL: &str = "dANT";
pub const TOKEN_DECIMALS: u8 = 18;

/// 1 dANT expressed in wei. Also the fixed-point scale for every rate.
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Supply minted to the deployer at genesis (dANT, not wei).
pub const INITIAL_SUPPLY_TOKENS: u128 = 5_000_000;

// ── Referral tree ────────────────────────────────────────────────────────────

/// Ancestor levels that share in a participant's rewards.
pub const REFERRAL_DEPTH: usize = 3;

/// Stake tiers (high, mid, low).
pub const TIER_COUNT: usize = 3;

/// Minimum stake per tier, descending (wei).
pub const DEPOSIT_BOUNDS: [u128; TIER_COUNT] = [5_000 * WAD, 2_000 * WAD, 100 * WAD];

/// Rate matrix `[tier][level]` shared by the fixed-term policies for both the
/// deposit-triggered and the staking-triggered share.
pub const REFERRAL_RATES: [[u128; REFERRAL_DEPTH]; TIER_COUNT] = [
    [60_000_000_000_000_000, 20_000_000_000_000_000, 10_000_000_000_000_000],
    [50_000_000_000_000_000, 15_000_000_000_000_000, 7_500_000_000_000_000],
    [40_000_000_000_000_000, 10_000_000_000_000_000, 5_000_000_000_000_000],
];

/// The open-ended policy pays no deposit-triggered share.
pub const ZERO_RATES: [[u128; REFERRAL_DEPTH]; TIER_COUNT] = [[0; REFERRAL_DEPTH]; TIER_COUNT];

// ── Policy presets ───────────────────────────────────────────────────────────

/// Type 0 (fixed term, auto-exit): 300 days at 1% per day.
pub const TYPE0_DURATION_SECS: i64 = 25_920_000;
pub const TYPE0_REWARD_PER_SEC: u128 = 115_740_741_000;

/// Type 1 (fixed term, explicit exit): 150 days at 0.75% per day.
pub const TYPE1_DURATION_SECS: i64 = 12_960_000;
pub const TYPE1_REWARD_PER_SEC: u128 = 86_805_555_556;

/// Type 2 (open-ended): no maturity, 0.5% per day.
pub const TYPE2_DURATION_SECS: i64 = 0;
pub const TYPE2_REWARD_PER_SEC: u128 = 57_870_370_370;

/// Delay between an unstake request and the earliest withdrawal: 3 days.
pub const UNSTAKE_TIMELOCK_SECS: i64 = 259_200;
