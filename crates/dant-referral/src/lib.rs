pub mod distributor;
pub mod tree;

pub use distributor::{DividendMode, RateMatrix, ReferralRewards, ReferralRewardsConfig, Share, TierBasis};
pub use tree::{DividendClaim, DividendSource, ReferralTree};
