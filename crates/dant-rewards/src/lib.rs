pub mod engine;
pub mod policy;

pub use engine::{Receipt, RewardsEngine, StakerRecord};
pub use policy::{PolicyConfig, PolicyKind};
