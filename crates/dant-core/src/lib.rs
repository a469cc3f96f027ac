pub mod access;
pub mod account;
pub mod constants;
pub mod error;
pub mod math;
pub mod types;

pub use access::{AccessControl, Role};
pub use account::*;
pub use constants::*;
pub use error::DantError;
pub use types::*;
