pub mod ledger;

pub use ledger::{AssetLedger, TokenLedger};
