pub mod error;
pub mod scalar;
pub mod wal;

pub use error::StoreError;
pub use scalar::ScalarStore;
pub use wal::{Wal, WalRecord, WalReplay};
