//! Transaction handles, isolation levels and the in-process lock manager
//! for the versioned store engine.

pub mod isolation;
pub mod lock_manager;
pub mod transaction;

pub use isolation::IsolationLevel;
pub use lock_manager::{InProcessLockManager, KeyLockHandle};
pub use transaction::Transaction;
