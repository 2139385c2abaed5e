//! Cooperative cancellation token.
//!
//! Deliberately not tied to any particular async runtime primitive: a
//! token is just a shared flag a caller can flip from anywhere, and
//! `checked()` turns that flag into an `Err(Error::Cancelled)` at
//! whatever granularity the checking code chooses (per checkpoint file
//! block, per sweep partition, once at a read's start).

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Turns a cancelled token into `Err(Error::Cancelled)`, otherwise
    /// `Ok(())`. The idiom this crate uses at cooperative check points:
    /// `token.checked()?;`.
    pub fn checked(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CancellationToken(cancelled={})", self.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncancelled_token_checks_ok() {
        let t = CancellationToken::new();
        assert!(t.checked().is_ok());
    }

    #[test]
    fn cancel_is_visible_through_clone() {
        let t = CancellationToken::new();
        let clone = t.clone();
        clone.cancel();
        assert!(t.is_cancelled());
        assert!(matches!(t.checked(), Err(Error::Cancelled)));
    }
}
