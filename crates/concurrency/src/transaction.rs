//! Transaction handle: the `t` parameter threaded through every façade
//! operation.

use crate::isolation::IsolationLevel;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use vstore_core::{LockHandle, Vsn};

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// A transaction's identity plus its fixed snapshot VSN (established on
/// first read, never moved afterwards) and the isolation level it was
/// opened with.
pub struct Transaction {
    pub txn_id: u64,
    pub isolation: IsolationLevel,
    /// Default deadline applied to lock acquisitions made on this
    /// transaction's behalf, overridable per-call.
    pub default_deadline: Duration,
    vis_vsn: Mutex<Option<Vsn>>,
    held_locks: Mutex<Vec<Box<dyn LockHandle>>>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("txn_id", &self.txn_id)
            .field("isolation", &self.isolation)
            .field("vis_vsn", &*self.vis_vsn.lock())
            .finish()
    }
}

impl Transaction {
    pub fn new(isolation: IsolationLevel, default_deadline: Duration) -> Self {
        Transaction {
            txn_id: NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed),
            isolation,
            default_deadline,
            vis_vsn: Mutex::new(None),
            held_locks: Mutex::new(Vec::new()),
        }
    }

    /// Returns this transaction's fixed snapshot VSN, establishing it
    /// from `current` if this is the first read. Returns `None`
    /// for `ReadCommitted`, which never fixes a snapshot.
    pub fn visibility_vsn(&self, current: impl FnOnce() -> Vsn) -> Option<Vsn> {
        if !self.isolation.uses_snapshot() {
            return None;
        }
        let mut guard = self.vis_vsn.lock();
        if guard.is_none() {
            *guard = Some(current());
        }
        *guard
    }

    pub fn is_snapshot_established(&self) -> bool {
        self.vis_vsn.lock().is_some()
    }

    pub fn track_lock(&self, handle: Box<dyn LockHandle>) {
        self.held_locks.lock().push(handle);
    }

    /// Releases every lock held by this transaction (called at
    /// transaction end for `RepeatableRead`/write locks; `ReadCommitted`
    /// never accumulates any).
    pub fn release_all_locks(&self) -> Vec<Box<dyn LockHandle>> {
        std::mem::take(&mut *self.held_locks.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_vsn_fixed_on_first_read() {
        let t = Transaction::new(IsolationLevel::Snapshot, Duration::from_secs(1));
        let mut calls = 0;
        let v1 = t.visibility_vsn(|| {
            calls += 1;
            Vsn::new(10)
        });
        let v2 = t.visibility_vsn(|| {
            calls += 1;
            Vsn::new(20)
        });
        assert_eq!(v1, Some(Vsn::new(10)));
        assert_eq!(v2, Some(Vsn::new(10)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn read_committed_has_no_snapshot() {
        let t = Transaction::new(IsolationLevel::ReadCommitted, Duration::from_secs(1));
        assert_eq!(t.visibility_vsn(|| Vsn::new(99)), None);
    }
}
