//! Tracks the set of currently-open snapshot readers' visibility VSNs,
//! so the snapshot container knows when a bucket's last interested
//! reader has gone away.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use vstore_core::Vsn;
use vstore_storage::SnapshotContainer;

#[derive(Default)]
pub struct ReaderRegistry {
    open: Mutex<BTreeMap<Vsn, usize>>,
}

/// RAII guard: registers a reader's visibility VSN on creation, evicts
/// stale snapshot buckets when the last such reader drops.
pub struct ReaderGuard {
    registry: Arc<ReaderRegistry>,
    snapshots: Arc<SnapshotContainer>,
    vis_vsn: Vsn,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        ReaderRegistry { open: Mutex::new(BTreeMap::new()) }
    }

    pub fn max_open_vis(&self) -> Option<Vsn> {
        self.open.lock().keys().next_back().copied()
    }

    /// True if some currently-open reader has visibility `>= vsn` --
    /// the predicate the differential write path (`Differential::put`)
    /// and checkpoint Phase W both need to decide whether a version
    /// about to fall out of its container must be preserved in the
    /// snapshot container instead of dropped.
    pub fn any_open_at_or_above(&self, vsn: Vsn) -> bool {
        self.open.lock().range(vsn..).next().is_some()
    }

    /// Registers that a reader now holds visibility `vis_vsn`. Returns a
    /// guard that unregisters it (and triggers eviction) on drop.
    pub fn register(
        self: &Arc<Self>,
        vis_vsn: Vsn,
        snapshots: Arc<SnapshotContainer>,
    ) -> ReaderGuard {
        *self.open.lock().entry(vis_vsn).or_insert(0) += 1;
        ReaderGuard { registry: self.clone(), snapshots, vis_vsn }
    }

    fn unregister(&self, vis_vsn: Vsn) {
        let mut open = self.open.lock();
        if let Some(count) = open.get_mut(&vis_vsn) {
            *count -= 1;
            if *count == 0 {
                open.remove(&vis_vsn);
            }
        }
    }
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.vis_vsn);
        let max_vis = self.registry.max_open_vis();
        self.snapshots.evict_above(max_vis);
    }
}
