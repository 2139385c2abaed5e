//! The store's layered runtime state: differential, the published
//! (consolidated, metadata) bundle, the snapshot container, and the
//! bookkeeping counters (`Count()`, resident-bytes) the façade exposes.
//!
//! `Published` is an atomically replaceable bundle: readers load it
//! through a single `ArcSwap`, so they
//! always observe either the whole old `(C, M)` pair or the whole new
//! one, never a torn mix.

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use vstore_core::{KeyComparator, MetadataTable};
use vstore_storage::{Consolidated, Differential, SnapshotContainer};

use crate::reader_registry::ReaderRegistry;

/// The consolidated container and its matching metadata table, swapped
/// together (invariant M1).
pub struct Published {
    pub consolidated: Consolidated,
    pub metadata: MetadataTable,
}

/// Running totals surfaced by `VersionedStore::memory_usage` (SPEC_FULL
/// §4.1 supplement, grounded in `Store.MemorySize.Test.cpp`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStats {
    pub resident_bytes: u64,
    pub tracked_entries: u64,
}

pub struct EngineState {
    pub comparator: Arc<dyn KeyComparator>,
    pub differential: RwLock<Arc<Differential>>,
    /// The differential frozen by checkpoint Phase P, still consulted by
    /// the read path until Phase C publishes the consolidated generation
    /// that absorbed it. `None` outside a checkpoint's Phase W.
    frozen: RwLock<Option<Arc<Differential>>>,
    pub published: ArcSwap<Published>,
    pub snapshots: Arc<SnapshotContainer>,
    pub readers: Arc<ReaderRegistry>,
    live_key_count: AtomicI64,
    resident_bytes: AtomicU64,
    next_file_id: AtomicU64,
}

impl EngineState {
    pub fn new(comparator: Arc<dyn KeyComparator>, metadata: MetadataTable) -> Self {
        let next_file_id = metadata.files.iter().map(|f| f.file_id).max().unwrap_or(0) + 1;
        EngineState {
            differential: RwLock::new(Arc::new(Differential::new(comparator.clone()))),
            frozen: RwLock::new(None),
            published: ArcSwap::from_pointee(Published {
                consolidated: Consolidated::empty(comparator.clone()),
                metadata,
            }),
            snapshots: Arc::new(SnapshotContainer::new()),
            readers: Arc::new(ReaderRegistry::new()),
            comparator,
            live_key_count: AtomicI64::new(0),
            resident_bytes: AtomicU64::new(0),
            next_file_id: AtomicU64::new(next_file_id),
        }
    }

    pub fn differential(&self) -> Arc<Differential> {
        self.differential.read().clone()
    }

    pub fn frozen_differential(&self) -> Option<Arc<Differential>> {
        self.frozen.read().clone()
    }

    /// Swaps in a fresh differential, returning the old one as the
    /// checkpoint's frozen input and retaining it as `frozen` so the read
    /// path keeps serving it until `clear_frozen` runs at Phase C
    ///.
    pub fn freeze_differential(&self) -> Arc<Differential> {
        let mut guard = self.differential.write();
        let frozen = guard.clone();
        *guard = Arc::new(frozen.fresh_like());
        *self.frozen.write() = Some(frozen.clone());
        frozen
    }

    pub fn clear_frozen(&self) {
        *self.frozen.write() = None;
    }

    pub fn published(&self) -> arc_swap::Guard<Arc<Published>> {
        self.published.load()
    }

    pub fn allocate_file_id(&self) -> u64 {
        self.next_file_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn incr_live_keys(&self, delta: i64) {
        self.live_key_count.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn live_key_count(&self) -> usize {
        self.live_key_count.load(Ordering::Relaxed).max(0) as usize
    }

    pub fn set_live_key_count(&self, count: i64) {
        self.live_key_count.store(count, Ordering::Relaxed);
    }

    pub fn add_resident_bytes(&self, delta: i64) {
        if delta >= 0 {
            self.resident_bytes.fetch_add(delta as u64, Ordering::Relaxed);
        } else {
            self.resident_bytes.fetch_sub((-delta) as u64, Ordering::Relaxed);
        }
    }

    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            resident_bytes: self.resident_bytes.load(Ordering::Relaxed),
            tracked_entries: self.live_key_count() as u64,
        }
    }

    /// Best-effort cache-back of a value a reader just loaded from disk
    /// (spec.md §9's "sweep races" resolution): only installed if
    /// `original` is still the live consolidated entry for `key` and no
    /// other reader already won the race to cache it. A lost race is not
    /// an error -- the caller already has the value it asked for either
    /// way, this only warms the cache for the *next* reader.
    pub fn try_cache_value(&self, key: &vstore_core::Key, original: &vstore_core::VersionEntry, loaded: &vstore_core::Value) {
        let probe = self.published.load();
        if probe.consolidated.try_install_value(key, original, original.with_loaded_value(loaded.clone())).is_none() {
            return;
        }
        drop(probe);

        let mut installed = false;
        self.published.rcu(|current| {
            installed = false;
            match current.consolidated.try_install_value(key, original, original.with_loaded_value(loaded.clone())) {
                Some(new_consolidated) => {
                    installed = true;
                    Arc::new(Published { consolidated: new_consolidated, metadata: current.metadata.clone() })
                }
                None => Arc::new(Published {
                    consolidated: current.consolidated.clone(),
                    metadata: current.metadata.clone(),
                }),
            }
        });
        if installed {
            self.add_resident_bytes(loaded.len() as i64);
        }
    }
}
