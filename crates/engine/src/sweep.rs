//! Sweep engine: the background pass that reclaims resident-value
//! memory for entries whose disk copy is already authoritative
//!.
//!
//! Runs over the published consolidated container's partitions,
//! rebuilding only the partitions a pass actually changes (copy-on-write
//! at partition granularity, per `Consolidated::with_updated_partitions`).
//! A concurrent checkpoint Complete racing with a sweep publish is
//! resolved last-write-wins on the `ArcSwap`; a sweep pass caught mid-race
//! just re-releases the same entries on its next tick, so no
//! distinct-generation bookkeeping is needed.

use crate::state::{EngineState, Published};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use vstore_storage::Partition;

pub struct SweepEngine {
    state: Arc<EngineState>,
}

impl SweepEngine {
    pub fn new(state: Arc<EngineState>) -> Self {
        SweepEngine { state }
    }

    /// Runs a single sweep pass over the currently published consolidated
    /// container, applying the load-shed pass's four steps to each entry.
    ///
    /// Publishes through `ArcSwap::rcu`, so a concurrent checkpoint
    /// Complete racing with this pass never gets silently clobbered: on
    /// contention the closure re-runs against whatever generation just
    /// landed, recomputing its released-bytes count from that generation
    /// rather than the stale one it started with.
    #[tracing::instrument(skip(self))]
    pub fn run_pass(&self) {
        let released = AtomicI64::new(0);
        self.state.published.rcu(|current| {
            released.store(0, Ordering::Relaxed);
            let consolidated = &current.consolidated;
            let mut updates = Vec::new();
            let mut bytes = 0i64;

            for (idx, partition) in consolidated.partition_iter() {
                let mut changed = false;
                let mut new_entries = Vec::with_capacity(partition.entries.len());
                for (key, entry) in &partition.entries {
                    // Step 1: entries freshly promoted this checkpoint
                    // cycle are shielded for exactly one pass.
                    if entry.flags.is_recently_promoted() {
                        entry.flags.clear_recently_promoted();
                        new_entries.push((key.clone(), entry.clone()));
                        continue;
                    }
                    // Step 2: an entry touched since the last pass keeps
                    // its value resident; the flag itself is one-shot.
                    if entry.flags.clear_in_use() {
                        new_entries.push((key.clone(), entry.clone()));
                        continue;
                    }
                    // Step 3: release the resident value of any
                    // untouched, disk-backed, non-tombstone entry.
                    if entry.disk.is_some() && !entry.is_tombstone() && entry.has_resident_value() {
                        if let Some(v) = entry.resident_value() {
                            bytes += v.len() as i64;
                        }
                        changed = true;
                        new_entries.push((key.clone(), entry.release_value()));
                    } else {
                        new_entries.push((key.clone(), entry.clone()));
                    }
                }
                if changed {
                    updates.push((idx, Arc::new(Partition { entries: new_entries })));
                }
            }

            released.store(bytes, Ordering::Relaxed);
            Arc::new(Published {
                consolidated: consolidated.with_updated_partitions(updates),
                metadata: current.metadata.clone(),
            })
        });
        // Step 4: update the running memory counter.
        self.state.add_resident_bytes(-released.load(Ordering::Relaxed));
    }

    /// Runs `run_pass` on `interval` until `shutdown` fires true.
    pub async fn run_loop(
        self: Arc<Self>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
        interval: std::time::Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_pass(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
