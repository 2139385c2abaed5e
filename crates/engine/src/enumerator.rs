//! Read path: the merge walk across differential, the frozen
//! differential (if a checkpoint's Phase W is in flight), consolidated
//! and the snapshot container.
//!
//! Every source here can hold at most one version an isolation-bound
//! reader is allowed to see, and invariant D1 guarantees versions of the
//! same key never collide in VSN across sources, so "pick the greatest
//! VSN that passes the visibility filter" is equivalent to the
//! documented source-precedence order (D including previous, then
//! frozen D, then C, then S) without needing to special-case which
//! source actually held the winning entry.

use crate::facade::InflightGuard;
use crate::file_pool::FilePool;
use crate::state::EngineState;
use std::sync::Arc;
use vstore_core::error::{Error, Result};
use vstore_core::{Key, Value, VersionEntry, Vsn};

fn visible(vis_vsn: Option<Vsn>, candidate_vsn: Vsn) -> bool {
    vis_vsn.map_or(true, |v| candidate_vsn <= v)
}

/// Point lookup: the freshest version of `key` visible at `vis_vsn`
/// (`None` means read-committed -- always the absolute latest).
pub fn lookup_entry(state: &EngineState, key: &Key, vis_vsn: Option<Vsn>) -> Option<VersionEntry> {
    let mut best: Option<VersionEntry> = None;
    let mut consider = |candidate: VersionEntry| {
        if visible(vis_vsn, candidate.vsn) && best.as_ref().map_or(true, |b| candidate.vsn > b.vsn) {
            best = Some(candidate);
        }
    };

    let differential = state.differential();
    if let Some(slot) = differential.get(key) {
        consider(slot.current);
        if let Some(prev) = slot.previous {
            consider(prev);
        }
    }
    if let Some(frozen) = state.frozen_differential() {
        if let Some(slot) = frozen.get(key) {
            consider(slot.current);
            if let Some(prev) = slot.previous {
                consider(prev);
            }
        }
    }
    if let Some(entry) = state.published().consolidated.get(key) {
        consider(entry);
    }
    if let Some(v) = vis_vsn {
        if let Some(entry) = state.snapshots.lookup(key, v) {
            consider(entry);
        }
    }
    best
}

/// Range scan: every key in `[lo, hi)` with its freshest version visible
/// at `vis_vsn`, tombstones dropped, sorted by the store's comparator.
pub fn range(
    state: &EngineState,
    lo: Option<&Key>,
    hi: Option<&Key>,
    vis_vsn: Option<Vsn>,
) -> Vec<(Key, VersionEntry)> {
    let mut candidates: Vec<(Key, VersionEntry)> = Vec::new();

    let differential = state.differential();
    for (key, slot) in differential.range(lo, hi) {
        candidates.push((key.clone(), slot.current));
        if let Some(prev) = slot.previous {
            candidates.push((key, prev));
        }
    }
    if let Some(frozen) = state.frozen_differential() {
        for (key, slot) in frozen.range(lo, hi) {
            candidates.push((key.clone(), slot.current));
            if let Some(prev) = slot.previous {
                candidates.push((key, prev));
            }
        }
    }
    candidates.extend(state.published().consolidated.range(lo, hi));
    if let Some(v) = vis_vsn {
        for (key, entry) in state.snapshots.visible_entries(v) {
            let above_lo = lo.map_or(true, |l| {
                state.comparator.compare(key.as_slice(), l.as_slice()) != std::cmp::Ordering::Less
            });
            let below_hi = hi.map_or(true, |h| {
                state.comparator.compare(key.as_slice(), h.as_slice()) == std::cmp::Ordering::Less
            });
            if above_lo && below_hi {
                candidates.push((key, entry));
            }
        }
    }

    let mut best: rustc_hash::FxHashMap<Key, VersionEntry> = rustc_hash::FxHashMap::default();
    for (key, entry) in candidates {
        if !visible(vis_vsn, entry.vsn) {
            continue;
        }
        best.entry(key)
            .and_modify(|existing: &mut VersionEntry| {
                if entry.vsn > existing.vsn {
                    *existing = entry.clone();
                }
            })
            .or_insert(entry);
    }

    let mut out: Vec<(Key, VersionEntry)> = best.into_iter().filter(|(_, e)| !e.is_tombstone()).collect();
    out.sort_by(|(k1, _), (k2, _)| state.comparator.compare(k1.as_slice(), k2.as_slice()));
    out
}

/// Lazily resolves `(Key, Vsn, Value)` triples from a pre-merged,
/// already-sorted entry list, loading any non-resident value from disk
/// through the file pool.
pub struct Enumerator {
    entries: std::vec::IntoIter<(Key, VersionEntry)>,
    pool: Arc<FilePool>,
    state: Arc<EngineState>,
    /// Keeps `VersionedStore::close`'s drain waiting for as long as this
    /// enumerator is alive, not just for the synchronous call that created
    /// it.
    _inflight: InflightGuard,
}

impl Enumerator {
    pub fn new(
        entries: Vec<(Key, VersionEntry)>,
        pool: Arc<FilePool>,
        state: Arc<EngineState>,
        inflight: InflightGuard,
    ) -> Self {
        Enumerator { entries: entries.into_iter(), pool, state, _inflight: inflight }
    }
}

impl Iterator for Enumerator {
    type Item = Result<(Key, Vsn, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, entry) = self.entries.next()?;
        let had_resident = entry.has_resident_value();
        entry.mark_in_use();
        let value = match entry.resident_value() {
            Some(v) => Ok(v.clone()),
            None => entry
                .disk
                .ok_or_else(|| Error::Corruption("entry has neither resident value nor disk pointer".into()))
                .and_then(|pointer| self.pool.load(pointer)),
        };
        if let Ok(v) = &value {
            if !had_resident {
                self.state.try_cache_value(&key, &entry, v);
            }
        }
        Some(value.map(|v| (key, entry.vsn, v)))
    }
}
