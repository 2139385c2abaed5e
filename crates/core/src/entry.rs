//! Version entry — the tagged union every container stores.
//!
//! `VersionEntry` is
//! the only thing the differential, consolidated and snapshot containers
//! hold; readers and the checkpoint pipeline never see raw user values
//! without going through one.

use crate::vsn::Vsn;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Distinguishes Insert/Update from Delete. Insert and Update are
/// indistinguishable to readers; kept separate for diagnostics and for
/// the "new key" guard in apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Inserted,
    Updated,
    Deleted,
}

impl Kind {
    pub fn is_tombstone(self) -> bool {
        matches!(self, Kind::Deleted)
    }
}

/// A pointer into a checkpoint file: which file, what byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskPointer {
    pub file_id: u64,
    pub offset: u64,
    pub length: u32,
}

/// Mutable, out-of-line flags on a version entry that readers, apply and
/// sweep all touch independently of the entry's identity. Kept in an
/// `Arc` so a `VersionEntry` can be cloned cheaply (e.g. into a snapshot
/// bucket) while the flags remain shared with whichever container still
/// considers this entry "live" -- except the snapshot container, which
/// takes ownership of its own copy: snapshot buckets own their entries
/// outright.
#[derive(Debug, Default)]
pub struct EntryFlags {
    /// Set true on any read that returns this entry; cleared by sweep.
    pub in_use: AtomicBool,
    /// True for one checkpoint cycle after promotion from differential;
    /// shields the entry from sweep for that one pass.
    pub recently_promoted: AtomicBool,
}

impl EntryFlags {
    pub fn new(recently_promoted: bool) -> Self {
        EntryFlags {
            in_use: AtomicBool::new(false),
            recently_promoted: AtomicBool::new(recently_promoted),
        }
    }

    pub fn mark_in_use(&self) {
        self.in_use.store(true, Ordering::Release);
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn clear_in_use(&self) -> bool {
        self.in_use.swap(false, Ordering::AcqRel)
    }

    pub fn is_recently_promoted(&self) -> bool {
        self.recently_promoted.load(Ordering::Acquire)
    }

    pub fn clear_recently_promoted(&self) {
        self.recently_promoted.store(false, Ordering::Release);
    }
}

/// A single version entry: the tagged union of value-or-disk-pointer.
///
/// Invariant I1: at least one of `value`/`disk` is present. Invariant I2:
/// `kind == Deleted` implies no resident `value`. Invariant I3: `in_use`
/// transitions false->true via a reader or apply, true->false via sweep
/// only -- enforced by [`EntryFlags`] rather than by this type, since the
/// flags must be shared across clones of the same logical entry.
#[derive(Debug, Clone)]
pub struct VersionEntry {
    pub kind: Kind,
    pub vsn: Vsn,
    value: Option<crate::value::Value>,
    pub disk: Option<DiskPointer>,
    pub flags: Arc<EntryFlags>,
}

impl VersionEntry {
    /// A freshly-applied entry: resident in memory, not yet on disk.
    pub fn new_resident(kind: Kind, vsn: Vsn, value: Option<crate::value::Value>) -> Self {
        debug_assert!(
            !(kind == Kind::Deleted && value.is_some()),
            "I2: deleted entries never carry a resident value"
        );
        debug_assert!(
            kind == Kind::Deleted || value.is_some(),
            "I1: a freshly applied non-tombstone entry must carry a value"
        );
        VersionEntry {
            kind,
            vsn,
            value,
            disk: None,
            flags: Arc::new(EntryFlags::new(false)),
        }
    }

    /// An entry freshly written to a checkpoint file: still resident in
    /// memory but now also addressable on disk, with the "shield sweep
    /// for one pass" flag set.
    pub fn new_flushed(
        kind: Kind,
        vsn: Vsn,
        value: Option<crate::value::Value>,
        disk: DiskPointer,
    ) -> Self {
        VersionEntry {
            kind,
            vsn,
            value,
            disk: Some(disk),
            flags: Arc::new(EntryFlags::new(true)),
        }
    }

    /// Reconstructs an entry that was loaded back from an existing
    /// checkpoint file at open/recovery time: on disk, not resident.
    pub fn new_disk_only(kind: Kind, vsn: Vsn, disk: DiskPointer) -> Self {
        VersionEntry {
            kind,
            vsn,
            value: None,
            disk: Some(disk),
            flags: Arc::new(EntryFlags::new(false)),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.kind.is_tombstone()
    }

    /// The resident value, if any. Does not touch `in_use`; callers that
    /// return this to a reader must call [`VersionEntry::mark_in_use`]
    /// themselves (see §4.7: "value load must set `E.inUse = true`
    /// atomically after successful load").
    pub fn resident_value(&self) -> Option<&crate::value::Value> {
        self.value.as_ref()
    }

    pub fn has_resident_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn mark_in_use(&self) {
        self.flags.mark_in_use();
    }

    /// Installs a value freshly loaded from disk, but only if this
    /// `Arc`'s flags are still the ones this entry was loaded through --
    /// guards the sweep race by making the
    /// caller re-check entry identity before install. Containers hand
    /// back a *clone* of the entry they hold, so `Arc::ptr_eq` on the
    /// flags is the identity check; if the slot was replaced in the
    /// interim the flags `Arc` differs and the freshly-loaded value is
    /// discarded.
    pub fn with_loaded_value(&self, value: crate::value::Value) -> VersionEntry {
        let mut clone = self.clone();
        clone.value = Some(value);
        clone.flags.mark_in_use();
        clone
    }

    /// Releases the resident value, keeping the disk pointer -- this is
    /// exactly what sweep does to an entry.
    pub fn release_value(&self) -> VersionEntry {
        let mut clone = self.clone();
        clone.value = None;
        clone
    }

    pub fn same_identity(&self, other: &VersionEntry) -> bool {
        Arc::ptr_eq(&self.flags, &other.flags)
    }
}
