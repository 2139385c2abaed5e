//! Metadata table `M` — the in-memory descriptor of the on-disk
//! checkpoint. Lives in `core` (rather than
//! `vstore-storage` or `vstore-durability` alone) because both the
//! in-memory consolidated container and the on-disk persistence layer
//! need the same shape without creating a dependency cycle between
//! those two crates.

use crate::vsn::Vsn;
use serde::{Deserialize, Serialize};

/// One checkpoint file's bookkeeping: logical id, location, and the
/// live/total entry counts merge policies key off of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub file_id: u64,
    pub relative_path: String,
    pub live_count: u64,
    pub total_count: u64,
    pub size_bytes: u64,
}

impl FileDescriptor {
    pub fn invalid_ratio(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            1.0 - (self.live_count as f64 / self.total_count as f64)
        }
    }
}

/// `(checkpoint_lsn, files)` -- invariant M1: `checkpoint_lsn` is the
/// VSN as of which the consolidated container is exactly the union of
/// `files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataTable {
    /// `None` models the legacy on-disk format that recorded no
    /// checkpoint LSN at all: idempotency is disabled when this is `None`.
    pub checkpoint_lsn: Option<Vsn>,
    pub files: Vec<FileDescriptor>,
}

impl MetadataTable {
    pub fn empty() -> Self {
        MetadataTable { checkpoint_lsn: Some(Vsn::ZERO), files: Vec::new() }
    }

    pub fn idempotency_enabled(&self) -> bool {
        self.checkpoint_lsn.is_some()
    }

    /// `true` iff `vsn` is already reflected by this checkpoint, i.e.
    /// idempotency is enabled and `vsn <= checkpoint_lsn`.
    pub fn already_checkpointed(&self, vsn: Vsn) -> bool {
        match self.checkpoint_lsn {
            Some(lsn) => vsn <= lsn,
            None => false,
        }
    }
}
