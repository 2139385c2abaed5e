//! Differential, consolidated and snapshot containers for the versioned
//! store engine.
//!
//! This crate is pure in-memory data structure: it knows how to hold and
//! look up [`vstore_core::VersionEntry`] values in the three layered
//! containers, but has no knowledge of checkpoint files, the replicator,
//! or locking. The checkpoint/consolidation pipeline in `vstore-engine`
//! is the only caller that mutates `Consolidated`/`MetadataTable`
//! wholesale; everything else here is read/write on a per-key basis.

pub mod consolidated;
pub mod differential;
pub mod snapshot_container;

pub use consolidated::{Consolidated, ConsolidatedBuilder, Partition, PARTITION_TARGET_LEN};
pub use differential::{Differential, DisplacedVersion, Slot};
pub use snapshot_container::SnapshotContainer;
