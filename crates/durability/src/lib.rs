//! On-disk checkpoint file format, metadata table persistence, and
//! backup/restore for the versioned store engine.
//!
//! This crate knows nothing about the differential/consolidated
//! in-memory containers; it only reads and writes the self-describing
//! byte layout those containers are serialized into and restored from.

pub mod backup;
pub mod format;
pub mod metadata_store;

pub use backup::{backup_to, restore_from};
pub use format::{
    CheckpointFile, CheckpointFileWriter, DecodedRecord, RecordRef, FILE_MAGIC, FORMAT_VERSION,
};
pub use metadata_store::MetadataStore;
