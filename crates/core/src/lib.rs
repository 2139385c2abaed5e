//! Core types and collaborator contracts for the versioned store engine.
//!
//! This crate has no knowledge of how keys/values are stored or how
//! checkpoints are written to disk; it only defines the vocabulary
//! (`Key`, `Value`, `Vsn`, `VersionEntry`) and the traits every other
//! crate in the workspace programs against (`Replicator`, `LockManager`,
//! `ChangeHandler`).

pub mod cancellation;
pub mod entry;
pub mod error;
pub mod key;
pub mod limits;
pub mod metadata;
pub mod traits;
pub mod value;
pub mod vsn;

pub use cancellation::CancellationToken;
pub use entry::{DiskPointer, EntryFlags, Kind, VersionEntry};
pub use error::{Error, Result};
pub use key::{Key, KeyComparator, LexicographicComparator, OrderedKey};
pub use limits::{LimitError, Limits, DEFAULT_BLOCK_SIZE_BYTES, MAX_KEY_BYTES, MAX_VALUE_BYTES};
pub use metadata::{FileDescriptor, MetadataTable};
pub use traits::{
    ApplyContext, ChangeHandler, LockHandle, LockManager, LockMode, OperationKind, ReadStatus,
    RedoRecord, Replicator, Role, UndoRecord, WriteStatus,
};
pub use value::{KeySerializer, RawKeySerializer, RawValueSerializer, Value, ValueSerializer};
pub use vsn::Vsn;
