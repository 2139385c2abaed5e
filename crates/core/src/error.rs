//! Unified error type for the versioned store engine.
//!
//! Every crate in the workspace returns [`Error`] (aliased as [`Result`])
//! so that a caller several layers up — the façade, the checkpoint
//! pipeline, the replicator glue — never has to match on a different
//! enum per crate. Classification helpers (`is_retryable`, `is_fatal`)
//! let callers decide whether to retry at transaction scope or tear the
//! store instance down.

use std::io;
use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced to callers of the versioned store engine.
///
/// Each variant is a distinct caller-visible error kind; infrastructure
/// variants (`Io`, `Serialization`) carry the underlying cause.
#[derive(Debug, Error)]
pub enum Error {
    /// `Add` on a key with a currently-visible non-tombstone version.
    #[error("key already exists")]
    AlreadyExists,

    /// `ConditionalUpdate`/`ConditionalRemove` on a key with no visible
    /// non-tombstone version.
    #[error("key not found")]
    NotFound,

    /// `expected_vsn` was supplied and did not match the current VSN.
    #[error("conditional check failed: expected vsn {expected:?}, found {found:?}")]
    ConditionalCheckFailed { expected: Option<u64>, found: Option<u64> },

    /// `Add`/`ConditionalUpdate`'s key exceeded `Limits::max_key_bytes`.
    #[error("key too large: {actual} bytes exceeds maximum {max}")]
    KeyTooLarge { actual: usize, max: usize },

    /// `Add`/`ConditionalUpdate`'s value exceeded `Limits::max_value_bytes`.
    #[error("value too large: {actual} bytes exceeds maximum {max}")]
    ValueTooLarge { actual: usize, max: usize },

    /// A blocked lock acquisition exceeded the caller's deadline.
    #[error("operation timed out")]
    Timeout,

    /// The replicator does not report primary role / writable status.
    #[error("store is not primary")]
    NotPrimary,

    /// The replicator does not report a readable status for this
    /// operation's isolation level.
    #[error("store is not readable")]
    NotReadable,

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The store is shutting down; no new operation is accepted.
    #[error("store is closed")]
    Closed,

    /// A checkpoint file or the metadata table failed its checksum.
    #[error("checkpoint corruption detected: {0}")]
    Corruption(String),

    /// Infrastructure: memory exhaustion while buffering a write or
    /// building a checkpoint.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Infrastructure: I/O failure reading or writing checkpoint state.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// Infrastructure: (de)serialization failure in the checkpoint file
    /// format or the metadata table.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A collaborator (lock manager, replicator) returned a value this
    /// crate cannot use (e.g. a malformed lock handle).
    #[error("invalid collaborator state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Logical precondition failures and timeouts are retryable at
    /// transaction scope without restarting the store.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::AlreadyExists
                | Error::NotFound
                | Error::ConditionalCheckFailed { .. }
                | Error::Timeout
                | Error::Cancelled
                | Error::KeyTooLarge { .. }
                | Error::ValueTooLarge { .. }
        )
    }

    /// `Corruption` is fatal for the store instance: the
    /// host should invoke restore-from-backup rather than retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

impl From<crate::limits::LimitError> for Error {
    fn from(e: crate::limits::LimitError) -> Self {
        match e {
            crate::limits::LimitError::KeyTooLong { actual, max } => Error::KeyTooLarge { actual, max },
            crate::limits::LimitError::ValueTooLarge { actual, max } => Error::ValueTooLarge { actual, max },
        }
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
