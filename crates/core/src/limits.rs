//! Size limits for keys and values, enforced by the façade.
//!
//! ## Contract
//!
//! Defaults are chosen to keep a sparse index entry small relative to a
//! typical checkpoint block and bound checkpoint file record size. A host
//! embedding this engine can construct a custom `Limits` and pass it to
//! `StoreConfigBuilder::limits` at store-open time.

use thiserror::Error;

use crate::key::Key;
use crate::value::Value;

/// Size limits enforced on every `Add`/`ConditionalUpdate`.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum key size in bytes.
    pub max_key_bytes: usize,
    /// Maximum value size in bytes.
    pub max_value_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits { max_key_bytes: MAX_KEY_BYTES, max_value_bytes: MAX_VALUE_BYTES }
    }
}

impl Limits {
    /// Validates a key's length, returning `LimitError::KeyTooLong` if it
    /// exceeds `max_key_bytes`.
    pub fn validate_key_length(&self, key: &Key) -> Result<(), LimitError> {
        let actual = key.as_slice().len();
        if actual > self.max_key_bytes {
            return Err(LimitError::KeyTooLong { actual, max: self.max_key_bytes });
        }
        Ok(())
    }

    /// Validates a value's length, returning `LimitError::ValueTooLarge` if
    /// it exceeds `max_value_bytes`.
    pub fn validate_value(&self, value: &Value) -> Result<(), LimitError> {
        let actual = value.len();
        if actual > self.max_value_bytes {
            return Err(LimitError::ValueTooLarge { actual, max: self.max_value_bytes });
        }
        Ok(())
    }
}

/// Limit validation errors, convertible into `crate::error::Error`.
#[derive(Debug, Error)]
pub enum LimitError {
    #[error("key too long: {actual} bytes exceeds maximum {max}")]
    KeyTooLong { actual: usize, max: usize },

    #[error("value too large: {actual} bytes exceeds maximum {max}")]
    ValueTooLarge { actual: usize, max: usize },
}

/// Maximum key size in bytes. Chosen to keep a sparse index entry small
/// relative to a typical block.
pub const MAX_KEY_BYTES: usize = 4 * 1024;

/// Maximum value size in bytes accepted by `Add`/`ConditionalUpdate`.
pub const MAX_VALUE_BYTES: usize = 64 * 1024 * 1024;

/// Target uncompressed size of a checkpoint file block before the writer
/// starts a new one and adds a sparse index entry.
pub const DEFAULT_BLOCK_SIZE_BYTES: usize = 64 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_within_limit_is_accepted() {
        let limits = Limits::default();
        let key = Key::from_bytes(vec![0u8; limits.max_key_bytes]);
        assert!(limits.validate_key_length(&key).is_ok());
    }

    #[test]
    fn key_exceeding_limit_is_rejected() {
        let limits = Limits::default();
        let key = Key::from_bytes(vec![0u8; limits.max_key_bytes + 1]);
        assert!(matches!(limits.validate_key_length(&key), Err(LimitError::KeyTooLong { .. })));
    }

    #[test]
    fn value_within_limit_is_accepted() {
        let limits = Limits { max_key_bytes: 16, max_value_bytes: 16 };
        let value = Value::from_bytes(vec![0u8; 16]);
        assert!(limits.validate_value(&value).is_ok());
    }

    #[test]
    fn value_exceeding_limit_is_rejected() {
        let limits = Limits { max_key_bytes: 16, max_value_bytes: 16 };
        let value = Value::from_bytes(vec![0u8; 17]);
        assert!(matches!(limits.validate_value(&value), Err(LimitError::ValueTooLarge { .. })));
    }
}
