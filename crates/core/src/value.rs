//! Opaque value type plus the pluggable serializer used by the checkpoint
//! file format.

use std::sync::Arc;

/// An opaque value: a cheaply-cloneable, immutable byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value(pub Arc<[u8]>);

impl Value {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value(Arc::from(bytes.into().into_boxed_slice()))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::from_bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::from_bytes(bytes)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::from_bytes(s.as_bytes().to_vec())
    }
}

/// Length-prefixed (de)serialization of a [`Value`], pluggable so callers
/// can swap in a domain-specific codec. The default writes a `u32` length prefix.
pub trait ValueSerializer: Send + Sync + 'static {
    fn write(&self, buf: &mut Vec<u8>, value: &Value);
    fn read(&self, buf: &[u8]) -> crate::error::Result<(Value, usize)>;
}

/// Default length-prefixed byte codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawValueSerializer;

impl ValueSerializer for RawValueSerializer {
    fn write(&self, buf: &mut Vec<u8>, value: &Value) {
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(value.as_slice());
    }

    fn read(&self, buf: &[u8]) -> crate::error::Result<(Value, usize)> {
        if buf.len() < 4 {
            return Err(crate::error::Error::Corruption("truncated value length".into()));
        }
        let len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        if buf.len() < 4 + len {
            return Err(crate::error::Error::Corruption("truncated value body".into()));
        }
        let value = Value::from_bytes(buf[4..4 + len].to_vec());
        Ok((value, 4 + len))
    }
}

/// Same contract as [`ValueSerializer`] but for keys, used only by the
/// checkpoint file format (the in-memory containers use [`crate::key::KeyComparator`]
/// directly and never serialize keys themselves).
pub trait KeySerializer: Send + Sync + 'static {
    fn write(&self, buf: &mut Vec<u8>, key: &crate::key::Key);
    fn read(&self, buf: &[u8]) -> crate::error::Result<(crate::key::Key, usize)>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RawKeySerializer;

impl KeySerializer for RawKeySerializer {
    fn write(&self, buf: &mut Vec<u8>, key: &crate::key::Key) {
        buf.extend_from_slice(&(key.as_slice().len() as u32).to_le_bytes());
        buf.extend_from_slice(key.as_slice());
    }

    fn read(&self, buf: &[u8]) -> crate::error::Result<(crate::key::Key, usize)> {
        if buf.len() < 4 {
            return Err(crate::error::Error::Corruption("truncated key length".into()));
        }
        let len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        if buf.len() < 4 + len {
            return Err(crate::error::Error::Corruption("truncated key body".into()));
        }
        let key = crate::key::Key::from_bytes(buf[4..4 + len].to_vec());
        Ok((key, 4 + len))
    }
}
