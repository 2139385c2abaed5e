//! Opaque key type plus the pluggable total-order comparator.
//!
//! The engine never interprets key bytes itself. `Key` is
//! a cheaply-cloneable byte buffer; ordering and hashing are delegated to
//! a user-supplied [`KeyComparator`] trait object so the same container
//! code works for byte-lexicographic keys, big-endian integer keys, or any
//! other total order a caller wants.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An opaque key: a cheaply-cloneable, immutable byte buffer.
#[derive(Clone, Eq)]
pub struct Key(pub Arc<[u8]>);

impl Key {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Key(Arc::from(bytes.into().into_boxed_slice()))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ref() == other.0.as_ref()
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_ref().hash(state)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:02x?})", self.0.as_ref())
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key::from_bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Key::from_bytes(bytes)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::from_bytes(s.as_bytes().to_vec())
    }
}

/// A user-supplied total order over [`Key`] bytes, plus a matching hash.
///
/// Must be a pure, total, and consistent function: `compare(a, b)` and
/// `compare(b, a)` must agree, and equal keys under `compare` must hash
/// equally under `hash`. The engine assumes this without re-validating it.
pub trait KeyComparator: Send + Sync + 'static {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Hash consistent with `compare`'s equality. Defaults to hashing the
    /// raw bytes, which is correct for any comparator that treats equal
    /// byte sequences as equal keys (true of every comparator in this
    /// workspace).
    fn hash_key(&self, key: &[u8]) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut h = DefaultHasher::new();
        key.hash(&mut h);
        h.finish()
    }
}

/// Plain byte-lexicographic order — the default comparator used by tests
/// and by callers with no domain-specific key encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicographicComparator;

impl KeyComparator for LexicographicComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// A [`Key`] paired with the comparator that orders it, so it can live
/// inside an ordered container (`BTreeMap`, `crossbeam_skiplist::SkipMap`)
/// that requires `Ord` without baking a single fixed order into the type.
#[derive(Clone)]
pub struct OrderedKey {
    pub key: Key,
    pub comparator: Arc<dyn KeyComparator>,
}

impl OrderedKey {
    pub fn new(key: Key, comparator: Arc<dyn KeyComparator>) -> Self {
        OrderedKey { key, comparator }
    }
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.comparator.compare(self.key.as_slice(), other.key.as_slice()) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator.compare(self.key.as_slice(), other.key.as_slice())
    }
}

impl fmt::Debug for OrderedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}
