//! Version Sequence Number — the commit LSN attached to a version entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strictly monotonically increasing sequence number, identical to the
/// replicator's commit LSN for committed operations.
///
/// `Vsn::ZERO` is reserved to mean "before any write".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vsn(pub u64);

impl Vsn {
    /// The reserved "before any write" value.
    pub const ZERO: Vsn = Vsn(0);

    pub fn new(v: u64) -> Self {
        Vsn(v)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn next(self) -> Vsn {
        Vsn(self.0 + 1)
    }
}

impl fmt::Display for Vsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Vsn {
    fn from(v: u64) -> Self {
        Vsn(v)
    }
}
