//! Isolation levels and the visibility rule each one implies for the
//! read path.

/// The three isolation levels the façade supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Reader captures `vis(t)` on first access; every subsequent read
    /// returns the greatest VSN `<= vis(t)` that is visible.
    Snapshot,
    /// As `Snapshot`, but additionally takes a shared lock on every key
    /// read, held until transaction end.
    RepeatableRead,
    /// No snapshot VSN: reads observe the live differential/consolidated
    /// state directly, ignoring open-transaction isolation entirely.
    ReadCommitted,
}

impl IsolationLevel {
    /// Whether this level establishes a fixed snapshot VSN on first
    /// read (`Snapshot` and `RepeatableRead` both do; `ReadCommitted`
    /// never does).
    pub fn uses_snapshot(self) -> bool {
        matches!(self, IsolationLevel::Snapshot | IsolationLevel::RepeatableRead)
    }

    /// Whether reads under this level take and hold a shared key lock.
    pub fn takes_read_locks(self) -> bool {
        matches!(self, IsolationLevel::RepeatableRead)
    }
}
