//! Store configuration: checkpoint directory, merge policy, sweep
//! interval, in-memory size target. Built via a builder, following the
//! teacher lineage's `database/config.rs` / `database/builder.rs` split.

use crate::merge_policy::MergePolicy;
use std::path::PathBuf;
use std::time::Duration;
use vstore_core::Limits;

/// Immutable configuration for a [`crate::facade::VersionedStore`]
/// instance.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory the store's own checkpoint files and metadata table
    /// live in. Owned exclusively by this store instance.
    pub checkpoint_dir: PathBuf,
    pub merge_policy: MergePolicy,
    /// Target block size for newly-written checkpoint files.
    pub block_size_bytes: usize,
    /// How often the sweep engine runs a pass; `None` disables sweep
    ///.
    pub sweep_interval: Option<Duration>,
    /// Soft in-memory resident-bytes target; exceeding it does not fail
    /// writes but is surfaced through `MemoryUsage()` and can be used by
    /// a host to trigger an out-of-band checkpoint.
    pub memory_target_bytes: u64,
    /// Default deadline applied to lock acquisitions when the caller
    /// does not supply one explicitly.
    pub default_lock_deadline: Duration,
    /// Key/value size limits enforced by `Add`/`ConditionalUpdate`.
    pub limits: Limits,
}

impl StoreConfig {
    pub fn builder(checkpoint_dir: impl Into<PathBuf>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(checkpoint_dir)
    }
}

/// Builder for [`StoreConfig`]; every field has a sensible default so
/// `StoreConfig::builder(dir).build()` is already a usable store.
pub struct StoreConfigBuilder {
    checkpoint_dir: PathBuf,
    merge_policy: MergePolicy,
    block_size_bytes: usize,
    sweep_interval: Option<Duration>,
    memory_target_bytes: u64,
    default_lock_deadline: Duration,
    limits: Limits,
}

impl StoreConfigBuilder {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        StoreConfigBuilder {
            checkpoint_dir: checkpoint_dir.into(),
            merge_policy: MergePolicy::FileCount { threshold: 8 },
            block_size_bytes: vstore_core::limits::DEFAULT_BLOCK_SIZE_BYTES,
            sweep_interval: Some(Duration::from_secs(30)),
            memory_target_bytes: 256 * 1024 * 1024,
            default_lock_deadline: Duration::from_secs(5),
            limits: Limits::default(),
        }
    }

    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn block_size_bytes(mut self, size: usize) -> Self {
        self.block_size_bytes = size;
        self
    }

    pub fn sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn memory_target_bytes(mut self, bytes: u64) -> Self {
        self.memory_target_bytes = bytes;
        self
    }

    pub fn default_lock_deadline(mut self, deadline: Duration) -> Self {
        self.default_lock_deadline = deadline;
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn build(self) -> StoreConfig {
        StoreConfig {
            checkpoint_dir: self.checkpoint_dir,
            merge_policy: self.merge_policy,
            block_size_bytes: self.block_size_bytes,
            sweep_interval: self.sweep_interval,
            memory_target_bytes: self.memory_target_bytes,
            default_lock_deadline: self.default_lock_deadline,
            limits: self.limits,
        }
    }
}
