//! Merge policy selection for the consolidation/merge engine.

use vstore_core::FileDescriptor;

/// Decides whether a checkpoint round also rewrites several existing
/// files into one.
#[derive(Debug, Clone, Copy)]
pub enum MergePolicy {
    /// Merge when live file count reaches `threshold`.
    FileCount { threshold: usize },
    /// Merge a file when its live/total ratio falls below `threshold`
    /// (i.e. its invalid-entry ratio rises above `1.0 - threshold`).
    InvalidEntries { live_ratio_threshold: f64 },
    /// Merge at every checkpoint -- used for stress/tests.
    All,
    /// Never merge automatically; only an explicit `force_merge` call
    /// rewrites files.
    Never,
}

impl MergePolicy {
    /// Returns `true` if this round's checkpoint should also run a
    /// merge, given the current file set.
    pub fn should_merge(&self, files: &[FileDescriptor]) -> bool {
        match self {
            MergePolicy::FileCount { threshold } => files.len() >= *threshold,
            MergePolicy::InvalidEntries { live_ratio_threshold } => files.iter().any(|f| {
                f.total_count > 0 && (f.live_count as f64 / f.total_count as f64) < *live_ratio_threshold
            }),
            MergePolicy::All => !files.is_empty(),
            MergePolicy::Never => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(live: u64, total: u64) -> FileDescriptor {
        FileDescriptor { file_id: 1, relative_path: "x".into(), live_count: live, total_count: total, size_bytes: 0 }
    }

    #[test]
    fn file_count_policy_fires_at_threshold() {
        let policy = MergePolicy::FileCount { threshold: 2 };
        assert!(!policy.should_merge(&[file(1, 1)]));
        assert!(policy.should_merge(&[file(1, 1), file(1, 1)]));
    }

    #[test]
    fn invalid_entries_policy_fires_below_ratio() {
        let policy = MergePolicy::InvalidEntries { live_ratio_threshold: 0.5 };
        assert!(!policy.should_merge(&[file(8, 10)]));
        assert!(policy.should_merge(&[file(4, 10)]));
    }
}
