use std::collections::HashSet;

/// Snapshot extraction mode (§4.4). `All` returns the full snapshot;
/// `Include`/`DirtyTracking` restrict extraction to the named fields —
/// they differ only in intent (an explicit field allowlist vs. the set of
/// fields the dirty tracker reports), both are realized as a dirty-filter
/// on `StateNode::snapshot_for`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotMode {
    All,
    Include(HashSet<String>),
    DirtyTracking(HashSet<String>),
}

impl SnapshotMode {
    pub fn field_filter(&self) -> Option<&HashSet<String>> {
        match self {
            SnapshotMode::All => None,
            SnapshotMode::Include(fields) | SnapshotMode::DirtyTracking(fields) => Some(fields),
        }
    }
}
