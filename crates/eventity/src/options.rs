// ABOUTME: Store construction options: tag match mode and the optional snapshot seam.
// ABOUTME: Defaults match the reference behavior: any-tag matching, no snapshots.

use std::sync::Arc;

use eventity_store::SnapshotStore;

/// How `get_by_tags` combines multiple tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMatch {
    /// Entities whose stream carries at least one of the given tags.
    #[default]
    Any,
    /// Entities whose stream carries every one of the given tags.
    All,
}

/// Options fixed at store construction. A store built with `new` gets the
/// defaults: any-tag matching and full replay on every load.
#[derive(Clone, Default)]
pub struct StoreOptions {
    pub tag_match: TagMatch,
    /// When set, `get_entity` seeds replay from the latest snapshot and
    /// `write_snapshot` persists checkpoints. Never required for
    /// correctness.
    pub snapshot_store: Option<Arc<dyn SnapshotStore>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_any_match_without_snapshots() {
        let options = StoreOptions::default();

        assert_eq!(options.tag_match, TagMatch::Any);
        assert!(options.snapshot_store.is_none());
    }
}
