//! Change detection between two snapshots.

use serde::Serialize;
use shield_core::snapshot::Snapshot;
use std::collections::{BTreeSet, HashSet};

/// Classified delta between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    /// Sorted by path.
    pub modified: Vec<String>,
}

impl ChangeSet {
    pub fn total(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Compare `previous` against `current`.
///
/// Runs in linear time over both key sets. Paths present in both snapshots
/// are `modified` when their digest or size differs.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> ChangeSet {
    let prev_paths: HashSet<&String> = previous.paths().collect();
    let curr_paths: HashSet<&String> = current.paths().collect();

    let added = curr_paths
        .difference(&prev_paths)
        .map(|p| (*p).clone())
        .collect();
    let removed = prev_paths
        .difference(&curr_paths)
        .map(|p| (*p).clone())
        .collect();

    let mut modified: Vec<String> = prev_paths
        .intersection(&curr_paths)
        .filter(|path| match (previous.get(path), current.get(path)) {
            (Some(prev), Some(curr)) => prev.differs_from(curr),
            _ => false,
        })
        .map(|p| (*p).clone())
        .collect();
    modified.sort();

    ChangeSet {
        added,
        removed,
        modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shield_core::snapshot::FileRecord;

    fn record(size: u64, hash: Option<&str>) -> FileRecord {
        FileRecord {
            size,
            modified_time: 1_700_000_000.0,
            content_hash: hash.map(str::to_string),
            extension: ".txt".into(),
        }
    }

    fn snapshot(entries: &[(&str, FileRecord)]) -> Snapshot {
        entries
            .iter()
            .map(|(p, r)| (p.to_string(), r.clone()))
            .collect()
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let s = snapshot(&[("/p/a", record(1, Some("a"))), ("/p/b", record(2, Some("b")))]);
        let changes = diff(&s, &s.clone());
        assert!(changes.is_empty());
        assert_eq!(changes, ChangeSet::default());
    }

    #[test]
    fn new_path_is_only_added() {
        let prev = snapshot(&[("/p/a", record(1, Some("a")))]);
        let curr = snapshot(&[("/p/a", record(1, Some("a"))), ("/p/new", record(5, Some("n")))]);
        let changes = diff(&prev, &curr);
        assert_eq!(changes.added, BTreeSet::from(["/p/new".to_string()]));
        assert!(changes.removed.is_empty());
        assert!(changes.modified.is_empty());
    }

    #[test]
    fn missing_path_is_only_removed() {
        let prev = snapshot(&[("/p/a", record(1, Some("a"))), ("/p/gone", record(5, Some("g")))]);
        let curr = snapshot(&[("/p/a", record(1, Some("a")))]);
        let changes = diff(&prev, &curr);
        assert_eq!(changes.removed, BTreeSet::from(["/p/gone".to_string()]));
        assert!(changes.added.is_empty());
        assert!(changes.modified.is_empty());
    }

    #[test]
    fn same_size_different_content_is_modified() {
        let prev = snapshot(&[("/p/a", record(4, Some("old")))]);
        let curr = snapshot(&[("/p/a", record(4, Some("new")))]);
        assert_eq!(diff(&prev, &curr).modified, vec!["/p/a".to_string()]);
    }

    #[test]
    fn size_change_detected_when_hash_failed_both_times() {
        let prev = snapshot(&[("/p/a", record(4, None))]);
        let curr = snapshot(&[("/p/a", record(9, None))]);
        assert_eq!(diff(&prev, &curr).modified, vec!["/p/a".to_string()]);

        let unchanged = snapshot(&[("/p/a", record(4, None))]);
        assert!(diff(&prev, &unchanged).is_empty());
    }

    #[test]
    fn mtime_alone_is_not_a_modification() {
        let prev = snapshot(&[("/p/a", record(4, Some("h")))]);
        let mut touched = record(4, Some("h"));
        touched.modified_time += 60.0;
        let curr = snapshot(&[("/p/a", touched)]);
        assert!(diff(&prev, &curr).is_empty());
    }

    #[test]
    fn modified_is_sorted_and_partition_is_exact() {
        let prev = snapshot(&[
            ("/p/z", record(1, Some("1"))),
            ("/p/m", record(1, Some("1"))),
            ("/p/a", record(1, Some("1"))),
            ("/p/keep", record(1, Some("1"))),
            ("/p/old", record(1, Some("1"))),
        ]);
        let curr = snapshot(&[
            ("/p/z", record(1, Some("2"))),
            ("/p/m", record(2, Some("1"))),
            ("/p/a", record(1, Some("3"))),
            ("/p/keep", record(1, Some("1"))),
            ("/p/fresh", record(1, Some("1"))),
        ]);
        let changes = diff(&prev, &curr);
        assert_eq!(changes.modified, vec!["/p/a", "/p/m", "/p/z"]);

        let mut seen: Vec<&str> = changes
            .added
            .iter()
            .chain(&changes.removed)
            .chain(&changes.modified)
            .map(String::as_str)
            .collect();
        seen.push("/p/keep");
        seen.sort();
        let mut union: Vec<&str> = prev.paths().chain(curr.paths()).map(String::as_str).collect();
        union.sort();
        union.dedup();
        assert_eq!(seen, union);
    }
}
