//! Round-trip and recovery behaviour of the persisted snapshot.

use shield_core::snapshot::{FileRecord, Snapshot};
use shield_core::state_store::StateStore;
use std::fs;
use tempfile::tempdir;

fn sample_snapshot() -> Snapshot {
    let mut snapshot = Snapshot::new();
    snapshot.insert(
        "/srv/protected/report.docx",
        FileRecord {
            size: 48_213,
            modified_time: 1_712_345_678.123_456_7,
            content_hash: Some(
                "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08".into(),
            ),
            extension: ".docx".into(),
        },
    );
    snapshot.insert(
        "/srv/protected/locked.db",
        FileRecord {
            size: 0,
            modified_time: 1_600_000_000.0,
            content_hash: None,
            extension: ".db".into(),
        },
    );
    snapshot.insert(
        "/srv/protected/Makefile",
        FileRecord {
            size: 912,
            modified_time: 1_650_000_000.5,
            content_hash: Some("abc".into()),
            extension: String::new(),
        },
    );
    snapshot
}

#[test]
fn persisted_snapshot_reloads_field_for_field() {
    let dir = tempdir().unwrap();
    let store = StateStore::new(dir.path().join("file_state.json"));
    let original = sample_snapshot();

    store.save(&original).unwrap();
    let reloaded = store.load();

    assert_eq!(reloaded.len(), original.len());
    for (path, record) in &original {
        assert_eq!(reloaded.get(path), Some(record), "mismatch for {path}");
    }
}

#[test]
fn save_overwrites_previous_state() {
    let dir = tempdir().unwrap();
    let store = StateStore::new(dir.path().join("file_state.json"));
    store.save(&sample_snapshot()).unwrap();
    store.save(&Snapshot::new()).unwrap();
    assert!(store.load().is_empty());
}

#[test]
fn corrupt_state_degrades_to_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("file_state.json");
    fs::write(&path, b"{\"/a\": {\"size\": \"not a number\"").unwrap();
    let store = StateStore::new(&path);
    assert!(store.load().is_empty());
}

#[test]
fn reads_state_written_by_other_tools() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("file_state.json");
    fs::write(
        &path,
        r#"{"/p/a.exe": {"size": 7, "mtime": 1700000000.5, "hash": null, "ext": ".exe"}}"#,
    )
    .unwrap();
    let snapshot = StateStore::new(&path).load();
    let record = snapshot.get("/p/a.exe").unwrap();
    assert_eq!(record.size, 7);
    assert_eq!(record.modified_time, 1_700_000_000.5);
    assert_eq!(record.content_hash, None);
    assert_eq!(record.extension, ".exe");
}
