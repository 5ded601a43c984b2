//! Content-addressed inventory of a directory tree.
//!
//! A [`Snapshot`] maps absolute file paths to [`FileRecord`]s. The serde
//! representation is the on-disk state format shared with external tooling:
//! a JSON object keyed by path whose values carry `size`, `mtime`, `hash`
//! and `ext`.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::{self, HashMap};

/// Metadata and digest for one file observed during a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub size: u64,
    /// Seconds since the Unix epoch.
    #[serde(rename = "mtime")]
    pub modified_time: f64,
    /// Hex digest, `None` when the file could not be read this cycle.
    #[serde(rename = "hash")]
    pub content_hash: Option<String>,
    /// Lowercase, including the leading dot. Empty when the name has none.
    #[serde(rename = "ext")]
    pub extension: String,
}

impl FileRecord {
    /// A file counts as modified when its digest or its size changed. The
    /// size check catches real changes that a failed hash would hide.
    pub fn differs_from(&self, other: &FileRecord) -> bool {
        self.content_hash != other.content_hash || self.size != other.size
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: HashMap<String, FileRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, record: FileRecord) {
        self.entries.insert(path.into(), record);
    }

    pub fn entry(&mut self, path: String) -> hash_map::Entry<'_, String, FileRecord> {
        self.entries.entry(path)
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, FileRecord> {
        self.entries.iter()
    }

    pub fn sizes(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.values().map(|r| r.size)
    }
}

impl FromIterator<(String, FileRecord)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, FileRecord)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a String, &'a FileRecord);
    type IntoIter = hash_map::Iter<'a, String, FileRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
