//! Snapshot builder.
//!
//! Walks the protected folder, stats and hashes every regular file, and
//! returns a [`Snapshot`] together with the events raised while doing so.
//! A file that cannot be read is still recorded, with no digest, so the
//! change detector can fall back to its size.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde_json::json;
use sha2::{Digest, Sha256};
use shield_core::event_log::Event;
use shield_core::settings::{HashAlgorithm, MonitorSettings};
use shield_core::snapshot::{FileRecord, Snapshot};
use std::fs;
use std::collections::hash_map::Entry;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Snapshot plus the events produced while building it.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub snapshot: Snapshot,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    algorithm: HashAlgorithm,
    /// Hashing pool, present when more than one worker is configured.
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl SnapshotBuilder {
    pub fn new(algorithm: HashAlgorithm, workers: usize) -> Self {
        let pool = if workers > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("shield-hash-{i}"))
                .build()
            {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    warn!(error = %e, workers, "hash pool unavailable, hashing sequentially");
                    None
                }
            }
        } else {
            None
        };
        Self { algorithm, pool }
    }

    pub fn workers(&self) -> usize {
        self.pool
            .as_ref()
            .map(|pool| pool.current_num_threads())
            .unwrap_or(1)
    }

    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self::new(settings.hash_algorithm, settings.hash_workers)
    }

    /// Stream a file through the configured digest.
    pub fn hash_file(&self, path: &Path) -> io::Result<String> {
        let mut file = fs::File::open(path)?;
        match self.algorithm {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                io::copy(&mut file, &mut hasher)?;
                Ok(hex::encode(hasher.finalize()))
            }
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                io::copy(&mut file, &mut hasher)?;
                Ok(hasher.finalize().to_hex().to_string())
            }
        }
    }

    /// Build a snapshot of `root`. A missing root is created and yields an
    /// empty snapshot.
    pub fn build(&self, root: &Path) -> Result<ScanOutcome> {
        let mut outcome = ScanOutcome::default();

        if !root.exists() {
            fs::create_dir_all(root)
                .with_context(|| format!("Failed to create protected folder {}", root.display()))?;
            info!(path = %root.display(), "created protected folder");
            outcome.events.push(
                Event::info(
                    "init",
                    format!("Created protected folder: {}", root.display()),
                )
                .with_details(json!({ "path": root.display().to_string() })),
            );
            return Ok(outcome);
        }

        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let files = collect_files(&root);
        debug!(root = %root.display(), files = files.len(), "walk complete");

        let recorded: Vec<(&PathBuf, Option<(FileRecord, Option<Event>)>)> = match &self.pool {
            Some(pool) => pool.install(|| {
                files
                    .par_iter()
                    .map(|path| (path, self.record_file(path)))
                    .collect()
            }),
            None => files.iter().map(|path| (path, self.record_file(path))).collect(),
        };

        for (path, result) in recorded {
            let Some((record, event)) = result else {
                continue;
            };
            outcome.events.extend(event);
            match outcome.snapshot.entry(snapshot_key(path)) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(slot) => {
                    warn!(path = %path.display(), key = %slot.key(), "snapshot key collision");
                    outcome.events.push(
                        Event::warning(
                            "path_collision",
                            format!(
                                "File {} maps to an already recorded path {}; not tracked.",
                                path.display(),
                                slot.key()
                            ),
                        )
                        .with_details(json!({
                            "file": path.display().to_string(),
                            "key": slot.key(),
                        })),
                    );
                }
            }
        }

        Ok(outcome)
    }

    /// Stat and hash one file. `None` when the file vanished before it
    /// could be stat'ed.
    fn record_file(&self, path: &Path) -> Option<(FileRecord, Option<Event>)> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "file disappeared during scan");
                return None;
            }
        };
        let modified_time = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let (content_hash, event) = match self.hash_file(path) {
            Ok(hash) => (Some(hash), None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "hash failed");
                let event = Event::warning(
                    "hash_error",
                    format!("Error hashing {}: {}", path.display(), e),
                )
                .with_details(json!({
                    "file": path.display().to_string(),
                    "error": e.to_string(),
                }));
                (None, Some(event))
            }
        };

        Some((
            FileRecord {
                size: metadata.len(),
                modified_time,
                content_hash,
                extension: extension_of(path),
            },
            event,
        ))
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new(HashAlgorithm::Sha256, 1)
    }
}

/// Regular files under `root`, sorted. Symlinks to files are listed under
/// their own path; symlinked directories are not descended into.
fn collect_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "walk error");
                continue;
            }
        };
        let file_type = entry.file_type();
        let wanted = file_type.is_file()
            || (file_type.is_symlink()
                && fs::metadata(entry.path())
                    .map(|m| m.is_file())
                    .unwrap_or(false));
        if wanted {
            files.push(entry.into_path());
        }
    }
    files.sort();
    files
}

/// Snapshot key for `path`. Valid UTF-8 paths are used as-is. Other bytes
/// are written as `\xNN` so distinct names keep distinct keys.
pub fn snapshot_key(path: &Path) -> String {
    if let Some(s) = path.to_str() {
        return s.to_string();
    }
    escape_non_utf8(path)
}

#[cfg(unix)]
fn escape_non_utf8(path: &Path) -> String {
    use std::fmt::Write as _;
    use std::os::unix::ffi::OsStrExt;

    let mut key = String::new();
    for chunk in path.as_os_str().as_bytes().utf8_chunks() {
        key.push_str(chunk.valid());
        for byte in chunk.invalid() {
            let _ = write!(key, "\\x{byte:02x}");
        }
    }
    key
}

#[cfg(not(unix))]
fn escape_non_utf8(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Lowercase extension with its leading dot, or empty.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
