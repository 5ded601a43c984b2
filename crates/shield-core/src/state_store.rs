//! Persistence of the most recent snapshot between cycles and restarts.

use crate::error::Result;
use crate::snapshot::Snapshot;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last persisted snapshot. A missing or corrupt state file
    /// yields an empty snapshot, the same as a first run.
    pub fn load(&self) -> Snapshot {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no previous state, starting empty");
            return Snapshot::new();
        }
        match self.try_load() {
            Ok(snapshot) => {
                debug!(
                    path = %self.path.display(),
                    entries = snapshot.len(),
                    "previous state loaded"
                );
                snapshot
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "previous state unreadable, starting empty"
                );
                Snapshot::new()
            }
        }
    }

    fn try_load(&self) -> Result<Snapshot> {
        let json = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Overwrite the state file with `snapshot`. The write goes to a temp
    /// file in the same directory and is renamed into place.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(&mut tmp, snapshot)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!(path = %self.path.display(), entries = snapshot.len(), "state saved");
        Ok(())
    }
}
