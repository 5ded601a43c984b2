//! Monitor events and the sinks they are appended to.
//!
//! Every signal the monitor raises (scan summaries, heuristic alerts, hash
//! failures, model warnings) is an [`Event`]. Events go to an [`EventSink`];
//! [`EventLog`] is the JSON-lines file sink read by the dashboard.

use crate::error::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_ROTATIONS: usize = 5;

pub const DEFAULT_SOURCE: &str = "shield_monitor";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventLevel {
    Info,
    Warning,
    Alert,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventLevel::Info => "INFO",
            EventLevel::Warning => "WARNING",
            EventLevel::Alert => "ALERT",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub event_type: String,
    pub source: String,
    pub message: String,
    #[serde(default = "empty_details")]
    pub details: serde_json::Value,
}

fn empty_details() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Event {
    pub fn new(level: EventLevel, event_type: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            event_type: event_type.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            message: message.into(),
            details: empty_details(),
        }
    }

    pub fn info(event_type: &str, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, event_type, message)
    }

    pub fn warning(event_type: &str, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Warning, event_type, message)
    }

    pub fn alert(event_type: &str, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Alert, event_type, message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Append-only destination for events.
pub trait EventSink: Send + Sync {
    fn append(&self, event: &Event) -> Result<()>;
}

/// JSON-lines event file with size-based rotation.
pub struct EventLog {
    path: PathBuf,
    lock: Mutex<()>,
    max_bytes: u64,
}

impl EventLog {
    pub fn new<P: AsRef<Path>>(path: P, max_bytes: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
            max_bytes,
        })
    }

    fn write_entry(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    fn rotate_if_needed(&self) -> Result<()> {
        match fs::metadata(&self.path) {
            Ok(metadata) if metadata.len() >= self.max_bytes => {}
            _ => return Ok(()),
        }
        for i in (1..=MAX_ROTATIONS).rev() {
            let rotated = self.path_with_suffix(i);
            if rotated.exists() {
                if i == MAX_ROTATIONS {
                    fs::remove_file(&rotated)?;
                } else {
                    fs::rename(&rotated, self.path_with_suffix(i + 1))?;
                }
            }
        }
        fs::rename(&self.path, self.path_with_suffix(1))?;
        debug!(path = %self.path.display(), "event log rotated");
        Ok(())
    }

    /// Read the most recent events, newest first. When the live file holds
    /// fewer than `limit` events the rotated files are read too, most recent
    /// first. Lines that fail to parse are skipped.
    pub fn read_recent(&self, limit: Option<usize>) -> Result<Vec<Event>> {
        let mut entries = Vec::new();
        let files = std::iter::once(self.path.clone())
            .chain((1..=MAX_ROTATIONS).map(|i| self.path_with_suffix(i)));
        for path in files {
            if limit.is_some_and(|lim| entries.len() >= lim) {
                break;
            }
            if !path.exists() {
                continue;
            }
            let mut events = read_events(&path)?;
            events.reverse();
            entries.extend(events);
        }
        if let Some(lim) = limit {
            entries.truncate(lim);
        }
        Ok(entries)
    }

    fn path_with_suffix(&self, index: usize) -> PathBuf {
        let filename = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "events.log".to_string());
        self.path.with_file_name(format!("{}.{}", filename, index))
    }
}

fn read_events(path: &Path) -> Result<Vec<Event>> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(event) = serde_json::from_str::<Event>(&line) {
            events.push(event);
        }
    }
    Ok(events)
}

impl EventSink for EventLog {
    fn append(&self, event: &Event) -> Result<()> {
        let _guard = self.lock.lock();
        self.rotate_if_needed()?;
        self.write_entry(event)
    }
}

/// Collects events in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl EventSink for MemorySink {
    fn append(&self, event: &Event) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
