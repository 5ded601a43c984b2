//! Rule-based analysis of a change set.
//!
//! Rules are evaluated independently and each may emit its own events:
//! - bulk modification above a threshold (possible ransomware)
//! - new files with executable or script extensions
//! - one summary per cycle, always

use serde_json::json;
use shield_core::event_log::Event;
use shield_core::settings::HeuristicSettings;
use shield_core::snapshot::Snapshot;
use std::collections::HashSet;

use crate::integrity::diff::ChangeSet;

#[derive(Debug, Clone)]
pub struct HeuristicAnalyzer {
    modification_threshold: usize,
    suspicious_extensions: HashSet<String>,
}

impl HeuristicAnalyzer {
    pub fn new(settings: &HeuristicSettings) -> Self {
        let suspicious_extensions = settings
            .suspicious_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| e.len() > 1)
            .collect();
        Self {
            modification_threshold: settings.modification_threshold,
            suspicious_extensions,
        }
    }

    pub fn is_suspicious(&self, extension: &str) -> bool {
        self.suspicious_extensions
            .contains(&extension.to_lowercase())
    }

    pub fn analyze(&self, changes: &ChangeSet, current: &Snapshot) -> Vec<Event> {
        let mut events = Vec::new();

        let modified_count = changes.modified.len();
        if modified_count > self.modification_threshold {
            events.push(
                Event::alert(
                    "possible_ransomware",
                    format!(
                        "Detected {} modified files in one scan. This may indicate ransomware.",
                        modified_count
                    ),
                )
                .with_details(json!({ "modified_count": modified_count })),
            );
        }

        for path in &changes.added {
            let Some(record) = current.get(path) else {
                continue;
            };
            if self.is_suspicious(&record.extension) {
                events.push(
                    Event::alert(
                        "suspicious_executable",
                        format!("New suspicious file created: {}", path),
                    )
                    .with_details(json!({ "file": path, "extension": record.extension })),
                );
            }
        }

        events.push(summary(changes));
        events
    }
}

fn summary(changes: &ChangeSet) -> Event {
    if changes.is_empty() {
        return Event::info("scan_summary", "No file changes detected in this scan.");
    }
    Event::info(
        "scan_summary",
        format!(
            "Scan changes: new={}, deleted={}, modified={}",
            changes.added.len(),
            changes.removed.len(),
            changes.modified.len()
        ),
    )
    .with_details(json!({
        "new_files": changes.added,
        "deleted_files": changes.removed,
        "modified_files": changes.modified,
    }))
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}
