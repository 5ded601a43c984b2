//! Scan cycle and the periodic loop that drives it.
//!
//! A cycle builds a snapshot, diffs it against the previous one, runs the
//! heuristics and the anomaly detector, and persists the new snapshot. The
//! loop runs one cycle immediately, then one per interval. A failing cycle
//! is logged and the loop carries on; only the shutdown signal ends it.

use crate::analysis::anomaly::AnomalyDetector;
use crate::analysis::heuristics::HeuristicAnalyzer;
use crate::integrity::diff::diff;
use crate::integrity::scanner::SnapshotBuilder;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shield_core::event_log::{Event, EventLevel, EventSink};
use shield_core::settings::MonitorSettings;
use shield_core::snapshot::Snapshot;
use shield_core::state_store::StateStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Scanning,
    Diffing,
    Analyzing,
    Persisting,
}

/// What one cycle saw and did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub total_files: usize,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub alerts: usize,
    pub events: usize,
    pub persisted: bool,
}

pub struct Monitor {
    root: PathBuf,
    builder: SnapshotBuilder,
    analyzer: HeuristicAnalyzer,
    anomaly: AnomalyDetector,
    store: StateStore,
    sink: Arc<dyn EventSink>,
    previous: Snapshot,
    phase: CyclePhase,
    cycles: u64,
}

impl Monitor {
    /// Assemble a monitor from settings. The previous snapshot is whatever
    /// the state store holds, possibly empty.
    pub fn new(settings: &MonitorSettings, sink: Arc<dyn EventSink>) -> Self {
        Self::with_components(
            settings.protected_folder.clone(),
            SnapshotBuilder::from_settings(settings),
            HeuristicAnalyzer::new(&settings.heuristics),
            AnomalyDetector::probe(&settings.anomaly),
            StateStore::new(&settings.state_file),
            sink,
        )
    }

    pub fn with_components(
        root: PathBuf,
        builder: SnapshotBuilder,
        analyzer: HeuristicAnalyzer,
        anomaly: AnomalyDetector,
        store: StateStore,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let previous = store.load();
        info!(
            root = %root.display(),
            previous_entries = previous.len(),
            anomaly = anomaly.is_enabled(),
            "monitor ready"
        );
        Self {
            root,
            builder,
            analyzer,
            anomaly,
            store,
            sink,
            previous,
            phase: CyclePhase::Idle,
            cycles: 0,
        }
    }

    pub fn previous(&self) -> &Snapshot {
        &self.previous
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Mirror the event to tracing and append it to the sink. Sink failures
    /// are logged and swallowed.
    pub fn emit(&self, event: Event) {
        match event.level {
            EventLevel::Info => info!(event_type = %event.event_type, "{}", event.message),
            EventLevel::Warning => warn!(event_type = %event.event_type, "{}", event.message),
            EventLevel::Alert => error!(event_type = %event.event_type, "{}", event.message),
        }
        if let Err(e) = self.sink.append(&event) {
            warn!(event_type = %event.event_type, error = %e, "event sink append failed");
        }
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!(cycle = self.cycles, ?phase, "cycle phase");
        self.phase = phase;
    }

    /// Run one full cycle. Errors leave the previous snapshot untouched.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycles += 1;
        let started_at = Utc::now();
        let result = self.cycle_inner(started_at);
        self.enter(CyclePhase::Idle);
        result
    }

    fn cycle_inner(&mut self, started_at: DateTime<Utc>) -> Result<CycleReport> {
        self.emit(Event::info("scan_start", "Starting new scan cycle..."));

        self.enter(CyclePhase::Scanning);
        let outcome = self.builder.build(&self.root)?;
        let mut emitted = outcome.events.len();
        for event in outcome.events {
            self.emit(event);
        }
        let current = outcome.snapshot;

        self.enter(CyclePhase::Diffing);
        let changes = diff(&self.previous, &current);

        self.enter(CyclePhase::Analyzing);
        let mut events = self.analyzer.analyze(&changes, &current);
        events.extend(self.anomaly.observe(&current));
        let alerts = events
            .iter()
            .filter(|e| e.level == EventLevel::Alert)
            .count();
        emitted += events.len();
        for event in events {
            self.emit(event);
        }

        self.enter(CyclePhase::Persisting);
        let persisted = match self.store.save(&current) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    path = %self.store.path().display(),
                    error = %e,
                    "failed to persist snapshot"
                );
                false
            }
        };

        let report = CycleReport {
            cycle: self.cycles,
            started_at,
            total_files: current.len(),
            added: changes.added.len(),
            removed: changes.removed.len(),
            modified: changes.modified.len(),
            alerts,
            events: emitted,
            persisted,
        };
        self.previous = current;
        Ok(report)
    }
}

/// Control handle for a running monitor loop.
pub struct MonitorHandle {
    /// Notify to run the next cycle without waiting for the interval.
    pub wake: Arc<Notify>,
    /// Send `true` to stop the loop at the next idle point.
    pub shutdown_tx: watch::Sender<bool>,
}

/// Spawn the monitor loop as a tokio task. The task hands the monitor back
/// when it stops.
pub fn spawn_monitor_loop(
    mut monitor: Monitor,
    interval: Duration,
) -> (tokio::task::JoinHandle<Monitor>, MonitorHandle) {
    let wake = Arc::new(Notify::new());
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let wake_clone = wake.clone();

    let handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "monitor loop started");

        loop {
            if *shutdown_rx.borrow() {
                info!("monitor loop shutting down");
                return monitor;
            }

            match monitor.run_cycle() {
                Ok(report) => debug!(
                    cycle = report.cycle,
                    files = report.total_files,
                    added = report.added,
                    removed = report.removed,
                    modified = report.modified,
                    alerts = report.alerts,
                    "cycle complete"
                ),
                Err(e) => error!(error = %format!("{e:#}"), "cycle failed, continuing"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = wake_clone.notified() => {
                    debug!("monitor loop woken early");
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("monitor loop shutting down");
                        return monitor;
                    }
                }
            }
        }
    });

    (handle, MonitorHandle { wake, shutdown_tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shield_core::error::{Result as ShieldResult, ShieldError};
    use shield_core::event_log::MemorySink;
    use shield_core::settings::AnomalySettings;
    use std::fs;
    use tempfile::tempdir;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn append(&self, _event: &Event) -> ShieldResult<()> {
            Err(ShieldError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "sink unavailable",
            )))
        }
    }

    fn settings(dir: &std::path::Path) -> MonitorSettings {
        MonitorSettings {
            protected_folder: dir.join("protected"),
            state_file: dir.join("state/file_state.json"),
            event_log: dir.join("events.log"),
            anomaly: AnomalySettings {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn first_cycle_creates_root_and_reports_no_changes() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let mut monitor = Monitor::new(&settings(dir.path()), sink.clone());

        let report = monitor.run_cycle().unwrap();
        assert_eq!(report.cycle, 1);
        assert_eq!(report.total_files, 0);
        assert!(report.persisted);
        assert_eq!(monitor.phase(), CyclePhase::Idle);

        let types: Vec<String> = sink.events().into_iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec!["scan_start", "init", "scan_summary"]);
    }

    #[test]
    fn previous_advances_to_last_built_snapshot() {
        let dir = tempdir().unwrap();
        let s = settings(dir.path());
        fs::create_dir_all(&s.protected_folder).unwrap();
        fs::write(s.protected_folder.join("a.txt"), b"one").unwrap();

        let sink = Arc::new(MemorySink::new());
        let mut monitor = Monitor::new(&s, sink.clone());
        let first = monitor.run_cycle().unwrap();
        assert_eq!(first.added, 1);

        fs::write(s.protected_folder.join("a.txt"), b"two").unwrap();
        let second = monitor.run_cycle().unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.modified, 1);

        let third = monitor.run_cycle().unwrap();
        assert_eq!(third.modified, 0);
        assert_eq!(&StateStore::new(&s.state_file).load(), monitor.previous());
    }

    #[test]
    fn failing_sink_does_not_break_cycle() {
        let dir = tempdir().unwrap();
        let s = settings(dir.path());
        let mut monitor = Monitor::new(&s, Arc::new(FailingSink));
        let report = monitor.run_cycle().unwrap();
        assert!(report.persisted);
        assert!(s.state_file.exists());
    }

    #[test]
    fn failed_persist_still_advances_previous() {
        let dir = tempdir().unwrap();
        let mut s = settings(dir.path());
        fs::create_dir_all(&s.protected_folder).unwrap();
        fs::write(s.protected_folder.join("a.txt"), b"one").unwrap();
        // A regular file where the state directory should be.
        fs::write(dir.path().join("blocker"), b"").unwrap();
        s.state_file = dir.path().join("blocker/file_state.json");

        let sink = Arc::new(MemorySink::new());
        let mut monitor = Monitor::new(&s, sink.clone());
        let first = monitor.run_cycle().unwrap();
        assert!(!first.persisted);
        assert_eq!(monitor.previous().len(), 1);

        let second = monitor.run_cycle().unwrap();
        assert_eq!(second.added, 0);
    }

    #[tokio::test]
    async fn loop_survives_failing_cycles_and_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let mut s = settings(dir.path());
        fs::write(dir.path().join("not-a-dir"), b"").unwrap();
        s.protected_folder = dir.path().join("not-a-dir/protected");

        let sink = Arc::new(MemorySink::new());
        let monitor = Monitor::new(&s, sink.clone());
        let (handle, control) = spawn_monitor_loop(monitor, Duration::from_secs(3600));

        wait_for(&sink, "scan_start", 1).await;
        control.wake.notify_one();
        wait_for(&sink, "scan_start", 2).await;
        assert!(!handle.is_finished());
        assert_eq!(sink.count("scan_summary"), 0);

        control.shutdown_tx.send(true).unwrap();
        let monitor = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(monitor.previous().is_empty());
    }

    async fn wait_for(sink: &MemorySink, event_type: &str, count: usize) {
        for _ in 0..500 {
            if sink.count(event_type) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {count} {event_type} events");
    }
}
