use crate::error::{Result, ShieldError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Digest used for file content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

pub const DEFAULT_SUSPICIOUS_EXTENSIONS: &[&str] =
    &[".exe", ".dll", ".js", ".vbs", ".bat", ".ps1", ".jar"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicSettings {
    /// More modified files than this in one cycle raises an alert.
    pub modification_threshold: usize,
    pub suspicious_extensions: Vec<String>,
}

impl Default for HeuristicSettings {
    fn default() -> Self {
        Self {
            modification_threshold: 20,
            suspicious_extensions: DEFAULT_SUSPICIOUS_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalySettings {
    pub enabled: bool,
    /// History size required before the model is fitted.
    pub min_samples: usize,
    pub contamination: f64,
    pub trees: usize,
    pub sample_size: usize,
    pub seed: u64,
    /// `None` keeps every observation since start; `Some(n)` keeps the last n.
    pub max_history: Option<usize>,
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_samples: 20,
            contamination: 0.05,
            trees: 100,
            sample_size: 256,
            seed: 42,
            max_history: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub protected_folder: PathBuf,
    pub scan_interval_secs: u64,
    #[serde(flatten)]
    pub heuristics: HeuristicSettings,
    pub hash_algorithm: HashAlgorithm,
    pub hash_workers: usize,
    pub state_file: PathBuf,
    pub event_log: PathBuf,
    pub event_log_max_bytes: u64,
    pub anomaly: AnomalySettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            protected_folder: PathBuf::from("protected"),
            scan_interval_secs: 30,
            heuristics: HeuristicSettings::default(),
            hash_algorithm: HashAlgorithm::Sha256,
            hash_workers: 1,
            state_file: PathBuf::from("file_state.json"),
            event_log: PathBuf::from("events.log"),
            event_log_max_bytes: 5 * 1024 * 1024,
            anomaly: AnomalySettings::default(),
        }
    }
}

impl MonitorSettings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let settings: MonitorSettings = serde_json::from_str(&json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Anchor relative state and log paths under `data_dir`.
    pub fn resolve_paths(&mut self, data_dir: &Path) {
        if self.state_file.is_relative() {
            self.state_file = data_dir.join(&self.state_file);
        }
        if self.event_log.is_relative() {
            self.event_log = data_dir.join(&self.event_log);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_secs == 0 {
            return Err(ShieldError::Config("scan interval must be at least 1 second".into()));
        }
        if self.hash_workers == 0 {
            return Err(ShieldError::Config("hash_workers must be at least 1".into()));
        }
        let anomaly = &self.anomaly;
        if !(anomaly.contamination > 0.0 && anomaly.contamination <= 0.5) {
            return Err(ShieldError::Config(
                "anomaly contamination must be in (0, 0.5]".into(),
            ));
        }
        if anomaly.min_samples < 2 {
            return Err(ShieldError::Config("anomaly min_samples must be at least 2".into()));
        }
        if anomaly.trees == 0 || anomaly.sample_size < 2 {
            return Err(ShieldError::Config(
                "anomaly model needs at least one tree and a sample size of 2".into(),
            ));
        }
        if let Some(max) = anomaly.max_history {
            if max < anomaly.min_samples {
                return Err(ShieldError::Config(
                    "anomaly max_history must not be below min_samples".into(),
                ));
            }
        }
        Ok(())
    }
}
