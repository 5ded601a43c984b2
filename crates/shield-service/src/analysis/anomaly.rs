//! File-size anomaly detection.
//!
//! [`AnomalyDetector`] is chosen once at startup by [`AnomalyDetector::probe`]:
//! `Disabled` when the `anomaly` feature is compiled out or configuration
//! turns it off, `Enabled` otherwise. The enabled detector owns the size
//! history and refits an isolation forest over it each cycle once enough
//! observations have accumulated.

use shield_core::event_log::Event;
use shield_core::settings::AnomalySettings;
use shield_core::snapshot::Snapshot;
use tracing::{info, warn};

#[cfg(feature = "anomaly")]
pub use model::SizeModel;

pub enum AnomalyDetector {
    Disabled,
    #[cfg(feature = "anomaly")]
    Enabled(SizeModel),
}

impl AnomalyDetector {
    pub fn probe(settings: &AnomalySettings) -> Self {
        if !settings.enabled {
            info!("anomaly detection disabled by configuration");
            return Self::Disabled;
        }
        Self::capability(settings)
    }

    #[cfg(feature = "anomaly")]
    fn capability(settings: &AnomalySettings) -> Self {
        info!(
            min_samples = settings.min_samples,
            max_history = ?settings.max_history,
            "anomaly detection enabled"
        );
        Self::Enabled(SizeModel::new(settings.clone()))
    }

    #[cfg(not(feature = "anomaly"))]
    fn capability(_settings: &AnomalySettings) -> Self {
        warn!("anomaly detection requested but not compiled in");
        Self::Disabled
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Record the sizes in `current` and score them. Emits at most one event.
    pub fn observe(&mut self, current: &Snapshot) -> Vec<Event> {
        match self {
            Self::Disabled => vec![],
            #[cfg(feature = "anomaly")]
            Self::Enabled(model) => match model.observe(current) {
                Ok(Some(count)) => {
                    warn!(anomaly_count = count, "file size anomaly");
                    vec![Event::warning(
                        "ml_anomaly",
                        format!("ML model flagged {} anomalous file size patterns.", count),
                    )
                    .with_details(serde_json::json!({ "anomaly_count": count }))]
                }
                Ok(None) => vec![],
                Err(e) => {
                    warn!(error = %e, "anomaly analysis failed");
                    vec![Event::warning("ml_error", format!("ML analysis error: {}", e))
                        .with_details(serde_json::json!({ "error": e.to_string() }))]
                }
            },
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Disabled => {}
            #[cfg(feature = "anomaly")]
            Self::Enabled(model) => model.reset(),
        }
    }
}

#[cfg(feature = "anomaly")]
mod model {
    use crate::analysis::isolation_forest::{ForestParams, IsolationForest};
    use shield_core::error::Result;
    use shield_core::settings::AnomalySettings;
    use shield_core::snapshot::Snapshot;
    use std::collections::VecDeque;
    use tracing::debug;

    pub struct SizeModel {
        settings: AnomalySettings,
        history: VecDeque<f64>,
    }

    impl SizeModel {
        pub fn new(settings: AnomalySettings) -> Self {
            Self {
                settings,
                history: VecDeque::new(),
            }
        }

        pub fn history_len(&self) -> usize {
            self.history.len()
        }

        pub fn reset(&mut self) {
            self.history.clear();
        }

        /// Extend the history with this cycle's sizes, then fit and score
        /// once the history is large enough. Returns the outlier count when
        /// any were found.
        pub fn observe(&mut self, current: &Snapshot) -> Result<Option<usize>> {
            let sizes: Vec<f64> = current.sizes().map(|s| s as f64).collect();
            self.history.extend(sizes.iter().copied());
            if let Some(max) = self.settings.max_history {
                while self.history.len() > max {
                    self.history.pop_front();
                }
            }

            if self.history.len() < self.settings.min_samples || sizes.is_empty() {
                debug!(
                    history = self.history.len(),
                    min_samples = self.settings.min_samples,
                    "not enough samples to score"
                );
                return Ok(None);
            }

            let data: Vec<f64> = self.history.iter().copied().collect();
            let forest = IsolationForest::fit(
                &data,
                ForestParams {
                    trees: self.settings.trees,
                    sample_size: self.settings.sample_size,
                    contamination: self.settings.contamination,
                    seed: self.settings.seed,
                },
            )?;
            let count = sizes.iter().filter(|&&s| forest.is_outlier(s)).count();
            debug!(
                history = data.len(),
                scored = sizes.len(),
                outliers = count,
                "size model scored"
            );
            Ok((count > 0).then_some(count))
        }
    }
}
