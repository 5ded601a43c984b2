pub mod anomaly;
pub mod heuristics;
#[cfg(feature = "anomaly")]
pub mod isolation_forest;
