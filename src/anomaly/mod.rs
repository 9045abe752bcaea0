//! Anomaly detection and the safety circuit: streaming threshold
//! classification over equipment telemetry, and the pure severity-to-zone
//! mapping that governs autonomy of response.

pub mod detector;
pub mod safety;
pub mod thresholds;

pub use detector::{AnomalyDetector, Detection, Metric};
pub use thresholds::Thresholds;
