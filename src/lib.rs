//! Foundry MES: wafer fab manufacturing execution control plane.
//!
//! Tracks lot lifecycle from release through dispatch, processing, and
//! completion; scores equipment assignment with a weighted dispatch rule;
//! watches simulated sensor telemetry for thermal and vibration anomalies
//! and raises incidents through a tiered safety circuit.

pub mod anomaly;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod generator;
pub mod http;
pub mod lifecycle;
pub mod repository;
pub mod rng;
pub mod scheduler;
pub mod telemetry;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
