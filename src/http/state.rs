use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::anomaly::AnomalyDetector;
use crate::clock::SharedClock;
use crate::config::{GeneratorConfig, SchedulerConfig};
use crate::generator::LotGenerator;
use crate::lifecycle::LifecycleProcessor;
use crate::repository::SharedRepository;
use crate::rng::SharedRng;
use crate::scheduler::Scheduler;
use crate::telemetry::TelemetrySimulator;

use super::background::BackgroundTask;

/// Everything an HTTP handler might touch, grouped the way the teacher's
/// `DashboardState` groups its engines: one field per long-lived service,
/// cloned cheaply since every field is already `Arc`-backed.
#[derive(Clone)]
pub struct AppState {
    pub repo: SharedRepository,
    pub clock: SharedClock,
    pub detector: Arc<AnomalyDetector>,
    pub scheduler: Arc<Scheduler>,
    pub generator: Arc<LotGenerator>,
    pub lifecycle: Arc<LifecycleProcessor>,
    pub telemetry: Arc<TelemetrySimulator>,
    pub scheduler_config: Arc<ArcSwap<SchedulerConfig>>,
    pub generator_config: Arc<ArcSwap<GeneratorConfig>>,
    pub lifecycle_task: Arc<BackgroundTask>,
    pub generator_task: Arc<BackgroundTask>,
    pub telemetry_task: Arc<BackgroundTask>,
    pub lifecycle_interval_secs: u64,
    pub telemetry_interval_secs: u64,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: SharedRepository,
        clock: SharedClock,
        rng: SharedRng,
        scheduler_config: SchedulerConfig,
        generator_config: GeneratorConfig,
        lifecycle_interval_secs: u64,
        telemetry_interval_secs: u64,
        anomaly_ring_size: usize,
    ) -> Self {
        let detector = Arc::new(AnomalyDetector::new(
            crate::anomaly::Thresholds::default(),
            anomaly_ring_size,
        ));
        let scheduler = Arc::new(Scheduler::new(repo.clone(), clock.clone()));
        let generator = Arc::new(LotGenerator::new(repo.clone(), clock.clone(), rng.clone()));
        let lifecycle = Arc::new(LifecycleProcessor::new(repo.clone(), clock.clone()));
        let telemetry = Arc::new(TelemetrySimulator::new(
            repo.clone(),
            clock.clone(),
            rng,
            detector.clone(),
        ));

        Self {
            repo,
            clock,
            detector,
            scheduler,
            generator,
            lifecycle,
            telemetry,
            scheduler_config: Arc::new(ArcSwap::from_pointee(scheduler_config)),
            generator_config: Arc::new(ArcSwap::from_pointee(generator_config)),
            lifecycle_task: Arc::new(BackgroundTask::new()),
            generator_task: Arc::new(BackgroundTask::new()),
            telemetry_task: Arc::new(BackgroundTask::new()),
            lifecycle_interval_secs,
            telemetry_interval_secs,
            started_at: Utc::now(),
        }
    }
}
