//! Telemetry Simulator: generates plausible sensor readings per piece of
//! equipment, parameterized by kind and current status, and routes each
//! reading through the Anomaly Detector so threshold breaches become
//! incidents without a real sensor feed.

mod profile;

pub use profile::SensorProfile;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::anomaly::{safety, AnomalyDetector};
use crate::clock::SharedClock;
use crate::repository::{EquipmentFilter, NewIncident, NewSensorReading, SharedRepository};
use crate::rng::SharedRng;

/// Background chance that any single reading is spiked into an anomaly,
/// independent of threshold-driven detections from real drift.
const BASELINE_ANOMALY_CHANCE: f64 = 0.05;

/// Incidents persist z-scores and rate-of-change at two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct TelemetrySimulator {
    repo: SharedRepository,
    clock: SharedClock,
    rng: SharedRng,
    detector: Arc<AnomalyDetector>,
}

impl TelemetrySimulator {
    pub fn new(
        repo: SharedRepository,
        clock: SharedClock,
        rng: SharedRng,
        detector: Arc<AnomalyDetector>,
    ) -> Self {
        Self {
            repo,
            clock,
            rng,
            detector,
        }
    }

    /// Generate and persist one reading for `equipment_id`, running it
    /// through the detector and opening an incident on any detection.
    /// Returns whether the reading was flagged anomalous.
    pub async fn tick_equipment(&self, equipment_id: uuid::Uuid) -> anyhow::Result<bool> {
        let equipment = self.repo.get_equipment(equipment_id).await?;
        let profile = SensorProfile::for_kind(equipment.kind);
        let now = self.clock.now();

        let (base_temp, base_vibration) = profile.baseline_for_status(equipment.status);
        let mut temperature = self.rng.gen_gauss(base_temp, profile.temp_variance);
        let mut vibration = (self.rng.gen_gauss(base_vibration, profile.vibration_variance)).max(0.0);

        let spiked = self.rng.gen_bool(BASELINE_ANOMALY_CHANCE);
        if spiked {
            temperature += self.rng.gen_range_f64(10.0, 25.0);
            vibration += self.rng.gen_range_f64(0.02, 0.05);
        }

        let pressure = 10.0 + self.rng.gen_range_f64(0.0, 5.0);
        let power = 1000.0 + self.rng.gen_range_f64(0.0, 500.0);

        let temp_detection = self.detector.analyze_temperature(equipment_id, temperature, now);
        let vib_detection = self.detector.analyze_vibration(equipment_id, vibration, now);
        let is_anomaly = spiked || temp_detection.is_some() || vib_detection.is_some();
        let anomaly_score = if is_anomaly {
            Some(self.rng.gen_range_f64(0.7, 0.99))
        } else {
            None
        };

        self.repo
            .create_sensor_reading(
                NewSensorReading {
                    equipment_id,
                    temperature,
                    vibration,
                    pressure,
                    power,
                    is_anomaly,
                    anomaly_score,
                },
                now,
            )
            .await?;

        for detection in [temp_detection, vib_detection].into_iter().flatten() {
            let zone = safety::zone_for_severity(detection.severity);
            let incident = self
                .repo
                .create_incident(
                    NewIncident {
                        equipment_id,
                        severity: detection.severity,
                        kind: detection.kind.clone(),
                        message: format!(
                            "{} on {}: {:.3} exceeds threshold {:.3}",
                            detection.kind, equipment.name, detection.detected_value, detection.threshold_value
                        ),
                        detected_value: detection.detected_value,
                        threshold_value: detection.threshold_value,
                        action: detection.action.clone(),
                        z_score: Some(round2(detection.z_score)),
                        roc: Some(round2(detection.roc_per_minute)),
                    },
                    now,
                )
                .await?;
            warn!(
                equipment = %equipment.name,
                severity = %detection.severity,
                zone = %zone,
                incident_id = %incident.id,
                "anomaly detected"
            );
        }

        Ok(is_anomaly)
    }

    /// One sweep across every piece of equipment. Per-equipment failure is
    /// independent: one bad reading never aborts the sweep.
    pub async fn tick_all(&self) -> anyhow::Result<(usize, usize)> {
        let equipment = self.repo.list_equipment(&EquipmentFilter::default()).await?;
        let mut readings = 0usize;
        let mut anomalies = 0usize;
        for eq in equipment {
            match self.tick_equipment(eq.id).await {
                Ok(is_anomaly) => {
                    readings += 1;
                    if is_anomaly {
                        anomalies += 1;
                    }
                }
                Err(err) => warn!(equipment_id = %eq.id, %err, "failed to simulate reading"),
            }
        }
        Ok((readings, anomalies))
    }

    pub async fn run(self: Arc<Self>, interval_secs: u64, token: CancellationToken) {
        info!("telemetry simulator started");
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick_all().await {
                        Ok((readings, anomalies)) => {
                            if readings > 0 {
                                info!(readings, anomalies, "telemetry sweep complete");
                            }
                        }
                        Err(err) => warn!(%err, "telemetry sweep failed"),
                    }
                }
            }
        }
        info!("telemetry simulator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::Thresholds;
    use crate::clock::SimClock;
    use crate::domain::EquipmentKind;
    use crate::repository::{demo_equipment, InMemoryRepository};
    use chrono::Utc;

    #[tokio::test]
    async fn tick_equipment_persists_a_reading() {
        let repo: SharedRepository = Arc::new(InMemoryRepository::new());
        let clock: SharedClock = Arc::new(SimClock::new(Utc::now()));
        let rng = SharedRng::from_seed(3);
        let detector = Arc::new(AnomalyDetector::new(Thresholds::default(), 60));
        let eq = demo_equipment("Etch-1", EquipmentKind::Etching, 0.9, clock.now());
        let eq_id = eq.id;
        repo.seed_equipment(eq);

        let simulator = TelemetrySimulator::new(repo.clone(), clock, rng, detector);
        simulator.tick_equipment(eq_id).await.unwrap();

        let readings = repo
            .list_sensor_readings(eq_id, &Default::default())
            .await
            .unwrap();
        assert_eq!(readings.len(), 1);
    }
}
