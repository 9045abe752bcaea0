//! Streaming per-(equipment, metric) anomaly classifier: bounded ring
//! buffer of recent samples, z-score against the running mean/stddev, and
//! rate-of-change against the previous sample.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::Severity;

use super::thresholds::Thresholds;

const MIN_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Temperature,
    Vibration,
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub severity: Severity,
    pub kind: String,
    pub action: String,
    pub detected_value: f64,
    pub threshold_value: f64,
    pub z_score: f64,
    pub roc_per_minute: f64,
}

struct MetricState {
    ring: VecDeque<f64>,
    capacity: usize,
    last_value: Option<f64>,
    last_time: Option<DateTime<Utc>>,
}

impl MetricState {
    fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity,
            last_value: None,
            last_time: None,
        }
    }

    fn push(&mut self, value: f64) {
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(value);
    }

    fn mean_std(&self) -> (f64, f64) {
        let n = self.ring.len() as f64;
        let mean = self.ring.iter().sum::<f64>() / n;
        let variance = self.ring.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt().max(1e-3);
        (mean, std)
    }
}

/// Thread-safe detector state for every (equipment, metric) pair seen so
/// far. Analysis is guarded by a mutex per §5: concurrent callers (the
/// telemetry loop and an HTTP `analyze` request) serialize on the same
/// state rather than racing on independent copies.
pub struct AnomalyDetector {
    thresholds: Thresholds,
    ring_size: usize,
    state: Mutex<HashMap<(Uuid, Metric), MetricState>>,
}

impl AnomalyDetector {
    pub fn new(thresholds: Thresholds, ring_size: usize) -> Self {
        Self {
            thresholds,
            ring_size,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Feed one temperature sample for `equipment_id`, returning a
    /// detection if the thresholds were crossed.
    pub fn analyze_temperature(
        &self,
        equipment_id: Uuid,
        value: f64,
        at: DateTime<Utc>,
    ) -> Option<Detection> {
        let (z, roc) = self.observe(equipment_id, Metric::Temperature, value, at)?;
        let t = &self.thresholds;

        if value > t.temp_emergency_c || z > 4.0 {
            return Some(Detection {
                severity: Severity::Critical,
                kind: "thermal_runaway".to_string(),
                action: "emergency_stop".to_string(),
                detected_value: value,
                threshold_value: t.temp_emergency_c,
                z_score: z,
                roc_per_minute: roc,
            });
        }
        if value > t.temp_critical_c || (z > 3.0 && roc > t.temp_roc_limit_per_min) {
            return Some(Detection {
                severity: Severity::High,
                kind: "thermal_runaway".to_string(),
                action: "reduce_thermal_load".to_string(),
                detected_value: value,
                threshold_value: t.temp_critical_c,
                z_score: z,
                roc_per_minute: roc,
            });
        }
        if value > t.temp_warning_c || z > 2.5 {
            return Some(Detection {
                severity: Severity::Medium,
                kind: "elevated_temperature".to_string(),
                action: "increase_coolant".to_string(),
                detected_value: value,
                threshold_value: t.temp_warning_c,
                z_score: z,
                roc_per_minute: roc,
            });
        }
        None
    }

    /// Feed one vibration sample for `equipment_id`.
    pub fn analyze_vibration(
        &self,
        equipment_id: Uuid,
        value: f64,
        at: DateTime<Utc>,
    ) -> Option<Detection> {
        let (z, roc) = self.observe(equipment_id, Metric::Vibration, value, at)?;
        let t = &self.thresholds;

        if value > t.vibration_emergency_mm_s {
            return Some(Detection {
                severity: Severity::Critical,
                kind: "bearing_failure".to_string(),
                action: "emergency_stop".to_string(),
                detected_value: value,
                threshold_value: t.vibration_emergency_mm_s,
                z_score: z,
                roc_per_minute: roc,
            });
        }
        if value > t.vibration_critical_mm_s || z > 3.5 {
            return Some(Detection {
                severity: Severity::High,
                kind: "bearing_wear".to_string(),
                action: "alert_maintenance".to_string(),
                detected_value: value,
                threshold_value: t.vibration_critical_mm_s,
                z_score: z,
                roc_per_minute: roc,
            });
        }
        if value > t.vibration_warning_mm_s || z > 2.5 {
            return Some(Detection {
                severity: Severity::Medium,
                kind: "increased_vibration".to_string(),
                action: "schedule_inspection".to_string(),
                detected_value: value,
                threshold_value: t.vibration_warning_mm_s,
                z_score: z,
                roc_per_minute: roc,
            });
        }
        None
    }

    /// Update ring/last-value state and return (z, roc_per_minute) once at
    /// least `MIN_SAMPLES` samples have accumulated; `None` otherwise.
    fn observe(
        &self,
        equipment_id: Uuid,
        metric: Metric,
        value: f64,
        at: DateTime<Utc>,
    ) -> Option<(f64, f64)> {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let entry = guard
            .entry((equipment_id, metric))
            .or_insert_with(|| MetricState::new(self.ring_size));

        entry.push(value);
        let have_enough = entry.ring.len() >= MIN_SAMPLES;

        let (mean, std) = entry.mean_std();
        let z = (value - mean) / std;

        let roc = match (entry.last_value, entry.last_time) {
            (Some(last_value), Some(last_time)) => {
                let dt_secs = (at - last_time).num_milliseconds() as f64 / 1000.0;
                if dt_secs > 0.0 {
                    (value - last_value) / dt_secs * 60.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        entry.last_value = Some(value);
        entry.last_time = Some(at);

        have_enough.then_some((z, roc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_detection_before_minimum_samples() {
        let detector = AnomalyDetector::new(Thresholds::default(), 60);
        let eq = Uuid::new_v4();
        let now = Utc::now();
        for i in 0..9 {
            let at = now + chrono::Duration::seconds(i);
            assert!(detector.analyze_temperature(eq, 70.0, at).is_none());
        }
    }

    #[test]
    fn thermal_runaway_cascade_scenario_d() {
        let detector = AnomalyDetector::new(Thresholds::default(), 60);
        let eq = Uuid::new_v4();
        let now = Utc::now();
        for i in 0..15 {
            let at = now + chrono::Duration::seconds(i);
            let value = 70.0 + (i as f64 % 2.0) * 0.5;
            let detection = detector.analyze_temperature(eq, value, at);
            assert!(detection.is_none(), "unexpected detection at sample {i}");
        }
        let at = now + chrono::Duration::seconds(15);
        let detection = detector
            .analyze_temperature(eq, 108.0, at)
            .expect("critical detection expected");
        assert_eq!(detection.severity, Severity::Critical);
        assert_eq!(detection.kind, "thermal_runaway");
        assert!(detection.z_score > 4.0);
    }

    #[test]
    fn vibration_high_severity_does_not_hardcode_zone() {
        // The detector only emits severity/kind; zone derivation lives in
        // the safety circuit (see safety::zone_for_severity).
        let detector = AnomalyDetector::new(Thresholds::default(), 60);
        let eq = Uuid::new_v4();
        let now = Utc::now();
        for i in 0..10 {
            let at = now + chrono::Duration::seconds(i);
            detector.analyze_vibration(eq, 0.005, at);
        }
        let at = now + chrono::Duration::seconds(11);
        let detection = detector.analyze_vibration(eq, 0.06, at).expect("detection");
        assert_eq!(detection.severity, Severity::High);
        assert_eq!(
            super::super::safety::zone_for_severity(detection.severity),
            crate::domain::Zone::Yellow
        );
    }
}
