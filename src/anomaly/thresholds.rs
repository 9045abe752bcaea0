/// Rule thresholds for the streaming anomaly detector, mirroring the
/// original engine's per-metric warning/critical/emergency ladder.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub temp_warning_c: f64,
    pub temp_critical_c: f64,
    pub temp_emergency_c: f64,
    pub temp_roc_limit_per_min: f64,

    pub vibration_warning_mm_s: f64,
    pub vibration_critical_mm_s: f64,
    pub vibration_emergency_mm_s: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temp_warning_c: 80.0,
            temp_critical_c: 95.0,
            temp_emergency_c: 105.0,
            temp_roc_limit_per_min: 5.0,
            vibration_warning_mm_s: 0.02,
            vibration_critical_mm_s: 0.05,
            vibration_emergency_mm_s: 0.08,
        }
    }
}
