use crate::domain::{EquipmentKind, EquipmentStatus};

/// Per-equipment-kind sensor baseline, mirroring the original simulator's
/// per-machine-type profile table.
#[derive(Debug, Clone, Copy)]
pub struct SensorProfile {
    base_temp: f64,
    pub temp_variance: f64,
    base_vibration: f64,
    pub vibration_variance: f64,
}

impl SensorProfile {
    pub fn for_kind(kind: EquipmentKind) -> Self {
        let (base_temp, base_vibration) = match kind {
            EquipmentKind::Lithography => (65.0, 0.003),
            EquipmentKind::Etching => (70.0, 0.008),
            EquipmentKind::Deposition => (75.0, 0.006),
            EquipmentKind::Inspection => (55.0, 0.002),
            EquipmentKind::Cleaning => (50.0, 0.010),
        };
        Self {
            base_temp,
            temp_variance: 5.0,
            base_vibration,
            vibration_variance: 0.003,
        }
    }

    /// Mean temperature/vibration for the current status: RUNNING runs
    /// hotter and rougher, DOWN idles cool and still.
    pub fn baseline_for_status(&self, status: EquipmentStatus) -> (f64, f64) {
        match status {
            EquipmentStatus::Running => (self.base_temp + 10.0, self.base_vibration * 2.0),
            EquipmentStatus::Down => (self.base_temp - 15.0, self.base_vibration * 0.3),
            EquipmentStatus::Idle | EquipmentStatus::Maintenance => (self.base_temp, self.base_vibration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_runs_hotter_than_idle() {
        let profile = SensorProfile::for_kind(EquipmentKind::Etching);
        let (idle_temp, _) = profile.baseline_for_status(EquipmentStatus::Idle);
        let (running_temp, _) = profile.baseline_for_status(EquipmentStatus::Running);
        assert!(running_temp > idle_temp);
    }
}
