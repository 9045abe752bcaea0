use chrono::{DateTime, Utc};

use crate::config::SchedulerConfig;
use crate::domain::{Equipment, EquipmentStatus, Lot};

/// Weighted multi-objective score: priority + efficiency + deadline +
/// queue-depth components, each normalized to [0, 1] before weighting.
/// Weights are assumed already normalized to sum to 1 (see
/// `SchedulerConfig::normalized`).
pub fn score_candidate(
    lot: &Lot,
    eq: &Equipment,
    queue_depth: i64,
    cfg: &SchedulerConfig,
    now: DateTime<Utc>,
) -> f64 {
    let priority_component = if lot.hot_lot {
        1.0
    } else {
        1.0 - f64::from(lot.priority - 1) / 4.0
    };

    let mut efficiency_component = eq.efficiency;
    if eq.status == EquipmentStatus::Idle {
        efficiency_component += 0.1;
    }

    let depth_component = (1.0 - queue_depth as f64 / 10.0).clamp(0.0, 1.0);

    let deadline_component = match lot.deadline {
        None => 1.0,
        Some(deadline) => {
            let deadline_hours = (deadline - now).num_minutes() as f64 / 60.0;
            let duration_hours = f64::from(lot.estimated_duration_minutes) / 60.0;
            if deadline_hours >= duration_hours {
                1.0
            } else {
                (deadline_hours / duration_hours.max(1.0)).max(0.0)
            }
        }
    };

    cfg.priority_weight * priority_component
        + cfg.efficiency_weight * efficiency_component
        + cfg.deadline_weight * deadline_component
        + cfg.queue_depth_weight * depth_component
}
