//! Constraint-satisfying, multi-objective dispatch scheduler.
//!
//! Responsibilities: given the current backlog of PENDING lots and
//! dispatchable equipment, compute a legal, scored set of assignments and
//! persist them atomically. Non-responsibilities: advancing a lot once it
//! is QUEUED (the Lifecycle Processor owns that), and deciding *whether*
//! to generate more backlog (the Lot Generator owns that).

mod scoring;

pub use scoring::score_candidate;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::SchedulerConfig;
use crate::domain::{Equipment, Lot};
use crate::error::AppError;
use crate::repository::{DispatchAssignment, EquipmentFilter, LotFilter, SharedRepository};

#[derive(Debug, Clone)]
pub struct DispatchDecision {
    pub lot_id: Uuid,
    pub lot_name: String,
    pub equipment_id: Uuid,
    pub equipment_name: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerRunResult {
    pub decisions: Vec<DispatchDecision>,
    pub unassigned: Vec<Uuid>,
    pub total_dispatched: usize,
}

pub struct Scheduler {
    repo: SharedRepository,
    clock: SharedClock,
}

impl Scheduler {
    pub fn new(repo: SharedRepository, clock: SharedClock) -> Self {
        Self { repo, clock }
    }

    /// Run one scheduling batch. `max_dispatches` overrides
    /// `cfg.max_assignments_per_run` when set; `priority_filter` restricts
    /// the candidate lot pool to a single priority level.
    pub async fn run(
        &self,
        cfg: &SchedulerConfig,
        max_dispatches: Option<usize>,
        priority_filter: Option<i16>,
    ) -> Result<SchedulerRunResult, AppError> {
        let started = Instant::now();
        let budget = Duration::from_secs(cfg.run_budget_secs.max(1));
        let max_assignments = max_dispatches.unwrap_or(cfg.max_assignments_per_run);

        let mut pending = self
            .repo
            .list_lots(&LotFilter {
                status: Some(crate::domain::LotStatus::Pending),
                priority: priority_filter,
                hot_lot_only: false,
            })
            .await?;
        sort_by_dispatch_priority(&mut pending);

        let equipment = self
            .repo
            .list_equipment(&EquipmentFilter::default())
            .await?;

        let mut queue_depths = std::collections::HashMap::new();
        for eq in &equipment {
            queue_depths.insert(eq.id, self.repo.queue_depth(eq.id).await?);
        }

        let mut consumed: std::collections::HashSet<Uuid> = std::collections::HashSet::new();
        let mut decisions = Vec::new();
        let mut unassigned = Vec::new();
        let now = self.clock.now();

        for lot in &pending {
            if decisions.len() >= max_assignments {
                unassigned.push(lot.id);
                continue;
            }
            if started.elapsed() >= budget {
                unassigned.push(lot.id);
                continue;
            }

            match best_candidate(lot, &equipment, &consumed, &queue_depths, cfg, now) {
                Some((eq, score, reason)) => {
                    consumed.insert(eq.id);
                    decisions.push(DispatchDecision {
                        lot_id: lot.id,
                        lot_name: lot.name.clone(),
                        equipment_id: eq.id,
                        equipment_name: eq.name.clone(),
                        score,
                        reason,
                    });
                }
                None => unassigned.push(lot.id),
            }
        }

        if !decisions.is_empty() {
            let assignments: Vec<DispatchAssignment> = decisions
                .iter()
                .map(|d| DispatchAssignment {
                    lot_id: d.lot_id,
                    equipment_id: d.equipment_id,
                    reason: d.reason.clone(),
                    score: d.score,
                })
                .collect();
            self.repo.apply_dispatch_batch(&assignments, now).await?;
        }

        let total_dispatched = decisions.len();
        Ok(SchedulerRunResult {
            decisions,
            unassigned,
            total_dispatched,
        })
    }
}

/// hot_lot first, then priority ascending, then FIFO by created_at.
fn sort_by_dispatch_priority(lots: &mut [Lot]) {
    lots.sort_by(|a, b| {
        b.hot_lot
            .cmp(&a.hot_lot)
            .then(a.priority.cmp(&b.priority))
            .then(a.created_at.cmp(&b.created_at))
    });
}

fn best_candidate<'a>(
    lot: &Lot,
    equipment: &'a [Equipment],
    consumed: &std::collections::HashSet<Uuid>,
    queue_depths: &std::collections::HashMap<Uuid, i64>,
    cfg: &SchedulerConfig,
    now: DateTime<Utc>,
) -> Option<(&'a Equipment, f64, String)> {
    let mut best: Option<(&Equipment, f64)> = None;

    for eq in equipment {
        if consumed.contains(&eq.id) {
            continue;
        }
        if !eq.status.is_dispatchable() {
            continue;
        }
        if cfg.enforce_recipe_match && !eq.kind.compatible_with_recipe(&lot.recipe_kind) {
            continue;
        }
        if cfg.enforce_deadlines {
            if let Some(deadline) = lot.deadline {
                let deadline_hours = (deadline - now).num_minutes() as f64 / 60.0;
                let duration_hours = f64::from(lot.estimated_duration_minutes) / 60.0;
                if deadline_hours < duration_hours {
                    continue;
                }
            }
        }

        let queue_depth = *queue_depths.get(&eq.id).unwrap_or(&0);
        let score = score_candidate(lot, eq, queue_depth, cfg, now);

        let is_better = match best {
            None => true,
            Some((current, current_score)) => {
                (score - current_score).abs() > f64::EPSILON && score > current_score
                    || (score - current_score).abs() <= f64::EPSILON
                        && tie_break_prefers(eq, current, queue_depth, *queue_depths.get(&current.id).unwrap_or(&0))
            }
        };
        if is_better {
            best = Some((eq, score));
        }
    }

    best.map(|(eq, score)| {
        let reason = describe_reason(lot, eq, score);
        (eq, score, reason)
    })
}

/// Tie-break order: higher efficiency, then IDLE before RUNNING, then
/// lower queue depth, then equipment id ascending (deterministic).
fn tie_break_prefers(
    candidate: &Equipment,
    current: &Equipment,
    candidate_depth: i64,
    current_depth: i64,
) -> bool {
    if (candidate.efficiency - current.efficiency).abs() > f64::EPSILON {
        return candidate.efficiency > current.efficiency;
    }
    let candidate_idle = candidate.status == crate::domain::EquipmentStatus::Idle;
    let current_idle = current.status == crate::domain::EquipmentStatus::Idle;
    if candidate_idle != current_idle {
        return candidate_idle;
    }
    if candidate_depth != current_depth {
        return candidate_depth < current_depth;
    }
    candidate.id < current.id
}

fn describe_reason(lot: &Lot, eq: &Equipment, score: f64) -> String {
    if lot.hot_lot {
        format!(
            "hot-lot bypass | equipment {} | efficiency {:.0}% | score {:.3}",
            eq.name,
            eq.efficiency * 100.0,
            score
        )
    } else {
        format!(
            "priority {} | equipment {} | efficiency {:.0}% | score {:.3}",
            lot.priority,
            eq.name,
            eq.efficiency * 100.0,
            score
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EquipmentKind, EquipmentStatus, LotStatus};

    fn make_equipment(name: &str, kind: EquipmentKind, efficiency: f64, status: EquipmentStatus) -> Equipment {
        let now = Utc::now();
        Equipment {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            status,
            efficiency,
            zone: "fab-1".to_string(),
            current_lot_id: None,
            total_wafers_processed: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn make_lot(priority: i16, hot_lot: bool, recipe_kind: &str, created_offset_secs: i64) -> Lot {
        let now = Utc::now();
        Lot {
            id: Uuid::new_v4(),
            name: format!("LOT-{priority}"),
            wafer_count: 25,
            priority,
            hot_lot,
            recipe_kind: recipe_kind.to_string(),
            status: LotStatus::Pending,
            assigned_equipment_id: None,
            customer_tag: None,
            created_at: now + chrono::Duration::seconds(created_offset_secs),
            updated_at: now,
            started_at: None,
            completed_at: None,
            deadline: None,
            estimated_duration_minutes: 60,
        }
    }

    #[test]
    fn hot_lot_bypasses_lower_priority_scenario_a() {
        let e1 = make_equipment("E1", EquipmentKind::Lithography, 0.92, EquipmentStatus::Idle);
        let e2 = make_equipment("E2", EquipmentKind::Etching, 0.95, EquipmentStatus::Idle);
        let mut lots = vec![
            make_lot(3, false, "lithography", 0),
            make_lot(5, true, "lithography", 1),
        ];
        sort_by_dispatch_priority(&mut lots);
        assert!(lots[0].hot_lot, "hot lot must be scheduled first");

        let cfg = SchedulerConfig::default();
        let equipment = vec![e1.clone(), e2.clone()];
        let mut consumed = std::collections::HashSet::new();
        let depths = std::collections::HashMap::new();
        let now = Utc::now();

        let (eq, _, _) = best_candidate(&lots[0], &equipment, &consumed, &depths, &cfg, now).unwrap();
        assert_eq!(eq.id, e1.id);
        consumed.insert(eq.id);

        assert!(best_candidate(&lots[1], &equipment, &consumed, &depths, &cfg, now).is_none());
    }

    #[test]
    fn never_double_assigns_equipment_property_4() {
        let e1 = make_equipment("E1", EquipmentKind::Lithography, 0.9, EquipmentStatus::Idle);
        let lots = vec![make_lot(1, false, "lithography", 0), make_lot(2, false, "lithography", 1)];
        let cfg = SchedulerConfig::default();
        let equipment = vec![e1.clone()];
        let depths = std::collections::HashMap::new();
        let now = Utc::now();

        let mut consumed = std::collections::HashSet::new();
        let (eq, _, _) = best_candidate(&lots[0], &equipment, &consumed, &depths, &cfg, now).unwrap();
        consumed.insert(eq.id);
        assert!(best_candidate(&lots[1], &equipment, &consumed, &depths, &cfg, now).is_none());
    }
}
