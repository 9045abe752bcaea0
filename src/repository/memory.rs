//! In-memory `Repository` used by the test suite and the standalone
//! simulator binary. Single `Mutex`-guarded map set — simplicity over
//! throughput, since production traffic always goes through
//! `PostgresRepository`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Agent, AgentKind, AgentStatus, ActionStatus, DispatchRecord, Equipment, EquipmentKind,
    EquipmentStatus, GenerationLogEntry, Incident, Lot, LotStatus, SensorReading,
};
use crate::error::AppError;

use super::{
    DispatchAssignment, EquipmentFilter, GenerationLogFilter, IncidentFilter, LotFilter, NewIncident,
    NewLot, NewSensorReading, Repository, SensorFilter,
};

#[derive(Default)]
struct State {
    equipment: HashMap<Uuid, Equipment>,
    lots: HashMap<Uuid, Lot>,
    dispatch_records: Vec<DispatchRecord>,
    sensor_readings: Vec<SensorReading>,
    incidents: HashMap<Uuid, Incident>,
    agents: HashMap<Uuid, Agent>,
    generation_log: Vec<GenerationLogEntry>,
}

pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Seed a piece of equipment directly; used by tests and the simulator
    /// bootstrap, since equipment is not created through the HTTP facade.
    pub fn seed_equipment(&self, equipment: Equipment) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.equipment.insert(equipment.id, equipment);
    }

    pub fn equipment_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).equipment.len()
    }
}

fn lock_poisoned() -> AppError {
    AppError::internal("in-memory repository mutex poisoned")
}

/// Incident z-scores and rate-of-change persist at two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_equipment(&self, id: Uuid) -> Result<Equipment, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        state
            .equipment
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("equipment", id))
    }

    async fn list_equipment(&self, filter: &EquipmentFilter) -> Result<Vec<Equipment>, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        let mut out: Vec<Equipment> = state
            .equipment
            .values()
            .filter(|e| filter.status.map_or(true, |s| s == e.status))
            .filter(|e| filter.zone.as_deref().map_or(true, |z| z == e.zone))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn update_equipment_status(
        &self,
        id: Uuid,
        status: EquipmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Equipment, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let eq = state
            .equipment
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("equipment", id))?;
        eq.status = status;
        eq.updated_at = now;
        Ok(eq.clone())
    }

    async fn queue_depth(&self, equipment_id: Uuid) -> Result<i64, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        let depth = state
            .lots
            .values()
            .filter(|l| {
                l.assigned_equipment_id == Some(equipment_id)
                    && matches!(l.status, LotStatus::Queued | LotStatus::Running)
            })
            .count();
        Ok(depth as i64)
    }

    async fn create_lot(&self, new_lot: NewLot, now: DateTime<Utc>) -> Result<Lot, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let lot = Lot {
            id: Uuid::new_v4(),
            name: new_lot.name,
            wafer_count: new_lot.wafer_count,
            priority: new_lot.priority,
            hot_lot: new_lot.hot_lot,
            recipe_kind: new_lot.recipe_kind,
            status: LotStatus::Pending,
            assigned_equipment_id: None,
            customer_tag: new_lot.customer_tag,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            deadline: new_lot.deadline,
            estimated_duration_minutes: new_lot.estimated_duration_minutes,
        };
        state.lots.insert(lot.id, lot.clone());
        Ok(lot)
    }

    async fn next_lot_sequence(&self, prefix: &str, since: DateTime<Utc>) -> Result<i64, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        let max_seq = state
            .lots
            .values()
            .filter(|l| l.created_at >= since && l.name.starts_with(prefix))
            .filter_map(|l| l.name.rsplit('-').next().and_then(|s| s.parse::<i64>().ok()))
            .max();
        Ok(max_seq.unwrap_or(1000) + 1)
    }

    async fn get_lot(&self, id: Uuid) -> Result<Lot, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        state
            .lots
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("lot", id))
    }

    async fn list_lots(&self, filter: &LotFilter) -> Result<Vec<Lot>, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        let mut out: Vec<Lot> = state
            .lots
            .values()
            .filter(|l| filter.status.map_or(true, |s| s == l.status))
            .filter(|l| filter.priority.map_or(true, |p| p == l.priority))
            .filter(|l| !filter.hot_lot_only || l.hot_lot)
            .cloned()
            .collect();
        out.sort_by_key(|l| l.created_at);
        Ok(out)
    }

    async fn count_active_lots(&self) -> Result<i64, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        let count = state
            .lots
            .values()
            .filter(|l| {
                matches!(
                    l.status,
                    LotStatus::Pending | LotStatus::Queued | LotStatus::Running
                )
            })
            .count();
        Ok(count as i64)
    }

    async fn cancel_lot(&self, id: Uuid, now: DateTime<Utc>) -> Result<Lot, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let lot = state
            .lots
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("lot", id))?;
        if !lot.status.can_transition_to(LotStatus::Cancelled) {
            return Err(AppError::conflict("lot", id, lot.status, LotStatus::Cancelled));
        }
        lot.status = LotStatus::Cancelled;
        lot.completed_at = Some(now);
        lot.updated_at = now;
        Ok(lot.clone())
    }

    async fn patch_lot(
        &self,
        id: Uuid,
        priority: Option<i16>,
        deadline: Option<DateTime<Utc>>,
        customer_tag: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Lot, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let lot = state
            .lots
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("lot", id))?;
        if let Some(priority) = priority {
            lot.priority = priority;
        }
        if deadline.is_some() {
            lot.deadline = deadline;
        }
        if customer_tag.is_some() {
            lot.customer_tag = customer_tag;
        }
        lot.updated_at = now;
        Ok(lot.clone())
    }

    async fn apply_dispatch_batch(
        &self,
        assignments: &[DispatchAssignment],
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        // Validate every assignment before mutating anything, so the batch
        // is all-or-nothing.
        for a in assignments {
            let lot = state
                .lots
                .get(&a.lot_id)
                .ok_or_else(|| AppError::not_found("lot", a.lot_id))?;
            if lot.status != LotStatus::Pending {
                return Err(AppError::conflict(
                    "lot",
                    a.lot_id,
                    lot.status,
                    LotStatus::Queued,
                ));
            }
            if !state.equipment.contains_key(&a.equipment_id) {
                return Err(AppError::not_found("equipment", a.equipment_id));
            }
        }
        for a in assignments {
            if let Some(lot) = state.lots.get_mut(&a.lot_id) {
                lot.status = LotStatus::Queued;
                lot.assigned_equipment_id = Some(a.equipment_id);
                lot.updated_at = now;
            }
            state.dispatch_records.push(DispatchRecord {
                id: Uuid::new_v4(),
                lot_id: a.lot_id,
                equipment_id: a.equipment_id,
                reason: a.reason.clone(),
                score: a.score,
                dispatched_at: now,
            });
        }
        Ok(())
    }

    async fn start_lot(&self, lot_id: Uuid, now: DateTime<Utc>) -> Result<Option<Lot>, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let Some(lot) = state.lots.get(&lot_id).cloned() else {
            return Ok(None);
        };
        if lot.status != LotStatus::Queued {
            return Ok(None);
        }
        let Some(equipment_id) = lot.assigned_equipment_id else {
            return Ok(None);
        };
        let Some(equipment) = state.equipment.get(&equipment_id).cloned() else {
            return Ok(None);
        };
        if equipment.status != EquipmentStatus::Idle {
            return Ok(None);
        }

        let lot_mut = state.lots.get_mut(&lot_id).ok_or_else(|| AppError::not_found("lot", lot_id))?;
        lot_mut.status = LotStatus::Running;
        lot_mut.started_at = Some(now);
        lot_mut.updated_at = now;
        let updated_lot = lot_mut.clone();

        let eq_mut = state
            .equipment
            .get_mut(&equipment_id)
            .ok_or_else(|| AppError::not_found("equipment", equipment_id))?;
        eq_mut.status = EquipmentStatus::Running;
        eq_mut.current_lot_id = Some(lot_id);
        eq_mut.updated_at = now;

        Ok(Some(updated_lot))
    }

    async fn complete_lot(
        &self,
        lot_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Lot>, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let Some(lot) = state.lots.get(&lot_id).cloned() else {
            return Ok(None);
        };
        if lot.status != LotStatus::Running {
            return Ok(None);
        }
        let equipment_id = lot.assigned_equipment_id;

        let lot_mut = state.lots.get_mut(&lot_id).ok_or_else(|| AppError::not_found("lot", lot_id))?;
        lot_mut.status = LotStatus::Completed;
        lot_mut.completed_at = Some(now);
        lot_mut.updated_at = now;
        let updated_lot = lot_mut.clone();
        let wafer_count = updated_lot.wafer_count;

        if let Some(equipment_id) = equipment_id {
            if let Some(eq_mut) = state.equipment.get_mut(&equipment_id) {
                eq_mut.status = EquipmentStatus::Idle;
                eq_mut.current_lot_id = None;
                eq_mut.total_wafers_processed += i64::from(wafer_count);
                eq_mut.updated_at = now;
            }
        }

        Ok(Some(updated_lot))
    }

    async fn fail_lot(&self, lot_id: Uuid, now: DateTime<Utc>) -> Result<Lot, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let lot = state
            .lots
            .get_mut(&lot_id)
            .ok_or_else(|| AppError::not_found("lot", lot_id))?;
        if !lot.status.can_transition_to(LotStatus::Failed) {
            return Err(AppError::conflict("lot", lot_id, lot.status, LotStatus::Failed));
        }
        lot.status = LotStatus::Failed;
        lot.completed_at = Some(now);
        lot.updated_at = now;
        let updated = lot.clone();
        if let Some(equipment_id) = updated.assigned_equipment_id {
            if let Some(eq_mut) = state.equipment.get_mut(&equipment_id) {
                eq_mut.status = EquipmentStatus::Idle;
                eq_mut.current_lot_id = None;
                eq_mut.updated_at = now;
            }
        }
        Ok(updated)
    }

    async fn list_dispatch_records(&self, limit: i64) -> Result<Vec<DispatchRecord>, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        let mut out = state.dispatch_records.clone();
        out.sort_by(|a, b| b.dispatched_at.cmp(&a.dispatched_at));
        if limit > 0 {
            out.truncate(limit as usize);
        }
        Ok(out)
    }

    async fn create_sensor_reading(
        &self,
        reading: NewSensorReading,
        now: DateTime<Utc>,
    ) -> Result<SensorReading, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let row = SensorReading {
            id: Uuid::new_v4(),
            equipment_id: reading.equipment_id,
            temperature: reading.temperature,
            vibration: reading.vibration,
            pressure: reading.pressure,
            power: reading.power,
            recorded_at: now,
            is_anomaly: reading.is_anomaly,
            anomaly_score: reading.anomaly_score,
        };
        state.sensor_readings.push(row.clone());
        Ok(row)
    }

    async fn list_sensor_readings(
        &self,
        equipment_id: Uuid,
        filter: &SensorFilter,
    ) -> Result<Vec<SensorReading>, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        let mut out: Vec<SensorReading> = state
            .sensor_readings
            .iter()
            .filter(|r| r.equipment_id == equipment_id)
            .filter(|r| filter.since.map_or(true, |since| r.recorded_at >= since))
            .filter(|r| !filter.anomalies_only || r.is_anomaly)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        if filter.limit > 0 {
            out.truncate(filter.limit as usize);
        }
        Ok(out)
    }

    async fn create_incident(
        &self,
        incident: NewIncident,
        now: DateTime<Utc>,
    ) -> Result<Incident, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let zone = crate::anomaly::safety::zone_for_severity(incident.severity);
        let action_status = crate::anomaly::safety::action_status_for_zone(zone);
        let row = Incident {
            id: Uuid::new_v4(),
            equipment_id: incident.equipment_id,
            severity: incident.severity,
            kind: incident.kind,
            message: incident.message,
            detected_value: incident.detected_value,
            threshold_value: incident.threshold_value,
            action: incident.action,
            action_status,
            zone,
            z_score: incident.z_score.map(round2),
            roc: incident.roc.map(round2),
            resolved: false,
            resolved_at: None,
            operator_notes: None,
            created_at: now,
        };
        state.incidents.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_incident(&self, id: Uuid) -> Result<Incident, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        state
            .incidents
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("incident", id))
    }

    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        let mut out: Vec<Incident> = state
            .incidents
            .values()
            .filter(|i| filter.severity.map_or(true, |s| s == i.severity))
            .filter(|i| filter.equipment_id.map_or(true, |e| e == i.equipment_id))
            .filter(|i| filter.resolved.map_or(true, |r| r == i.resolved))
            .filter(|i| filter.since.map_or(true, |since| i.created_at >= since))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn approve_incident(&self, id: Uuid, approve: bool) -> Result<Incident, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let incident = state
            .incidents
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("incident", id))?;
        if incident.action_status != ActionStatus::PendingApproval {
            return Err(AppError::conflict(
                "incident",
                id,
                incident.action_status,
                if approve { ActionStatus::Approved } else { ActionStatus::Rejected },
            ));
        }
        incident.action_status = if approve {
            ActionStatus::Approved
        } else {
            ActionStatus::Rejected
        };
        Ok(incident.clone())
    }

    async fn resolve_incident(
        &self,
        id: Uuid,
        operator_notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Incident, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let incident = state
            .incidents
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("incident", id))?;
        incident.resolved = true;
        incident.resolved_at = Some(now);
        if operator_notes.is_some() {
            incident.operator_notes = operator_notes;
        }
        Ok(incident.clone())
    }

    async fn register_agent(
        &self,
        kind: AgentKind,
        equipment_id: Uuid,
        capabilities: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Agent, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let agent = Agent {
            id: Uuid::new_v4(),
            kind,
            equipment_id,
            status: AgentStatus::Active,
            last_heartbeat: now,
            capabilities,
        };
        state.agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        Ok(state.agents.values().cloned().collect())
    }

    async fn heartbeat_agent(&self, id: Uuid, now: DateTime<Utc>) -> Result<Agent, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let agent = state
            .agents
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("agent", id))?;
        agent.last_heartbeat = now;
        agent.status = AgentStatus::Active;
        Ok(agent.clone())
    }

    async fn log_generation(
        &self,
        entry: GenerationLogEntry,
    ) -> Result<GenerationLogEntry, AppError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        state.generation_log.push(entry.clone());
        Ok(entry)
    }

    async fn list_generation_log(
        &self,
        filter: &GenerationLogFilter,
    ) -> Result<Vec<GenerationLogEntry>, AppError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        let mut out: Vec<GenerationLogEntry> = state
            .generation_log
            .iter()
            .filter(|e| filter.reason.as_deref().map_or(true, |r| r == e.reason))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if filter.limit > 0 {
            out.truncate(filter.limit as usize);
        }
        Ok(out)
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// Convenience used by tests and the simulator to seed a fab floor quickly.
pub fn demo_equipment(name: &str, kind: EquipmentKind, efficiency: f64, now: DateTime<Utc>) -> Equipment {
    Equipment {
        id: Uuid::new_v4(),
        name: name.to_string(),
        kind,
        status: EquipmentStatus::Idle,
        efficiency,
        zone: "fab-1".to_string(),
        current_lot_id: None,
        total_wafers_processed: 0,
        created_at: now,
        updated_at: now,
    }
}
