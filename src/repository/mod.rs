//! Transactional data access. `Repository` is implemented once against
//! PostgreSQL (`postgres.rs`, production) and once as an in-memory mutex-
//! guarded store (`memory.rs`, tests and the simulator); both satisfy the
//! same trait and are exercised by the same test suite.

mod memory;
mod postgres;

pub use memory::{demo_equipment, InMemoryRepository};
pub use postgres::PostgresRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Agent, AgentKind, DispatchRecord, Equipment, EquipmentStatus, GenerationLogEntry, Incident,
    Lot, LotStatus, SensorReading, Severity,
};
use crate::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct LotFilter {
    pub status: Option<LotStatus>,
    pub priority: Option<i16>,
    pub hot_lot_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EquipmentFilter {
    pub status: Option<EquipmentStatus>,
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub severity: Option<Severity>,
    pub equipment_id: Option<Uuid>,
    pub resolved: Option<bool>,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct SensorFilter {
    pub since: Option<DateTime<Utc>>,
    pub anomalies_only: bool,
    pub limit: i64,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationLogFilter {
    pub reason: Option<String>,
    pub limit: i64,
}

/// Fields needed to create a lot; id/status/timestamps are assigned by the
/// repository.
#[derive(Debug, Clone)]
pub struct NewLot {
    pub name: String,
    pub wafer_count: i32,
    pub priority: i16,
    pub hot_lot: bool,
    pub recipe_kind: String,
    pub customer_tag: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_duration_minutes: i32,
}

#[derive(Debug, Clone)]
pub struct NewIncident {
    pub equipment_id: Uuid,
    pub severity: Severity,
    pub kind: String,
    pub message: String,
    pub detected_value: f64,
    pub threshold_value: f64,
    pub action: String,
    pub z_score: Option<f64>,
    pub roc: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewSensorReading {
    pub equipment_id: Uuid,
    pub temperature: f64,
    pub vibration: f64,
    pub pressure: f64,
    pub power: f64,
    pub is_anomaly: bool,
    pub anomaly_score: Option<f64>,
}

/// Result of one scheduler assignment, used by `apply_dispatch_batch` to
/// atomically move a lot to QUEUED and append a dispatch record.
#[derive(Debug, Clone)]
pub struct DispatchAssignment {
    pub lot_id: Uuid,
    pub equipment_id: Uuid,
    pub reason: String,
    pub score: f64,
}

#[async_trait]
pub trait Repository: Send + Sync {
    // --- Equipment ---
    async fn get_equipment(&self, id: Uuid) -> Result<Equipment, AppError>;
    async fn list_equipment(&self, filter: &EquipmentFilter) -> Result<Vec<Equipment>, AppError>;
    async fn update_equipment_status(
        &self,
        id: Uuid,
        status: EquipmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Equipment, AppError>;
    async fn queue_depth(&self, equipment_id: Uuid) -> Result<i64, AppError>;

    // --- Lots ---
    async fn create_lot(
        &self,
        new_lot: NewLot,
        now: DateTime<Utc>,
    ) -> Result<Lot, AppError>;

    /// Smallest sequence number not already used by a lot named `prefix-*`
    /// created at or after `since` (i.e. today); 1001 if there is no such
    /// lot yet.
    async fn next_lot_sequence(
        &self,
        prefix: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError>;

    async fn get_lot(&self, id: Uuid) -> Result<Lot, AppError>;
    async fn list_lots(&self, filter: &LotFilter) -> Result<Vec<Lot>, AppError>;
    async fn count_active_lots(&self) -> Result<i64, AppError>;
    async fn cancel_lot(&self, id: Uuid, now: DateTime<Utc>) -> Result<Lot, AppError>;

    /// Edit a PENDING lot in place; `None` fields leave the current value
    /// unchanged. Callers are responsible for rejecting edits to lots past
    /// PENDING before calling this.
    async fn patch_lot(
        &self,
        id: Uuid,
        priority: Option<i16>,
        deadline: Option<DateTime<Utc>>,
        customer_tag: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Lot, AppError>;

    /// Atomically apply every assignment in a scheduler batch: each lot
    /// flips PENDING -> QUEUED with `assigned_equipment_id` set, and a
    /// `DispatchRecord` is appended. All-or-nothing.
    async fn apply_dispatch_batch(
        &self,
        assignments: &[DispatchAssignment],
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Atomically start a QUEUED lot whose assigned equipment is IDLE.
    /// Returns `Ok(None)` (a no-op, not an error) if the lot is not in a
    /// startable state — callers treat this as "try again next tick".
    async fn start_lot(&self, lot_id: Uuid, now: DateTime<Utc>) -> Result<Option<Lot>, AppError>;

    /// Atomically complete a RUNNING lot and free its equipment.
    async fn complete_lot(
        &self,
        lot_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Lot>, AppError>;

    async fn fail_lot(&self, lot_id: Uuid, now: DateTime<Utc>) -> Result<Lot, AppError>;

    // --- Dispatch records ---
    async fn list_dispatch_records(&self, limit: i64) -> Result<Vec<DispatchRecord>, AppError>;

    // --- Sensor readings ---
    async fn create_sensor_reading(
        &self,
        reading: NewSensorReading,
        now: DateTime<Utc>,
    ) -> Result<SensorReading, AppError>;
    async fn list_sensor_readings(
        &self,
        equipment_id: Uuid,
        filter: &SensorFilter,
    ) -> Result<Vec<SensorReading>, AppError>;

    // --- Incidents ---
    async fn create_incident(
        &self,
        incident: NewIncident,
        now: DateTime<Utc>,
    ) -> Result<Incident, AppError>;
    async fn get_incident(&self, id: Uuid) -> Result<Incident, AppError>;
    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, AppError>;
    async fn approve_incident(&self, id: Uuid, approve: bool) -> Result<Incident, AppError>;
    async fn resolve_incident(
        &self,
        id: Uuid,
        operator_notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Incident, AppError>;

    // --- Agents ---
    async fn register_agent(
        &self,
        kind: AgentKind,
        equipment_id: Uuid,
        capabilities: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Agent, AppError>;
    async fn list_agents(&self) -> Result<Vec<Agent>, AppError>;
    async fn heartbeat_agent(&self, id: Uuid, now: DateTime<Utc>) -> Result<Agent, AppError>;

    // --- Generation log ---
    async fn log_generation(
        &self,
        entry: GenerationLogEntry,
    ) -> Result<GenerationLogEntry, AppError>;
    async fn list_generation_log(
        &self,
        filter: &GenerationLogFilter,
    ) -> Result<Vec<GenerationLogEntry>, AppError>;

    async fn ping(&self) -> bool;
}

pub type SharedRepository = std::sync::Arc<dyn Repository>;
