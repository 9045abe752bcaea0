//! PostgreSQL-backed `Repository`. Connection pooling and migrations follow
//! the same `sqlx::PgPoolOptions` + `sqlx::migrate!` pattern the rest of the
//! ecosystem uses; every multi-row mutation runs inside a single
//! transaction via `pool.begin()`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    Agent, AgentKind, AgentStatus, ActionStatus, DispatchRecord, Equipment, EquipmentKind,
    EquipmentStatus, GenerationLogEntry, Incident, Lot, LotStatus, Severity, SensorReading,
};
use crate::error::AppError;

use super::{
    DispatchAssignment, EquipmentFilter, GenerationLogFilter, IncidentFilter, LotFilter, NewIncident,
    NewLot, NewSensorReading, Repository, SensorFilter,
};

pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        info!("connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        info!("running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Incident z-scores and rate-of-change persist at two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn equipment_kind_from_str(raw: &str) -> EquipmentKind {
    match raw {
        "etching" => EquipmentKind::Etching,
        "deposition" => EquipmentKind::Deposition,
        "inspection" => EquipmentKind::Inspection,
        "cleaning" => EquipmentKind::Cleaning,
        _ => EquipmentKind::Lithography,
    }
}

fn equipment_status_from_str(raw: &str) -> EquipmentStatus {
    match raw {
        "RUNNING" => EquipmentStatus::Running,
        "DOWN" => EquipmentStatus::Down,
        "MAINTENANCE" => EquipmentStatus::Maintenance,
        _ => EquipmentStatus::Idle,
    }
}

fn lot_status_from_str(raw: &str) -> LotStatus {
    match raw {
        "QUEUED" => LotStatus::Queued,
        "RUNNING" => LotStatus::Running,
        "COMPLETED" => LotStatus::Completed,
        "FAILED" => LotStatus::Failed,
        "CANCELLED" => LotStatus::Cancelled,
        _ => LotStatus::Pending,
    }
}

fn severity_from_str(raw: &str) -> Severity {
    match raw {
        "medium" => Severity::Medium,
        "high" => Severity::High,
        "critical" => Severity::Critical,
        _ => Severity::Low,
    }
}

fn zone_from_severity_row(raw: &str) -> crate::domain::Zone {
    match raw {
        "yellow" => crate::domain::Zone::Yellow,
        "red" => crate::domain::Zone::Red,
        _ => crate::domain::Zone::Green,
    }
}

fn action_status_from_str(raw: &str) -> ActionStatus {
    match raw {
        "pending_approval" => ActionStatus::PendingApproval,
        "alert_only" => ActionStatus::AlertOnly,
        "approved" => ActionStatus::Approved,
        "rejected" => ActionStatus::Rejected,
        _ => ActionStatus::AutoExecuted,
    }
}

fn agent_kind_from_str(raw: &str) -> AgentKind {
    match raw {
        "tactical" => AgentKind::Tactical,
        "orchestrator" => AgentKind::Orchestrator,
        _ => AgentKind::Sentinel,
    }
}

fn agent_status_from_str(raw: &str) -> AgentStatus {
    match raw {
        "inactive" => AgentStatus::Inactive,
        _ => AgentStatus::Active,
    }
}

fn row_to_equipment(row: &sqlx::postgres::PgRow) -> Equipment {
    Equipment {
        id: row.get("id"),
        name: row.get("name"),
        kind: equipment_kind_from_str(row.get("kind")),
        status: equipment_status_from_str(row.get("status")),
        efficiency: row.get("efficiency"),
        zone: row.get("zone"),
        current_lot_id: row.get("current_lot_id"),
        total_wafers_processed: row.get("total_wafers_processed"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_lot(row: &sqlx::postgres::PgRow) -> Lot {
    Lot {
        id: row.get("id"),
        name: row.get("name"),
        wafer_count: row.get("wafer_count"),
        priority: row.get("priority"),
        hot_lot: row.get("hot_lot"),
        recipe_kind: row.get("recipe_kind"),
        status: lot_status_from_str(row.get("status")),
        assigned_equipment_id: row.get("assigned_equipment_id"),
        customer_tag: row.get("customer_tag"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        deadline: row.get("deadline"),
        estimated_duration_minutes: row.get("estimated_duration_minutes"),
    }
}

fn row_to_incident(row: &sqlx::postgres::PgRow) -> Incident {
    Incident {
        id: row.get("id"),
        equipment_id: row.get("equipment_id"),
        severity: severity_from_str(row.get("severity")),
        kind: row.get("kind"),
        message: row.get("message"),
        detected_value: row.get("detected_value"),
        threshold_value: row.get("threshold_value"),
        action: row.get("action"),
        action_status: action_status_from_str(row.get("action_status")),
        zone: zone_from_severity_row(row.get("zone")),
        z_score: row.get("z_score"),
        roc: row.get("roc"),
        resolved: row.get("resolved"),
        resolved_at: row.get("resolved_at"),
        operator_notes: row.get("operator_notes"),
        created_at: row.get("created_at"),
    }
}

fn row_to_agent(row: &sqlx::postgres::PgRow) -> Agent {
    Agent {
        id: row.get("id"),
        kind: agent_kind_from_str(row.get("kind")),
        equipment_id: row.get("equipment_id"),
        status: agent_status_from_str(row.get("status")),
        last_heartbeat: row.get("last_heartbeat"),
        capabilities: row
            .get::<Vec<String>, _>("capabilities"),
    }
}

fn row_to_dispatch_record(row: &sqlx::postgres::PgRow) -> DispatchRecord {
    DispatchRecord {
        id: row.get("id"),
        lot_id: row.get("lot_id"),
        equipment_id: row.get("equipment_id"),
        reason: row.get("reason"),
        score: row.get("score"),
        dispatched_at: row.get("dispatched_at"),
    }
}

fn row_to_sensor_reading(row: &sqlx::postgres::PgRow) -> SensorReading {
    SensorReading {
        id: row.get("id"),
        equipment_id: row.get("equipment_id"),
        temperature: row.get("temperature"),
        vibration: row.get("vibration"),
        pressure: row.get("pressure"),
        power: row.get("power"),
        recorded_at: row.get("recorded_at"),
        is_anomaly: row.get("is_anomaly"),
        anomaly_score: row.get("anomaly_score"),
    }
}

fn row_to_generation_log(row: &sqlx::postgres::PgRow) -> GenerationLogEntry {
    GenerationLogEntry {
        id: row.get("id"),
        lot_id: row.get("lot_id"),
        reason: row.get("reason"),
        triggered_by: row.get("triggered_by"),
        config_snapshot: row.get("config_snapshot"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_equipment(&self, id: Uuid) -> Result<Equipment, AppError> {
        let row = sqlx::query("SELECT * FROM equipment WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("equipment", id))?;
        Ok(row_to_equipment(&row))
    }

    async fn list_equipment(&self, filter: &EquipmentFilter) -> Result<Vec<Equipment>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM equipment \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::text IS NULL OR zone = $2) \
             ORDER BY name",
        )
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.zone.clone())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_equipment).collect())
    }

    async fn update_equipment_status(
        &self,
        id: Uuid,
        status: EquipmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Equipment, AppError> {
        let row = sqlx::query(
            "UPDATE equipment SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.to_string())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("equipment", id))?;
        Ok(row_to_equipment(&row))
    }

    async fn queue_depth(&self, equipment_id: Uuid) -> Result<i64, AppError> {
        let depth: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lots WHERE assigned_equipment_id = $1 AND status IN ('QUEUED', 'RUNNING')",
        )
        .bind(equipment_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(depth)
    }

    async fn create_lot(&self, new_lot: NewLot, now: DateTime<Utc>) -> Result<Lot, AppError> {
        let row = sqlx::query(
            "INSERT INTO lots \
             (id, name, wafer_count, priority, hot_lot, recipe_kind, status, \
              assigned_equipment_id, customer_tag, created_at, updated_at, \
              started_at, completed_at, deadline, estimated_duration_minutes) \
             VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', NULL, $7, $8, $8, NULL, NULL, $9, $10) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new_lot.name)
        .bind(new_lot.wafer_count)
        .bind(new_lot.priority)
        .bind(new_lot.hot_lot)
        .bind(new_lot.recipe_kind)
        .bind(new_lot.customer_tag)
        .bind(now)
        .bind(new_lot.deadline)
        .bind(new_lot.estimated_duration_minutes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_lot(&row))
    }

    async fn next_lot_sequence(&self, prefix: &str, since: DateTime<Utc>) -> Result<i64, AppError> {
        let pattern = format!("{prefix}%");
        let rows = sqlx::query("SELECT name FROM lots WHERE name LIKE $1 AND created_at >= $2")
            .bind(pattern)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;
        let max_seq = rows
            .iter()
            .filter_map(|row| row.get::<String, _>("name").rsplit('-').next().and_then(|s| s.parse::<i64>().ok()))
            .max();
        Ok(max_seq.unwrap_or(1000) + 1)
    }

    async fn get_lot(&self, id: Uuid) -> Result<Lot, AppError> {
        let row = sqlx::query("SELECT * FROM lots WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("lot", id))?;
        Ok(row_to_lot(&row))
    }

    async fn list_lots(&self, filter: &LotFilter) -> Result<Vec<Lot>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM lots \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::smallint IS NULL OR priority = $2) \
               AND ($3 = false OR hot_lot = true) \
             ORDER BY created_at",
        )
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.priority)
        .bind(filter.hot_lot_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_lot).collect())
    }

    async fn count_active_lots(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lots WHERE status IN ('PENDING', 'QUEUED', 'RUNNING')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn cancel_lot(&self, id: Uuid, now: DateTime<Utc>) -> Result<Lot, AppError> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query("SELECT status FROM lots WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("lot", id))?;
        let status = lot_status_from_str(current.get("status"));
        if !status.can_transition_to(LotStatus::Cancelled) {
            return Err(AppError::conflict("lot", id, status, LotStatus::Cancelled));
        }
        let row = sqlx::query(
            "UPDATE lots SET status = 'CANCELLED', completed_at = $2, updated_at = $2 \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row_to_lot(&row))
    }

    async fn patch_lot(
        &self,
        id: Uuid,
        priority: Option<i16>,
        deadline: Option<DateTime<Utc>>,
        customer_tag: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Lot, AppError> {
        let row = sqlx::query(
            "UPDATE lots SET \
               priority = COALESCE($2, priority), \
               deadline = CASE WHEN $3 THEN $4 ELSE deadline END, \
               customer_tag = CASE WHEN $5 THEN $6 ELSE customer_tag END, \
               updated_at = $7 \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(priority)
        .bind(deadline.is_some())
        .bind(deadline)
        .bind(customer_tag.is_some())
        .bind(customer_tag)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("lot", id))?;
        Ok(row_to_lot(&row))
    }

    async fn apply_dispatch_batch(
        &self,
        assignments: &[DispatchAssignment],
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for a in assignments {
            let updated = sqlx::query(
                "UPDATE lots SET status = 'QUEUED', assigned_equipment_id = $2, updated_at = $3 \
                 WHERE id = $1 AND status = 'PENDING' RETURNING id",
            )
            .bind(a.lot_id)
            .bind(a.equipment_id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
            if updated.is_none() {
                return Err(AppError::conflict(
                    "lot",
                    a.lot_id,
                    "non-PENDING",
                    LotStatus::Queued,
                ));
            }
            sqlx::query(
                "INSERT INTO dispatch_records (id, lot_id, equipment_id, reason, score, dispatched_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::new_v4())
            .bind(a.lot_id)
            .bind(a.equipment_id)
            .bind(&a.reason)
            .bind(a.score)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn start_lot(&self, lot_id: Uuid, now: DateTime<Utc>) -> Result<Option<Lot>, AppError> {
        let mut tx = self.pool.begin().await?;
        let Some(lot_row) = sqlx::query("SELECT * FROM lots WHERE id = $1 FOR UPDATE")
            .bind(lot_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let lot = row_to_lot(&lot_row);
        if lot.status != LotStatus::Queued {
            return Ok(None);
        }
        let Some(equipment_id) = lot.assigned_equipment_id else {
            return Ok(None);
        };
        let Some(eq_row) = sqlx::query("SELECT * FROM equipment WHERE id = $1 FOR UPDATE")
            .bind(equipment_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        if row_to_equipment(&eq_row).status != EquipmentStatus::Idle {
            return Ok(None);
        }

        let updated_row = sqlx::query(
            "UPDATE lots SET status = 'RUNNING', started_at = $2, updated_at = $2 \
             WHERE id = $1 RETURNING *",
        )
        .bind(lot_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE equipment SET status = 'RUNNING', current_lot_id = $2, updated_at = $3 \
             WHERE id = $1",
        )
        .bind(equipment_id)
        .bind(lot_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(row_to_lot(&updated_row)))
    }

    async fn complete_lot(
        &self,
        lot_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Lot>, AppError> {
        let mut tx = self.pool.begin().await?;
        let Some(lot_row) = sqlx::query("SELECT * FROM lots WHERE id = $1 FOR UPDATE")
            .bind(lot_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let lot = row_to_lot(&lot_row);
        if lot.status != LotStatus::Running {
            return Ok(None);
        }

        let updated_row = sqlx::query(
            "UPDATE lots SET status = 'COMPLETED', completed_at = $2, updated_at = $2 \
             WHERE id = $1 RETURNING *",
        )
        .bind(lot_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(equipment_id) = lot.assigned_equipment_id {
            sqlx::query(
                "UPDATE equipment SET status = 'IDLE', current_lot_id = NULL, \
                 total_wafers_processed = total_wafers_processed + $2, updated_at = $3 \
                 WHERE id = $1",
            )
            .bind(equipment_id)
            .bind(i64::from(lot.wafer_count))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(Some(row_to_lot(&updated_row)))
    }

    async fn fail_lot(&self, lot_id: Uuid, now: DateTime<Utc>) -> Result<Lot, AppError> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query("SELECT * FROM lots WHERE id = $1 FOR UPDATE")
            .bind(lot_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("lot", lot_id))?;
        let lot = row_to_lot(&current);
        if !lot.status.can_transition_to(LotStatus::Failed) {
            return Err(AppError::conflict("lot", lot_id, lot.status, LotStatus::Failed));
        }
        let updated_row = sqlx::query(
            "UPDATE lots SET status = 'FAILED', completed_at = $2, updated_at = $2 \
             WHERE id = $1 RETURNING *",
        )
        .bind(lot_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        if let Some(equipment_id) = lot.assigned_equipment_id {
            sqlx::query(
                "UPDATE equipment SET status = 'IDLE', current_lot_id = NULL, updated_at = $2 WHERE id = $1",
            )
            .bind(equipment_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(row_to_lot(&updated_row))
    }

    async fn list_dispatch_records(&self, limit: i64) -> Result<Vec<DispatchRecord>, AppError> {
        let limit = if limit > 0 { limit } else { 50 };
        let rows = sqlx::query(
            "SELECT * FROM dispatch_records ORDER BY dispatched_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_dispatch_record).collect())
    }

    async fn create_sensor_reading(
        &self,
        reading: NewSensorReading,
        now: DateTime<Utc>,
    ) -> Result<SensorReading, AppError> {
        let row = sqlx::query(
            "INSERT INTO sensor_readings \
             (id, equipment_id, temperature, vibration, pressure, power, recorded_at, is_anomaly, anomaly_score) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(reading.equipment_id)
        .bind(reading.temperature)
        .bind(reading.vibration)
        .bind(reading.pressure)
        .bind(reading.power)
        .bind(now)
        .bind(reading.is_anomaly)
        .bind(reading.anomaly_score)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_sensor_reading(&row))
    }

    async fn list_sensor_readings(
        &self,
        equipment_id: Uuid,
        filter: &SensorFilter,
    ) -> Result<Vec<SensorReading>, AppError> {
        let limit = if filter.limit > 0 { filter.limit } else { 100 };
        let rows = sqlx::query(
            "SELECT * FROM sensor_readings \
             WHERE equipment_id = $1 \
               AND ($2::timestamptz IS NULL OR recorded_at >= $2) \
               AND ($3 = false OR is_anomaly = true) \
             ORDER BY recorded_at DESC LIMIT $4",
        )
        .bind(equipment_id)
        .bind(filter.since)
        .bind(filter.anomalies_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_sensor_reading).collect())
    }

    async fn create_incident(
        &self,
        incident: NewIncident,
        now: DateTime<Utc>,
    ) -> Result<Incident, AppError> {
        let zone = crate::anomaly::safety::zone_for_severity(incident.severity);
        let action_status = crate::anomaly::safety::action_status_for_zone(zone);
        let row = sqlx::query(
            "INSERT INTO incidents \
             (id, equipment_id, severity, kind, message, detected_value, threshold_value, \
              action, action_status, zone, z_score, roc, resolved, resolved_at, operator_notes, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, false, NULL, NULL, $13) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(incident.equipment_id)
        .bind(incident.severity.to_string())
        .bind(incident.kind)
        .bind(incident.message)
        .bind(incident.detected_value)
        .bind(incident.threshold_value)
        .bind(incident.action)
        .bind(action_status.to_string())
        .bind(zone.to_string())
        .bind(incident.z_score.map(round2))
        .bind(incident.roc.map(round2))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_incident(&row))
    }

    async fn get_incident(&self, id: Uuid) -> Result<Incident, AppError> {
        let row = sqlx::query("SELECT * FROM incidents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("incident", id))?;
        Ok(row_to_incident(&row))
    }

    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM incidents \
             WHERE ($1::text IS NULL OR severity = $1) \
               AND ($2::uuid IS NULL OR equipment_id = $2) \
               AND ($3::boolean IS NULL OR resolved = $3) \
               AND ($4::timestamptz IS NULL OR created_at >= $4) \
             ORDER BY created_at DESC",
        )
        .bind(filter.severity.map(|s| s.to_string()))
        .bind(filter.equipment_id)
        .bind(filter.resolved)
        .bind(filter.since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_incident).collect())
    }

    async fn approve_incident(&self, id: Uuid, approve: bool) -> Result<Incident, AppError> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query("SELECT action_status FROM incidents WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("incident", id))?;
        let status: String = current.get("action_status");
        if status != ActionStatus::PendingApproval.to_string() {
            return Err(AppError::conflict(
                "incident",
                id,
                status,
                if approve { "approved" } else { "rejected" },
            ));
        }
        let new_status = if approve {
            ActionStatus::Approved
        } else {
            ActionStatus::Rejected
        };
        let row = sqlx::query("UPDATE incidents SET action_status = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(new_status.to_string())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row_to_incident(&row))
    }

    async fn resolve_incident(
        &self,
        id: Uuid,
        operator_notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Incident, AppError> {
        let row = sqlx::query(
            "UPDATE incidents SET resolved = true, resolved_at = $2, \
             operator_notes = COALESCE($3, operator_notes) WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(now)
        .bind(operator_notes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("incident", id))?;
        Ok(row_to_incident(&row))
    }

    async fn register_agent(
        &self,
        kind: AgentKind,
        equipment_id: Uuid,
        capabilities: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Agent, AppError> {
        let row = sqlx::query(
            "INSERT INTO agents (id, kind, equipment_id, status, last_heartbeat, capabilities) \
             VALUES ($1, $2, $3, 'active', $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(kind.to_string())
        .bind(equipment_id)
        .bind(now)
        .bind(&capabilities)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_agent(&row))
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, AppError> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY last_heartbeat DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_agent).collect())
    }

    async fn heartbeat_agent(&self, id: Uuid, now: DateTime<Utc>) -> Result<Agent, AppError> {
        let row = sqlx::query(
            "UPDATE agents SET last_heartbeat = $2, status = 'active' WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("agent", id))?;
        Ok(row_to_agent(&row))
    }

    async fn log_generation(
        &self,
        entry: GenerationLogEntry,
    ) -> Result<GenerationLogEntry, AppError> {
        let row = sqlx::query(
            "INSERT INTO generation_log (id, lot_id, reason, triggered_by, config_snapshot, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(entry.id)
        .bind(entry.lot_id)
        .bind(&entry.reason)
        .bind(&entry.triggered_by)
        .bind(&entry.config_snapshot)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_generation_log(&row))
    }

    async fn list_generation_log(
        &self,
        filter: &GenerationLogFilter,
    ) -> Result<Vec<GenerationLogEntry>, AppError> {
        let limit = if filter.limit > 0 { filter.limit } else { 50 };
        let rows = sqlx::query(
            "SELECT * FROM generation_log \
             WHERE ($1::text IS NULL OR reason = $1) \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(filter.reason.clone())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_generation_log).collect())
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
