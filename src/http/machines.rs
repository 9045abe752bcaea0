use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Equipment, EquipmentKind, EquipmentStatus};
use crate::error::AppResult;
use crate::repository::{EquipmentFilter, SensorFilter};

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct EquipmentResponse {
    pub id: Uuid,
    pub name: String,
    pub kind: EquipmentKind,
    pub status: EquipmentStatus,
    pub efficiency: f64,
    pub zone: String,
    pub current_lot_id: Option<Uuid>,
    pub total_wafers_processed: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Equipment> for EquipmentResponse {
    fn from(e: Equipment) -> Self {
        Self {
            id: e.id,
            name: e.name,
            kind: e.kind,
            status: e.status,
            efficiency: e.efficiency,
            zone: e.zone,
            current_lot_id: e.current_lot_id,
            total_wafers_processed: e.total_wafers_processed,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ListMachinesQuery {
    pub status: Option<EquipmentStatus>,
    pub zone: Option<String>,
}

pub async fn list_machines(
    State(state): State<AppState>,
    Query(query): Query<ListMachinesQuery>,
) -> AppResult<Json<Vec<EquipmentResponse>>> {
    let equipment = state
        .repo
        .list_equipment(&EquipmentFilter {
            status: query.status,
            zone: query.zone,
        })
        .await?;
    Ok(Json(equipment.into_iter().map(EquipmentResponse::from).collect()))
}

pub async fn get_machine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EquipmentResponse>> {
    let equipment = state.repo.get_equipment(id).await?;
    Ok(Json(EquipmentResponse::from(equipment)))
}

#[derive(Debug, Deserialize)]
pub struct PatchMachineRequest {
    pub status: EquipmentStatus,
}

pub async fn patch_machine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PatchMachineRequest>,
) -> AppResult<Json<EquipmentResponse>> {
    let now = state.clock.now();
    let equipment = state.repo.update_equipment_status(id, request.status, now).await?;
    Ok(Json(EquipmentResponse::from(equipment)))
}

#[derive(Debug, Serialize)]
pub struct MachineStatsResponse {
    pub id: Uuid,
    pub name: String,
    pub status: EquipmentStatus,
    pub efficiency: f64,
    pub total_wafers_processed: i64,
    pub queue_depth: i64,
}

pub async fn get_machine_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MachineStatsResponse>> {
    let equipment = state.repo.get_equipment(id).await?;
    let queue_depth = state.repo.queue_depth(id).await?;
    Ok(Json(MachineStatsResponse {
        id: equipment.id,
        name: equipment.name,
        status: equipment.status,
        efficiency: equipment.efficiency,
        total_wafers_processed: equipment.total_wafers_processed,
        queue_depth,
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct SensorReadingsQuery {
    pub limit: Option<i64>,
    pub anomalies_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SensorReadingResponse {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub temperature: f64,
    pub vibration: f64,
    pub pressure: f64,
    pub power: f64,
    pub recorded_at: DateTime<Utc>,
    pub is_anomaly: bool,
    pub anomaly_score: Option<f64>,
}

impl From<crate::domain::SensorReading> for SensorReadingResponse {
    fn from(r: crate::domain::SensorReading) -> Self {
        Self {
            id: r.id,
            equipment_id: r.equipment_id,
            temperature: r.temperature,
            vibration: r.vibration,
            pressure: r.pressure,
            power: r.power,
            recorded_at: r.recorded_at,
            is_anomaly: r.is_anomaly,
            anomaly_score: r.anomaly_score,
        }
    }
}

pub async fn get_sensor_readings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<SensorReadingsQuery>,
) -> AppResult<Json<Vec<SensorReadingResponse>>> {
    let filter = SensorFilter {
        since: None,
        anomalies_only: query.anomalies_only.unwrap_or(false),
        limit: query.limit.unwrap_or(100),
    };
    let readings = state.repo.list_sensor_readings(id, &filter).await?;
    Ok(Json(readings.into_iter().map(SensorReadingResponse::from).collect()))
}
