use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct SimulateResponse {
    pub readings_taken: usize,
    pub anomalies_detected: usize,
}

pub async fn simulate(State(state): State<AppState>) -> AppResult<Json<SimulateResponse>> {
    let (readings_taken, anomalies_detected) = state
        .telemetry
        .tick_all()
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(SimulateResponse {
        readings_taken,
        anomalies_detected,
    }))
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub changed: bool,
    pub running: bool,
}

pub async fn start(State(state): State<AppState>) -> Json<ToggleResponse> {
    let telemetry = state.telemetry.clone();
    let interval_secs = state.telemetry_interval_secs;
    let changed = state
        .telemetry_task
        .start(move |token| tokio::spawn(async move { telemetry.run(interval_secs, token).await }));
    Json(ToggleResponse {
        changed,
        running: state.telemetry_task.is_running(),
    })
}

pub async fn stop(State(state): State<AppState>) -> Json<ToggleResponse> {
    let changed = state.telemetry_task.stop();
    Json(ToggleResponse {
        changed,
        running: state.telemetry_task.is_running(),
    })
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        running: state.telemetry_task.is_running(),
    })
}

#[derive(Debug, Deserialize)]
pub struct GenerateAnomalyQuery {
    pub equipment_id: Uuid,
}

pub async fn generate_anomaly(
    State(state): State<AppState>,
    Query(query): Query<GenerateAnomalyQuery>,
) -> AppResult<Json<SimulateResponse>> {
    // Force an out-of-range reading by sampling several times; the
    // simulator's own spike chance plus detector thresholds will flag one
    // quickly, but we loop a bounded number of times to make the anomaly
    // reliable for a manual demo trigger.
    let mut anomalies = 0usize;
    let mut readings = 0usize;
    for _ in 0..20 {
        let is_anomaly = state
            .telemetry
            .tick_equipment(query.equipment_id)
            .await
            .map_err(|e| AppError::internal(e.to_string()))?;
        readings += 1;
        if is_anomaly {
            anomalies += 1;
            break;
        }
    }
    Ok(Json(SimulateResponse {
        readings_taken: readings,
        anomalies_detected: anomalies,
    }))
}
