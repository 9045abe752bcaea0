use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::repository::LotFilter;

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub repository_reachable: bool,
    pub uptime_seconds: i64,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let repository_reachable = state.repo.ping().await;
    let uptime_seconds = (chrono::Utc::now() - state.started_at).num_seconds();
    let status = if repository_reachable { "ok" } else { "degraded" };
    let code = if repository_reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(HealthResponse {
            status,
            repository_reachable,
            uptime_seconds,
        }),
    )
}

/// Prometheus text exposition of queue depths, incident counts, and
/// dispatch throughput.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = String::new();

    let pending = count_lots(&state, Some(crate::domain::LotStatus::Pending)).await;
    let queued = count_lots(&state, Some(crate::domain::LotStatus::Queued)).await;
    let running = count_lots(&state, Some(crate::domain::LotStatus::Running)).await;

    body.push_str("# HELP fab_lots_pending Lots awaiting dispatch\n");
    body.push_str("# TYPE fab_lots_pending gauge\n");
    body.push_str(&format!("fab_lots_pending {pending}\n"));

    body.push_str("# HELP fab_lots_queued Lots dispatched but not yet started\n");
    body.push_str("# TYPE fab_lots_queued gauge\n");
    body.push_str(&format!("fab_lots_queued {queued}\n"));

    body.push_str("# HELP fab_lots_running Lots currently processing\n");
    body.push_str("# TYPE fab_lots_running gauge\n");
    body.push_str(&format!("fab_lots_running {running}\n"));

    if let Ok(incidents) = state
        .repo
        .list_incidents(&crate::repository::IncidentFilter {
            resolved: Some(false),
            ..Default::default()
        })
        .await
    {
        body.push_str("# HELP fab_incidents_open Unresolved incidents\n");
        body.push_str("# TYPE fab_incidents_open gauge\n");
        body.push_str(&format!("fab_incidents_open {}\n", incidents.len()));
    }

    if let Ok(records) = state.repo.list_dispatch_records(1000).await {
        body.push_str("# HELP fab_dispatch_records_recent Dispatch decisions in the retained window\n");
        body.push_str("# TYPE fab_dispatch_records_recent gauge\n");
        body.push_str(&format!("fab_dispatch_records_recent {}\n", records.len()));
    }

    (
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

async fn count_lots(state: &AppState, status: Option<crate::domain::LotStatus>) -> i64 {
    state
        .repo
        .list_lots(&LotFilter {
            status,
            priority: None,
            hot_lot_only: false,
        })
        .await
        .map(|lots| lots.len() as i64)
        .unwrap_or(0)
}
