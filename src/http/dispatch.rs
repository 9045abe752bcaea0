use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::repository::LotFilter;

use super::state::AppState;

const ALGORITHM_VERSION: &str = "weighted-v1";

#[derive(Debug, Deserialize, Default)]
pub struct RunDispatchRequest {
    pub max_dispatches: Option<usize>,
    pub priority_filter: Option<i16>,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub lot_id: uuid::Uuid,
    pub lot_name: String,
    pub equipment_id: uuid::Uuid,
    pub equipment_name: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RunDispatchResponse {
    pub decisions: Vec<DecisionResponse>,
    pub unassigned: Vec<uuid::Uuid>,
    pub total_dispatched: usize,
    pub algorithm_version: &'static str,
}

pub async fn run_dispatch(
    State(state): State<AppState>,
    Json(request): Json<RunDispatchRequest>,
) -> AppResult<Json<RunDispatchResponse>> {
    let cfg = (**state.scheduler_config.load()).clone();
    let result = state
        .scheduler
        .run(&cfg, request.max_dispatches, request.priority_filter)
        .await?;

    Ok(Json(RunDispatchResponse {
        decisions: result
            .decisions
            .into_iter()
            .map(|d| DecisionResponse {
                lot_id: d.lot_id,
                lot_name: d.lot_name,
                equipment_id: d.equipment_id,
                equipment_name: d.equipment_name,
                score: d.score,
                reason: d.reason,
            })
            .collect(),
        unassigned: result.unassigned,
        total_dispatched: result.total_dispatched,
        algorithm_version: ALGORITHM_VERSION,
    }))
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub pending_count: i64,
    pub queued_count: i64,
    pub running_count: i64,
    pub next_up: Vec<super::jobs::LotResponse>,
}

pub async fn get_queue(State(state): State<AppState>) -> AppResult<Json<QueueResponse>> {
    let pending = state
        .repo
        .list_lots(&LotFilter {
            status: Some(crate::domain::LotStatus::Pending),
            priority: None,
            hot_lot_only: false,
        })
        .await?;
    let queued = state
        .repo
        .list_lots(&LotFilter {
            status: Some(crate::domain::LotStatus::Queued),
            priority: None,
            hot_lot_only: false,
        })
        .await?;
    let running = state
        .repo
        .list_lots(&LotFilter {
            status: Some(crate::domain::LotStatus::Running),
            priority: None,
            hot_lot_only: false,
        })
        .await?;

    let mut sorted_pending = pending.clone();
    sorted_pending.sort_by(|a, b| {
        b.hot_lot
            .cmp(&a.hot_lot)
            .then(a.priority.cmp(&b.priority))
            .then(a.created_at.cmp(&b.created_at))
    });

    Ok(Json(QueueResponse {
        pending_count: pending.len() as i64,
        queued_count: queued.len() as i64,
        running_count: running.len() as i64,
        next_up: sorted_pending
            .into_iter()
            .take(5)
            .map(super::jobs::LotResponse::from)
            .collect(),
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DispatchRecordResponse {
    pub id: uuid::Uuid,
    pub lot_id: uuid::Uuid,
    pub equipment_id: uuid::Uuid,
    pub reason: String,
    pub score: f64,
    pub dispatched_at: chrono::DateTime<chrono::Utc>,
}

impl From<crate::domain::DispatchRecord> for DispatchRecordResponse {
    fn from(r: crate::domain::DispatchRecord) -> Self {
        Self {
            id: r.id,
            lot_id: r.lot_id,
            equipment_id: r.equipment_id,
            reason: r.reason,
            score: r.score,
            dispatched_at: r.dispatched_at,
        }
    }
}

pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<DispatchRecordResponse>>> {
    let limit = query.limit.unwrap_or(50);
    let records = state.repo.list_dispatch_records(limit).await?;
    Ok(Json(records.into_iter().map(DispatchRecordResponse::from).collect()))
}
