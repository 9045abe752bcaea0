use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Lot, LotStatus};
use crate::error::{AppError, AppResult};
use crate::repository::{LotFilter, NewLot};

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct LotResponse {
    pub id: Uuid,
    pub name: String,
    pub wafer_count: i32,
    pub priority: i16,
    pub hot_lot: bool,
    pub recipe_kind: String,
    pub status: LotStatus,
    pub assigned_equipment_id: Option<Uuid>,
    pub customer_tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_duration_minutes: i32,
    pub elapsed_minutes: Option<i64>,
}

impl LotResponse {
    fn from_lot(lot: Lot, now: DateTime<Utc>) -> Self {
        let elapsed_minutes = lot.elapsed_minutes(now);
        Self {
            id: lot.id,
            name: lot.name,
            wafer_count: lot.wafer_count,
            priority: lot.priority,
            hot_lot: lot.hot_lot,
            recipe_kind: lot.recipe_kind,
            status: lot.status,
            assigned_equipment_id: lot.assigned_equipment_id,
            customer_tag: lot.customer_tag,
            created_at: lot.created_at,
            updated_at: lot.updated_at,
            started_at: lot.started_at,
            completed_at: lot.completed_at,
            deadline: lot.deadline,
            estimated_duration_minutes: lot.estimated_duration_minutes,
            elapsed_minutes,
        }
    }
}

impl From<Lot> for LotResponse {
    fn from(lot: Lot) -> Self {
        Self::from_lot(lot, Utc::now())
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ListJobsQuery {
    pub status: Option<LotStatus>,
    pub priority: Option<i16>,
    pub hot_lot_only: Option<bool>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> AppResult<Json<Vec<LotResponse>>> {
    let filter = LotFilter {
        status: query.status,
        priority: query.priority,
        hot_lot_only: query.hot_lot_only.unwrap_or(false),
    };
    let lots = state.repo.list_lots(&filter).await?;
    let now = state.clock.now();
    Ok(Json(lots.into_iter().map(|l| LotResponse::from_lot(l, now)).collect()))
}

pub async fn get_queue(State(state): State<AppState>) -> AppResult<Json<Vec<LotResponse>>> {
    let mut pending = state
        .repo
        .list_lots(&LotFilter {
            status: Some(LotStatus::Pending),
            priority: None,
            hot_lot_only: false,
        })
        .await?;
    pending.sort_by(|a, b| {
        b.hot_lot
            .cmp(&a.hot_lot)
            .then(a.priority.cmp(&b.priority))
            .then(a.created_at.cmp(&b.created_at))
    });
    let now = state.clock.now();
    Ok(Json(pending.into_iter().map(|l| LotResponse::from_lot(l, now)).collect()))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LotResponse>> {
    let lot = state.repo.get_lot(id).await?;
    let now = state.clock.now();
    Ok(Json(LotResponse::from_lot(lot, now)))
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub name: String,
    pub wafer_count: i32,
    pub priority: i16,
    #[serde(default)]
    pub hot_lot: bool,
    pub recipe_kind: String,
    pub customer_tag: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_duration_minutes: i32,
}

pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> AppResult<Json<LotResponse>> {
    if request.wafer_count <= 0 {
        return Err(AppError::Validation("wafer_count must be positive".to_string()));
    }
    if !(1..=5).contains(&request.priority) {
        return Err(AppError::Validation("priority must be between 1 and 5".to_string()));
    }
    let now = state.clock.now();
    let lot = state
        .repo
        .create_lot(
            NewLot {
                name: request.name,
                wafer_count: request.wafer_count,
                priority: request.priority,
                hot_lot: request.hot_lot,
                recipe_kind: request.recipe_kind,
                customer_tag: request.customer_tag,
                deadline: request.deadline,
                estimated_duration_minutes: request.estimated_duration_minutes,
            },
            now,
        )
        .await?;
    Ok(Json(LotResponse::from_lot(lot, now)))
}

#[derive(Debug, Deserialize, Default)]
pub struct PatchJobRequest {
    pub priority: Option<i16>,
    pub deadline: Option<DateTime<Utc>>,
    pub customer_tag: Option<String>,
}

pub async fn patch_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PatchJobRequest>,
) -> AppResult<Json<LotResponse>> {
    // Only PENDING lots accept in-place edits; anything further along must
    // go through the lifecycle transitions below.
    let lot = state.repo.get_lot(id).await?;
    if lot.status != LotStatus::Pending {
        return Err(AppError::conflict("lot", id, lot.status, "edited"));
    }
    if let Some(priority) = request.priority {
        if !(1..=5).contains(&priority) {
            return Err(AppError::Validation("priority must be between 1 and 5".to_string()));
        }
    }
    let now = state.clock.now();
    let updated = state
        .repo
        .patch_lot(id, request.priority, request.deadline, request.customer_tag, now)
        .await?;
    Ok(Json(LotResponse::from_lot(updated, now)))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LotResponse>> {
    let now = state.clock.now();
    let lot = state.repo.cancel_lot(id, now).await?;
    Ok(Json(LotResponse::from_lot(lot, now)))
}

pub async fn start_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LotResponse>> {
    let now = state.clock.now();
    match state.repo.start_lot(id, now).await? {
        Some(lot) => Ok(Json(LotResponse::from_lot(lot, now))),
        None => {
            let lot = state.repo.get_lot(id).await?;
            Err(AppError::conflict("lot", id, lot.status, LotStatus::Running))
        }
    }
}

pub async fn complete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LotResponse>> {
    let now = state.clock.now();
    match state.repo.complete_lot(id, now).await? {
        Some(lot) => Ok(Json(LotResponse::from_lot(lot, now))),
        None => {
            let lot = state.repo.get_lot(id).await?;
            Err(AppError::conflict("lot", id, lot.status, LotStatus::Completed))
        }
    }
}
