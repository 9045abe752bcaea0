use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;

use crate::config::GeneratorConfig;
use crate::error::{AppError, AppResult};
use crate::repository::GenerationLogFilter;

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct GeneratorConfigResponse {
    pub enabled: bool,
    pub interval_secs: u64,
    pub min_lots: i64,
    pub max_lots: i64,
    pub batch_size: usize,
    pub hot_lot_probability: f64,
    pub priority_distribution: [f64; 5],
}

impl From<&GeneratorConfig> for GeneratorConfigResponse {
    fn from(cfg: &GeneratorConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            interval_secs: cfg.interval_secs,
            min_lots: cfg.min_lots,
            max_lots: cfg.max_lots,
            batch_size: cfg.batch_size,
            hot_lot_probability: cfg.hot_lot_probability,
            priority_distribution: cfg.priority_distribution,
        }
    }
}

pub async fn get_config(State(state): State<AppState>) -> Json<GeneratorConfigResponse> {
    Json(GeneratorConfigResponse::from(&**state.generator_config.load()))
}

#[derive(Debug, Deserialize, Default)]
pub struct SetConfigRequest {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
    pub min_lots: Option<i64>,
    pub max_lots: Option<i64>,
    pub batch_size: Option<usize>,
    pub hot_lot_probability: Option<f64>,
    pub priority_distribution: Option<[f64; 5]>,
}

pub async fn set_config(
    State(state): State<AppState>,
    Json(request): Json<SetConfigRequest>,
) -> AppResult<Json<GeneratorConfigResponse>> {
    let mut cfg = (**state.generator_config.load()).clone();
    if let Some(v) = request.enabled {
        cfg.enabled = v;
    }
    if let Some(v) = request.interval_secs {
        cfg.interval_secs = v;
    }
    if let Some(v) = request.min_lots {
        cfg.min_lots = v;
    }
    if let Some(v) = request.max_lots {
        cfg.max_lots = v;
    }
    if let Some(v) = request.batch_size {
        cfg.batch_size = v;
    }
    if let Some(v) = request.hot_lot_probability {
        cfg.hot_lot_probability = v;
    }
    if let Some(v) = request.priority_distribution {
        cfg.priority_distribution = v;
    }
    if cfg.min_lots > cfg.max_lots {
        return Err(AppError::Validation("min_lots cannot exceed max_lots".to_string()));
    }
    let updated = cfg.normalized().map_err(AppError::Validation)?;
    state.generator_config.store(std::sync::Arc::new(updated.clone()));
    Ok(Json(GeneratorConfigResponse::from(&updated)))
}

#[derive(Debug, Serialize)]
pub struct GeneratorStatusResponse {
    pub running: bool,
    pub generated: u64,
    pub runs: u64,
}

pub async fn get_status(State(state): State<AppState>) -> Json<GeneratorStatusResponse> {
    Json(GeneratorStatusResponse {
        running: state.generator_task.is_running(),
        generated: state.generator.stats.generated.load(Ordering::Relaxed),
        runs: state.generator.stats.runs.load(Ordering::Relaxed),
    })
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub changed: bool,
    pub running: bool,
}

pub async fn start(State(state): State<AppState>) -> Json<ToggleResponse> {
    let generator = state.generator.clone();
    let cfg = (**state.generator_config.load()).clone();
    let changed = state
        .generator_task
        .start(move |token| tokio::spawn(async move { generator.run(cfg, token).await }));
    Json(ToggleResponse {
        changed,
        running: state.generator_task.is_running(),
    })
}

pub async fn stop(State(state): State<AppState>) -> Json<ToggleResponse> {
    let changed = state.generator_task.stop();
    Json(ToggleResponse {
        changed,
        running: state.generator_task.is_running(),
    })
}

pub async fn enable(State(state): State<AppState>) -> Json<GeneratorConfigResponse> {
    let mut cfg = (**state.generator_config.load()).clone();
    cfg.enabled = true;
    state.generator_config.store(std::sync::Arc::new(cfg.clone()));
    Json(GeneratorConfigResponse::from(&cfg))
}

pub async fn disable(State(state): State<AppState>) -> Json<GeneratorConfigResponse> {
    let mut cfg = (**state.generator_config.load()).clone();
    cfg.enabled = false;
    state.generator_config.store(std::sync::Arc::new(cfg.clone()));
    Json(GeneratorConfigResponse::from(&cfg))
}

pub async fn generate_one(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let cfg = (**state.generator_config.load()).clone();
    state
        .generator
        .generate_one(&cfg, "operator")
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(serde_json::json!({ "generated": 1 })))
}

#[derive(Debug, Deserialize, Default)]
pub struct GenerateBatchQuery {
    pub batch_size: Option<usize>,
}

pub async fn generate_batch(
    State(state): State<AppState>,
    Query(query): Query<GenerateBatchQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let mut cfg = (**state.generator_config.load()).clone();
    if let Some(batch_size) = query.batch_size {
        cfg.batch_size = batch_size;
        let active = state.repo.count_active_lots().await?;
        cfg.min_lots = cfg.min_lots.max(active + batch_size as i64);
    }
    let generated = state
        .generator
        .generate_if_needed(&cfg)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(serde_json::json!({ "generated": generated })))
}

#[derive(Debug, Serialize)]
pub struct CountsResponse {
    pub active_lots: i64,
    pub min_lots: i64,
    pub max_lots: i64,
}

pub async fn get_counts(State(state): State<AppState>) -> AppResult<Json<CountsResponse>> {
    let cfg = state.generator_config.load();
    let active_lots = state.repo.count_active_lots().await?;
    Ok(Json(CountsResponse {
        active_lots,
        min_lots: cfg.min_lots,
        max_lots: cfg.max_lots,
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct GenerationLogQuery {
    pub limit: Option<i64>,
    pub reason: Option<String>,
}

pub async fn get_generation_log(
    State(state): State<AppState>,
    Query(query): Query<GenerationLogQuery>,
) -> AppResult<Json<Vec<crate::domain::GenerationLogEntry>>> {
    let entries = state
        .repo
        .list_generation_log(&GenerationLogFilter {
            reason: query.reason,
            limit: query.limit.unwrap_or(50),
        })
        .await?;
    Ok(Json(entries))
}
