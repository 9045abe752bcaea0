use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::atomic::Ordering;

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct LifecycleStatusResponse {
    pub running: bool,
    pub started: u64,
    pub completed: u64,
    pub ticks: u64,
}

pub async fn get_status(State(state): State<AppState>) -> Json<LifecycleStatusResponse> {
    Json(LifecycleStatusResponse {
        running: state.lifecycle_task.is_running(),
        started: state.lifecycle.stats.started.load(Ordering::Relaxed),
        completed: state.lifecycle.stats.completed.load(Ordering::Relaxed),
        ticks: state.lifecycle.stats.ticks.load(Ordering::Relaxed),
    })
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub changed: bool,
    pub running: bool,
}

pub async fn start(State(state): State<AppState>) -> Json<ToggleResponse> {
    let processor = state.lifecycle.clone();
    let interval_secs = state.lifecycle_interval_secs;
    let changed = state
        .lifecycle_task
        .start(move |token| tokio::spawn(async move { processor.run(interval_secs, token).await }));
    Json(ToggleResponse {
        changed,
        running: state.lifecycle_task.is_running(),
    })
}

pub async fn stop(State(state): State<AppState>) -> Json<ToggleResponse> {
    let changed = state.lifecycle_task.stop();
    Json(ToggleResponse {
        changed,
        running: state.lifecycle_task.is_running(),
    })
}
