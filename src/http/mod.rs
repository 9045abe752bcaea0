//! HTTP surface: route assembly and the shared engine state handlers read from.

mod aegis;
mod background;
mod dispatch;
mod generator_admin;
mod health;
mod jobs;
mod lifecycle_admin;
mod machines;
mod sensors;
mod state;

pub use background::BackgroundTask;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;

fn dispatch_routes() -> Router<AppState> {
    Router::new()
        .route("/dispatch/run", post(dispatch::run_dispatch))
        .route("/dispatch/queue", get(dispatch::get_queue))
        .route("/dispatch/history", get(dispatch::get_history))
}

fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route("/jobs/queue", get(jobs::get_queue))
        .route(
            "/jobs/lifecycle/status",
            get(lifecycle_admin::get_status),
        )
        .route("/jobs/lifecycle/start", post(lifecycle_admin::start))
        .route("/jobs/lifecycle/stop", post(lifecycle_admin::stop))
        .route("/jobs/:id", get(jobs::get_job).patch(jobs::patch_job))
        .route("/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/jobs/:id/start", post(jobs::start_job))
        .route("/jobs/:id/complete", post(jobs::complete_job))
}

fn machine_routes() -> Router<AppState> {
    Router::new()
        .route("/machines", get(machines::list_machines))
        .route(
            "/machines/:id",
            get(machines::get_machine).patch(machines::patch_machine),
        )
        .route("/machines/:id/stats", get(machines::get_machine_stats))
        .route(
            "/machines/:id/sensor-readings",
            get(machines::get_sensor_readings),
        )
}

fn generator_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/job-generator/config",
            get(generator_admin::get_config).post(generator_admin::set_config),
        )
        .route("/job-generator/status", get(generator_admin::get_status))
        .route("/job-generator/start", post(generator_admin::start))
        .route("/job-generator/stop", post(generator_admin::stop))
        .route("/job-generator/enable", post(generator_admin::enable))
        .route("/job-generator/disable", post(generator_admin::disable))
        .route("/job-generator/generate", post(generator_admin::generate_one))
        .route(
            "/job-generator/generate-batch",
            post(generator_admin::generate_batch),
        )
        .route("/job-generator/counts", get(generator_admin::get_counts))
        .route(
            "/job-generator/generation-log",
            get(generator_admin::get_generation_log),
        )
}

fn aegis_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/aegis/incidents",
            get(aegis::list_incidents).post(aegis::create_incident),
        )
        .route("/aegis/incidents/:id", get(aegis::get_incident))
        .route(
            "/aegis/incidents/:id/approve",
            post(aegis::approve_incident),
        )
        .route(
            "/aegis/incidents/:id/resolve",
            post(aegis::resolve_incident),
        )
        .route("/aegis/agents/register", post(aegis::register_agent))
        .route("/aegis/agents", get(aegis::list_agents))
        .route(
            "/aegis/agents/:id/heartbeat",
            post(aegis::heartbeat_agent),
        )
        .route("/aegis/safety-circuit", get(aegis::get_safety_circuit))
        .route("/aegis/summary", get(aegis::get_summary))
        .route("/aegis/telemetry/analyze", post(aegis::analyze_telemetry))
}

fn sensor_routes() -> Router<AppState> {
    Router::new()
        .route("/sensors/simulate", post(sensors::simulate))
        .route("/sensors/start", post(sensors::start))
        .route("/sensors/stop", post(sensors::stop))
        .route("/sensors/status", get(sensors::status))
        .route(
            "/sensors/generate-anomaly",
            post(sensors::generate_anomaly),
        )
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(dispatch_routes())
        .merge(job_routes())
        .merge(machine_routes())
        .merge(generator_routes())
        .merge(aegis_routes())
        .merge(sensor_routes())
        .route("/health", get(health::health))
}

fn build_cors(cfg: &CorsConfig) -> CorsLayer {
    if cfg.allowed_origins.is_empty() && cfg.allowed_origin_regex.is_none() {
        return CorsLayer::permissive();
    }

    let origins = cfg.allowed_origins.clone();
    let pattern = cfg
        .allowed_origin_regex
        .as_ref()
        .and_then(|p| regex::Regex::new(p).ok());

    let allow_origin = AllowOrigin::predicate(move |origin, _parts| {
        let origin = origin.to_str().unwrap_or_default();
        origins.iter().any(|o| o == origin) || pattern.as_ref().is_some_and(|re| re.is_match(origin))
    });

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

/// Assemble the full router, mirroring the layering order of the teacher's
/// `create_app`: versioned API nested under `/api/v1`, then trace,
/// compression, and CORS middleware applied outermost-in.
pub fn create_app(state: AppState, cors: &CorsConfig) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .route("/metrics", get(health::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors(cors))
        .with_state(state)
}
