//! End-to-end HTTP regression tests against the in-memory repository.
//! Mirrors the teacher's `routes::tests` style: build a router, drive it
//! with `tower::ServiceExt::oneshot`, assert on status + decoded JSON.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use foundry_mes::clock::SimClock;
use foundry_mes::config::{CorsConfig, GeneratorConfig, SchedulerConfig};
use foundry_mes::domain::EquipmentKind;
use foundry_mes::http::{create_app, AppState};
use foundry_mes::repository::{demo_equipment, InMemoryRepository};
use foundry_mes::rng::SharedRng;

fn test_app() -> (axum::Router, Arc<InMemoryRepository>) {
    let repo = Arc::new(InMemoryRepository::new());
    let now = Utc::now();
    repo.seed_equipment(demo_equipment("ETCH-01", EquipmentKind::Etching, 0.9, now));
    repo.seed_equipment(demo_equipment("LITHO-01", EquipmentKind::Lithography, 0.85, now));

    let clock: foundry_mes::clock::SharedClock = Arc::new(SimClock::new(now));
    let rng = SharedRng::from_seed(42);
    let state = AppState::new(
        repo.clone() as foundry_mes::repository::SharedRepository,
        clock,
        rng,
        SchedulerConfig::default(),
        GeneratorConfig::default(),
        10,
        10,
        60,
    );
    let app = create_app(state, &CorsConfig::default());
    (app, repo)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("collect body");
    serde_json::from_slice(&bytes).expect("valid json body")
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_reports_repository_reachable() {
    let (app, _repo) = test_app();
    let response = app.oneshot(get_request("/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["repository_reachable"], true);
}

#[tokio::test]
async fn metrics_exposes_prometheus_text() {
    let (app, _repo) = test_app();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("# TYPE fab_lots_pending gauge"));
}

/// Scenario A: a hot lot must be dispatched ahead of a higher-priority
/// (numerically lower) non-hot lot queued earlier.
#[tokio::test]
async fn hot_lot_bypasses_lower_priority_in_dispatch_queue() {
    let (app, _repo) = test_app();

    let normal = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/jobs",
            json!({
                "name": "LOT-NORMAL",
                "wafer_count": 25,
                "priority": 1,
                "hot_lot": false,
                "recipe_kind": "ETCH_STD",
                "estimated_duration_minutes": 120,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(normal.status(), StatusCode::OK);

    let hot = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/jobs",
            json!({
                "name": "LOT-HOT",
                "wafer_count": 25,
                "priority": 5,
                "hot_lot": true,
                "recipe_kind": "ETCH_STD",
                "estimated_duration_minutes": 120,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(hot.status(), StatusCode::OK);
    let hot_lot = body_json(hot).await;

    let queue = app
        .clone()
        .oneshot(get_request("/api/v1/dispatch/queue"))
        .await
        .unwrap();
    let queue = body_json(queue).await;
    let next_up = queue["next_up"].as_array().unwrap();
    assert_eq!(next_up[0]["id"], hot_lot["id"]);
}

/// Scenario: creating a lot with an invalid priority is rejected before it
/// ever reaches the repository.
#[tokio::test]
async fn create_job_rejects_invalid_priority() {
    let (app, _repo) = test_app();
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/jobs",
            json!({
                "name": "LOT-BAD",
                "wafer_count": 25,
                "priority": 9,
                "recipe_kind": "STANDARD_LOGIC",
                "estimated_duration_minutes": 60,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Property: patching a lot past PENDING is a conflict, not a silent edit.
#[tokio::test]
async fn patch_job_rejects_non_pending_lot() {
    let (app, _repo) = test_app();

    let created = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/jobs",
            json!({
                "name": "LOT-1",
                "wafer_count": 25,
                "priority": 3,
                "recipe_kind": "STANDARD_LOGIC",
                "estimated_duration_minutes": 60,
            }),
        ))
        .await
        .unwrap();
    let lot = body_json(created).await;
    let id = lot["id"].as_str().unwrap();

    let cancel = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/jobs/{id}/cancel"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(cancel.status(), StatusCode::OK);

    let patch = app
        .oneshot(json_request(
            "PATCH",
            &format!("/api/v1/jobs/{id}"),
            json!({ "priority": 1 }),
        ))
        .await
        .unwrap();
    assert_eq!(patch.status(), StatusCode::BAD_REQUEST);
}

/// Property: never double-assign equipment — dispatching twice in a row
/// with only one idle machine and one recipe-matching lot assigns once.
#[tokio::test]
async fn dispatch_run_never_double_assigns_equipment() {
    let (app, _repo) = test_app();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/jobs",
            json!({
                "name": "LOT-A",
                "wafer_count": 25,
                "priority": 3,
                "recipe_kind": "ETCH_STD",
                "estimated_duration_minutes": 60,
            }),
        ))
        .await
        .unwrap();
    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/jobs",
            json!({
                "name": "LOT-B",
                "wafer_count": 25,
                "priority": 3,
                "recipe_kind": "ETCH_STD",
                "estimated_duration_minutes": 60,
            }),
        ))
        .await
        .unwrap();

    let first = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/dispatch/run", json!({})))
        .await
        .unwrap();
    let first = body_json(first).await;
    let dispatched_equipment: Vec<String> = first["decisions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["equipment_id"].as_str().unwrap().to_string())
        .collect();
    let mut unique = dispatched_equipment.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(dispatched_equipment.len(), unique.len());
}

/// Scenario D: a sustained thermal runaway (value above the critical
/// threshold) raises a Critical-zone detection via the analyze endpoint.
#[tokio::test]
async fn analyze_telemetry_flags_thermal_runaway() {
    let (app, _repo) = test_app();
    let equipment_id = Uuid::new_v4();

    // Feed enough baseline samples before the spike, matching the
    // detector's minimum-sample gate.
    for i in 0..12 {
        let value = 60.0 + i as f64 * 0.1;
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/aegis/telemetry/analyze",
                json!({ "equipment_id": equipment_id, "temperature": value }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let spike = app
        .oneshot(json_request(
            "POST",
            "/api/v1/aegis/telemetry/analyze",
            json!({ "equipment_id": equipment_id, "temperature": 250.0 }),
        ))
        .await
        .unwrap();
    let detections = body_json(spike).await;
    let detections = detections.as_array().unwrap();
    assert!(!detections.is_empty());
    assert_eq!(detections[0]["metric"], "temperature");
}

/// The safety circuit lookup is a pure function over every severity; it
/// must not hardcode a fixed zone for any one metric.
#[tokio::test]
async fn safety_circuit_lists_all_severities() {
    let (app, _repo) = test_app();
    let response = app.oneshot(get_request("/api/v1/aegis/safety-circuit")).await.unwrap();
    let entries = body_json(response).await;
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 4);
}

/// Unknown lot id returns a 404, not a panic or a 500.
#[tokio::test]
async fn get_unknown_job_returns_not_found() {
    let (app, _repo) = test_app();
    let response = app
        .oneshot(get_request(&format!("/api/v1/jobs/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
