use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ActionStatus, Agent, AgentKind, Incident, Severity, Zone};
use crate::error::AppResult;
use crate::repository::IncidentFilter;

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct IncidentResponse {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub severity: Severity,
    pub kind: String,
    pub message: String,
    pub detected_value: f64,
    pub threshold_value: f64,
    pub action: String,
    pub action_status: ActionStatus,
    pub zone: Zone,
    pub z_score: Option<f64>,
    pub roc: Option<f64>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub operator_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Incident> for IncidentResponse {
    fn from(i: Incident) -> Self {
        Self {
            id: i.id,
            equipment_id: i.equipment_id,
            severity: i.severity,
            kind: i.kind,
            message: i.message,
            detected_value: i.detected_value,
            threshold_value: i.threshold_value,
            action: i.action,
            action_status: i.action_status,
            zone: i.zone,
            z_score: i.z_score,
            roc: i.roc,
            resolved: i.resolved,
            resolved_at: i.resolved_at,
            operator_notes: i.operator_notes,
            created_at: i.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateIncidentRequest {
    pub equipment_id: Uuid,
    pub severity: Severity,
    pub kind: String,
    pub message: String,
    pub detected_value: f64,
    pub threshold_value: f64,
    pub action: String,
}

pub async fn create_incident(
    State(state): State<AppState>,
    Json(request): Json<CreateIncidentRequest>,
) -> AppResult<Json<IncidentResponse>> {
    let now = state.clock.now();
    let incident = state
        .repo
        .create_incident(
            crate::repository::NewIncident {
                equipment_id: request.equipment_id,
                severity: request.severity,
                kind: request.kind,
                message: request.message,
                detected_value: request.detected_value,
                threshold_value: request.threshold_value,
                action: request.action,
                z_score: None,
                roc: None,
            },
            now,
        )
        .await?;
    Ok(Json(IncidentResponse::from(incident)))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListIncidentsQuery {
    pub severity: Option<Severity>,
    pub equipment_id: Option<Uuid>,
    pub resolved: Option<bool>,
}

pub async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<ListIncidentsQuery>,
) -> AppResult<Json<Vec<IncidentResponse>>> {
    let incidents = state
        .repo
        .list_incidents(&IncidentFilter {
            severity: query.severity,
            equipment_id: query.equipment_id,
            resolved: query.resolved,
            since: None,
        })
        .await?;
    Ok(Json(incidents.into_iter().map(IncidentResponse::from).collect()))
}

pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<IncidentResponse>> {
    let incident = state.repo.get_incident(id).await?;
    Ok(Json(IncidentResponse::from(incident)))
}

#[derive(Debug, Deserialize)]
pub struct ApproveIncidentRequest {
    #[serde(default = "default_true")]
    pub approve: bool,
}

fn default_true() -> bool {
    true
}

pub async fn approve_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ApproveIncidentRequest>,
) -> AppResult<Json<IncidentResponse>> {
    let incident = state.repo.approve_incident(id, request.approve).await?;
    Ok(Json(IncidentResponse::from(incident)))
}

#[derive(Debug, Deserialize, Default)]
pub struct ResolveIncidentRequest {
    pub operator_notes: Option<String>,
}

pub async fn resolve_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveIncidentRequest>,
) -> AppResult<Json<IncidentResponse>> {
    let now = state.clock.now();
    let incident = state
        .repo
        .resolve_incident(id, request.operator_notes, now)
        .await?;
    Ok(Json(IncidentResponse::from(incident)))
}

#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub id: Uuid,
    pub kind: AgentKind,
    pub equipment_id: Uuid,
    pub status: crate::domain::AgentStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub capabilities: Vec<String>,
}

impl From<Agent> for AgentResponse {
    fn from(a: Agent) -> Self {
        Self {
            id: a.id,
            kind: a.kind,
            equipment_id: a.equipment_id,
            status: a.status,
            last_heartbeat: a.last_heartbeat,
            capabilities: a.capabilities,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub kind: AgentKind,
    pub equipment_id: Uuid,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

pub async fn register_agent(
    State(state): State<AppState>,
    Json(request): Json<RegisterAgentRequest>,
) -> AppResult<Json<AgentResponse>> {
    let now = state.clock.now();
    let agent = state
        .repo
        .register_agent(request.kind, request.equipment_id, request.capabilities, now)
        .await?;
    Ok(Json(AgentResponse::from(agent)))
}

pub async fn list_agents(State(state): State<AppState>) -> AppResult<Json<Vec<AgentResponse>>> {
    let agents = state.repo.list_agents().await?;
    Ok(Json(agents.into_iter().map(AgentResponse::from).collect()))
}

pub async fn heartbeat_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AgentResponse>> {
    let now = state.clock.now();
    let agent = state.repo.heartbeat_agent(id, now).await?;
    Ok(Json(AgentResponse::from(agent)))
}

#[derive(Debug, Serialize)]
pub struct SafetyCircuitResponse {
    pub severity: Severity,
    pub zone: Zone,
    pub action_status: ActionStatus,
}

pub async fn get_safety_circuit() -> Json<Vec<SafetyCircuitResponse>> {
    let severities = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];
    Json(
        severities
            .into_iter()
            .map(|severity| {
                let zone = crate::anomaly::safety::zone_for_severity(severity);
                SafetyCircuitResponse {
                    severity,
                    zone,
                    action_status: crate::anomaly::safety::action_status_for_zone(zone),
                }
            })
            .collect(),
    )
}

#[derive(Debug, Serialize)]
pub struct AegisSummaryResponse {
    pub open_incidents: i64,
    pub critical_incidents: i64,
    pub active_agents: i64,
}

pub async fn get_summary(State(state): State<AppState>) -> AppResult<Json<AegisSummaryResponse>> {
    let open = state
        .repo
        .list_incidents(&IncidentFilter {
            resolved: Some(false),
            ..Default::default()
        })
        .await?;
    let critical = open.iter().filter(|i| i.severity == Severity::Critical).count();
    let agents = state.repo.list_agents().await?;
    let active_agents = agents
        .iter()
        .filter(|a| a.status == crate::domain::AgentStatus::Active)
        .count();
    Ok(Json(AegisSummaryResponse {
        open_incidents: open.len() as i64,
        critical_incidents: critical as i64,
        active_agents: active_agents as i64,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeTelemetryRequest {
    pub equipment_id: Uuid,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct DetectionResponse {
    pub metric: &'static str,
    pub severity: Severity,
    pub zone: Zone,
    pub z_score: f64,
    pub roc_per_minute: f64,
}

pub async fn analyze_telemetry(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeTelemetryRequest>,
) -> AppResult<Json<Vec<DetectionResponse>>> {
    let now = state.clock.now();
    let mut detections = Vec::new();

    if let Some(value) = request.temperature {
        if let Some(d) = state
            .detector
            .analyze_temperature(request.equipment_id, value, now)
        {
            detections.push(DetectionResponse {
                metric: "temperature",
                zone: crate::anomaly::safety::zone_for_severity(d.severity),
                severity: d.severity,
                z_score: d.z_score,
                roc_per_minute: d.roc_per_minute,
            });
        }
    }

    if let Some(value) = request.vibration {
        if let Some(d) = state
            .detector
            .analyze_vibration(request.equipment_id, value, now)
        {
            detections.push(DetectionResponse {
                metric: "vibration",
                zone: crate::anomaly::safety::zone_for_severity(d.severity),
                severity: d.severity,
                z_score: d.z_score,
                roc_per_minute: d.roc_per_minute,
            });
        }
    }

    Ok(Json(detections))
}
