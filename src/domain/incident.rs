use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Green,
    Yellow,
    Red,
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    AutoExecuted,
    PendingApproval,
    AlertOnly,
    Approved,
    Rejected,
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AutoExecuted => "auto_executed",
            Self::PendingApproval => "pending_approval",
            Self::AlertOnly => "alert_only",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
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
