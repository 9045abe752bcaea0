use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LotStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for LotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

impl LotStatus {
    /// Whether `self -> next` is a legal edge in the lifecycle graph.
    pub fn can_transition_to(self, next: LotStatus) -> bool {
        use LotStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Cancelled)
                | (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
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
}

impl Lot {
    /// Minutes elapsed since the lot started running, if it has started.
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        self.started_at
            .map(|started| (now - started).num_seconds() / 60)
    }
}
