use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationLogEntry {
    pub id: Uuid,
    pub lot_id: Uuid,
    pub reason: String,
    pub triggered_by: String,
    pub config_snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
