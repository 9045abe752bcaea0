use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable record of a single scheduler decision: one lot assigned to
/// one piece of equipment. Never updated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: Uuid,
    pub lot_id: Uuid,
    pub equipment_id: Uuid,
    pub reason: String,
    pub score: f64,
    pub dispatched_at: DateTime<Utc>,
}
