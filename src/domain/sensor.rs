use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub temperature: f64,
    pub vibration: f64,
    pub pressure: f64,
    pub power: f64,
    pub recorded_at: DateTime<Utc>,
    pub is_anomaly: bool,
    pub anomaly_score: Option<f64>,
}
