use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentKind {
    Lithography,
    Etching,
    Deposition,
    Inspection,
    Cleaning,
}

impl std::fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Lithography => "lithography",
            Self::Etching => "etching",
            Self::Deposition => "deposition",
            Self::Inspection => "inspection",
            Self::Cleaning => "cleaning",
        };
        f.write_str(s)
    }
}

impl EquipmentKind {
    /// Recipe-kind string to compatible equipment kinds, per the scheduler's
    /// recipe compatibility table.
    pub fn compatible_with_recipe(self, recipe_kind: &str) -> bool {
        let recipe = recipe_kind.to_ascii_lowercase();
        match self {
            Self::Lithography => {
                recipe.contains("litho") || recipe.contains("euv") || recipe.contains("duv")
            }
            Self::Etching => recipe.contains("etch"),
            Self::Deposition => {
                recipe.contains("deposition") || recipe.contains("cvd") || recipe.contains("pvd")
            }
            Self::Inspection => recipe.contains("inspection"),
            Self::Cleaning => recipe.contains("clean"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EquipmentStatus {
    Idle,
    Running,
    Down,
    Maintenance,
}

impl std::fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Down => "DOWN",
            Self::Maintenance => "MAINTENANCE",
        };
        f.write_str(s)
    }
}

impl EquipmentStatus {
    /// Equipment in either of these states may receive new dispatch work.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, Self::Idle | Self::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    pub id: Uuid,
    pub name: String,
    pub kind: EquipmentKind,
    pub status: EquipmentStatus,
    pub efficiency: f64,
    pub zone: String,
    pub current_lot_id: Option<Uuid>,
    pub total_wafers_processed: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
