//! Core entity types shared by every engine: equipment, lots, dispatch
//! records, telemetry, incidents, and agents.

mod agent;
mod dispatch;
mod equipment;
mod generation_log;
mod incident;
mod lot;
mod sensor;

pub use agent::{Agent, AgentKind, AgentStatus};
pub use dispatch::DispatchRecord;
pub use equipment::{Equipment, EquipmentKind, EquipmentStatus};
pub use generation_log::GenerationLogEntry;
pub use incident::{ActionStatus, Incident, Severity, Zone};
pub use lot::{Lot, LotStatus};
pub use sensor::SensorReading;

use uuid::Uuid;

/// Newtype-free id alias kept for readability at call sites; all entity ids
/// are UUIDs assigned by the repository on creation.
pub type Id = Uuid;
