//! Shared type definitions for the City simulation server.
//!
//! This crate is the single source of truth for all types used across the
//! City workspace: identifiers, closed enumerations, data-model records,
//! the wire protocol, perception payloads, and narrative event records.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Enumeration types (kinds, roles, items, volumes, needs)
//! - [`structs`] -- Data-model records (inventory, employment, civic tables)
//! - [`protocol`] -- The sealed inbound/outbound wire protocol
//! - [`perception`] -- Perception payload delivered to residents
//! - [`events`] -- Narrative event records for the append-only log

pub mod enums;
pub mod events;
pub mod ids;
pub mod perception;
pub mod protocol;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    BuildingRole, Direction, ForageKind, ItemKind, MoveSpeed, NeedKind, PainIntensity,
    PainSource, ResidentKind, ResidentStatus, SpeechVolume, ViolationKind,
};
pub use events::{EventKind, WorldEvent};
pub use ids::{
    BuildingId, EventId, ForageableId, JobId, LawId, PetitionId, ResidentId, SessionId,
};
pub use perception::{
    AudibleSpeech, ForageDelta, LawView, NeedsView, PerceptionUpdate, SelfView,
    VisibleBuilding, VisibleObject, VisibleResident,
};
pub use protocol::{
    ActionFailure, ActionResultMessage, ActionStatus, ClientCommand, CommandEnvelope,
    InspectReport, ServerMessage, MAX_PETITION_LEN, MAX_SPEECH_LEN,
};
pub use structs::{
    Appearance, BodyRecord, Employment, InventoryEntry, JobRecord, LawRecord, LawState,
    PetitionRecord, PetitionStatus, PublicResidentRecord, SpeechAct,
};
