//! Narrative event records.
//!
//! Every state-changing action produces exactly one [`WorldEvent`]. Events
//! flow to three places: the append-only `events` table, the activity feed
//! served by the gateway, and (when they concern a connected resident)
//! the session outbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{BuildingId, EventId, ResidentId};

/// The closed set of narrative event kinds the engine records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A resident stepped off the train.
    Arrival,
    /// A resident left the city permanently.
    Depart,
    /// A resident died.
    Death,
    /// A speech act.
    Speak,
    /// A paid exchange between residents.
    Trade,
    /// A free hand-over between residents.
    Give,
    /// A resident took a job.
    ApplyJob,
    /// A resident quit a job.
    QuitJob,
    /// A shift finished and the wage was paid.
    ShiftComplete,
    /// A petition was authored.
    WritePetition,
    /// A vote was cast.
    VotePetition,
    /// A shop purchase.
    Buy,
    /// A UBI collection.
    CollectUbi,
    /// A forage harvest.
    Forage,
    /// A resident collapsed from exhaustion.
    Collapse,
    /// A bladder accident.
    BladderAccident,
    /// A body was picked up.
    CollectBody,
    /// A body was delivered at the mortuary.
    ProcessBody,
    /// A suspect was arrested.
    Arrest,
    /// A suspect was booked at the police station.
    BookSuspect,
    /// A violation was recorded.
    LawViolation,
}

impl EventKind {
    /// Stable lowercase string used in database rows and on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arrival => "arrival",
            Self::Depart => "depart",
            Self::Death => "death",
            Self::Speak => "speak",
            Self::Trade => "trade",
            Self::Give => "give",
            Self::ApplyJob => "apply_job",
            Self::QuitJob => "quit_job",
            Self::ShiftComplete => "shift_complete",
            Self::WritePetition => "write_petition",
            Self::VotePetition => "vote_petition",
            Self::Buy => "buy",
            Self::CollectUbi => "collect_ubi",
            Self::Forage => "forage",
            Self::Collapse => "collapse",
            Self::BladderAccident => "bladder_accident",
            Self::CollectBody => "collect_body",
            Self::ProcessBody => "process_body",
            Self::Arrest => "arrest",
            Self::BookSuspect => "book_suspect",
            Self::LawViolation => "law_violation",
        }
    }
}

/// One row of the append-only narrative log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    /// Event id; also the idempotency key for at-least-once persistence.
    pub id: EventId,
    /// Game-time when the event happened.
    pub world_time: f64,
    /// Wall-clock time the event was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Event kind.
    pub kind: EventKind,
    /// Primary resident involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resident: Option<ResidentId>,
    /// Secondary resident involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ResidentId>,
    /// Building involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<BuildingId>,
    /// Event x position, when positional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// Event y position, when positional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// Kind-specific payload.
    pub data: Value,
}

impl WorldEvent {
    /// Build an event with a fresh id and the current wall clock.
    pub fn new(kind: EventKind, world_time: f64) -> Self {
        Self {
            id: EventId::new(),
            world_time,
            recorded_at: Utc::now(),
            kind,
            resident: None,
            target: None,
            building: None,
            x: None,
            y: None,
            data: Value::Null,
        }
    }

    /// Attach the primary resident.
    #[must_use]
    pub const fn with_resident(mut self, resident: ResidentId) -> Self {
        self.resident = Some(resident);
        self
    }

    /// Attach the secondary resident.
    #[must_use]
    pub const fn with_target(mut self, target: ResidentId) -> Self {
        self.target = Some(target);
        self
    }

    /// Attach the building.
    #[must_use]
    pub const fn with_building(mut self, building: BuildingId) -> Self {
        self.building = Some(building);
        self
    }

    /// Attach a world position.
    #[must_use]
    pub const fn at(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    /// Attach the kind-specific payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builder_composes() {
        let resident = ResidentId::new();
        let event = WorldEvent::new(EventKind::Buy, 120.0)
            .with_resident(resident)
            .at(64.0, 96.0)
            .with_data(serde_json::json!({"item": "bread", "quantity": 2}));
        assert_eq!(event.kind, EventKind::Buy);
        assert_eq!(event.resident, Some(resident));
        assert_eq!(event.x, Some(64.0));
        assert!(event.data.get("item").is_some());
    }

    #[test]
    fn kind_strings_are_snake_case() {
        assert_eq!(EventKind::BladderAccident.as_str(), "bladder_accident");
        assert_eq!(EventKind::ShiftComplete.as_str(), "shift_complete");
    }
}
