//! Perception payloads: the bounded view of the world one resident
//! receives each perception tick.
//!
//! The engine assembles one [`PerceptionUpdate`] per living connected
//! resident per perception tick. Spectator sessions receive the identical
//! stream to the resident they follow. The payload is self-contained --
//! a client that missed earlier ticks can act on the newest one alone.

use serde::{Deserialize, Serialize};

use crate::enums::{BuildingRole, ForageKind, SpeechVolume};
use crate::ids::{BuildingId, ForageableId, ResidentId};
use crate::structs::{Employment, InventoryEntry};

/// Snapshot of the six needs at the tick boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeedsView {
    /// Fullness, 0..100.
    pub hunger: f64,
    /// Hydration, 0..100.
    pub thirst: f64,
    /// Wakefulness, 0..100.
    pub energy: f64,
    /// Bladder pressure, 0 empty .. 100 desperate.
    pub bladder: f64,
    /// Vitality, 0..100.
    pub health: f64,
    /// Companionship, 0..100.
    pub social: f64,
}

/// Law-enforcement state visible to the resident themself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawView {
    /// Whether any violation marks the resident for arrest.
    pub wanted: bool,
    /// Violation kind strings currently on record.
    pub violations: Vec<String>,
    /// Game-time imprisonment ends, when serving a sentence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imprisoned_until: Option<f64>,
}

/// The resident's own full state inside a perception update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfView {
    /// Resident id.
    pub id: ResidentId,
    /// Passport number.
    pub passport: String,
    /// Preferred name.
    pub name: String,
    /// World x in pixels.
    pub x: f64,
    /// World y in pixels.
    pub y: f64,
    /// Facing in degrees.
    pub facing: f64,
    /// Current building, when inside one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<BuildingId>,
    /// Whether asleep.
    pub sleeping: bool,
    /// The six needs.
    pub needs: NeedsView,
    /// Wallet balance in whole currency units.
    pub wallet: i64,
    /// Inventory stacks in acquisition order.
    pub inventory: Vec<InventoryEntry>,
    /// Current employment, when employed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment: Option<Employment>,
    /// Law state.
    pub law: LawView,
    /// One-shot token to attach to `submit_feedback`, when issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_token: Option<String>,
}

/// Another resident inside the field of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleResident {
    /// Their id.
    pub id: ResidentId,
    /// Their preferred name.
    pub name: String,
    /// World x.
    pub x: f64,
    /// World y.
    pub y: f64,
    /// Their facing in degrees.
    pub facing: f64,
    /// Whether they are asleep.
    pub sleeping: bool,
    /// Distance from the perceiver in pixels.
    pub distance: f64,
}

/// A notable non-resident object inside the field of view: a body or a
/// forageable node. Bodies always report `is_dead = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleObject {
    /// Stable object id (resident id for bodies, node id for forage).
    pub id: uuid::Uuid,
    /// Object kind string (`body`, `berry_bush`, `fresh_spring`).
    pub kind: String,
    /// Display label.
    pub label: String,
    /// World x.
    pub x: f64,
    /// World y.
    pub y: f64,
    /// True for bodies.
    pub is_dead: bool,
}

/// A building inside ambient range. Buildings ignore the facing cone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleBuilding {
    /// Building id.
    pub id: BuildingId,
    /// Civic role.
    pub role: BuildingRole,
    /// Nearest door x in pixels.
    pub door_x: f64,
    /// Nearest door y in pixels.
    pub door_y: f64,
    /// Distance from the perceiver to the nearest door.
    pub distance: f64,
}

/// A speech act heard during the last perception window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudibleSpeech {
    /// The speaker.
    pub speaker: ResidentId,
    /// Speaker's name.
    pub speaker_name: String,
    /// The words.
    pub text: String,
    /// Volume tag, preserved for rendering.
    pub volume: SpeechVolume,
    /// Whether the speech was addressed to the perceiver.
    pub directed: bool,
}

/// Change to a forageable node since the resident's last perception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForageDelta {
    /// The node.
    pub id: ForageableId,
    /// Node kind.
    pub kind: ForageKind,
    /// Uses left after the change.
    pub uses_remaining: u32,
}

/// One complete perception tick for one resident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionUpdate {
    /// Perception tick counter.
    pub tick: u64,
    /// Game-time at the tick boundary.
    pub world_time: f64,
    /// Coarse time-of-day label (`night`, `morning`, ...).
    pub time_of_day: String,
    /// The resident's own state.
    #[serde(rename = "self")]
    pub self_view: SelfView,
    /// Living residents in view.
    pub residents: Vec<VisibleResident>,
    /// Bodies and forageables in view.
    pub objects: Vec<VisibleObject>,
    /// Buildings within ambient range.
    pub buildings: Vec<VisibleBuilding>,
    /// Speech heard since the last perception tick.
    pub audible: Vec<AudibleSpeech>,
    /// Ordered list of currently legal interaction verbs.
    pub interactions: Vec<String>,
    /// Accumulated notifications, flushed by this message.
    pub notifications: Vec<String>,
    /// Forageable nodes whose uses changed since last perception.
    pub forage_delta: Vec<ForageDelta>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn self_field_renames_on_the_wire() {
        let update = PerceptionUpdate {
            tick: 1,
            world_time: 10.0,
            time_of_day: String::from("morning"),
            self_view: SelfView {
                id: ResidentId::new(),
                passport: String::from("CITY-AB12C"),
                name: String::from("Ada"),
                x: 0.0,
                y: 0.0,
                facing: 0.0,
                building: None,
                sleeping: false,
                needs: NeedsView {
                    hunger: 100.0,
                    thirst: 100.0,
                    energy: 100.0,
                    bladder: 0.0,
                    health: 100.0,
                    social: 100.0,
                },
                wallet: 0,
                inventory: Vec::new(),
                employment: None,
                law: LawView {
                    wanted: false,
                    violations: Vec::new(),
                    imprisoned_until: None,
                },
                feedback_token: None,
            },
            residents: Vec::new(),
            objects: Vec::new(),
            buildings: Vec::new(),
            audible: Vec::new(),
            interactions: Vec::new(),
            notifications: Vec::new(),
            forage_delta: Vec::new(),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("self").is_some());
        assert!(json.get("self_view").is_none());
    }
}
