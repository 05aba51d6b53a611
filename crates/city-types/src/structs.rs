//! Plain data records shared between the engine, gateway, and repository.
//!
//! These are the rows and embedded values of the data model: inventory
//! entries, employment state, civic tables (petitions, jobs, laws), bodies,
//! and queued speech acts. Mutation logic lives in `city-residents` and
//! `city-core`; this crate only defines the shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{ItemKind, SpeechVolume, ViolationKind};
use crate::ids::{BuildingId, JobId, LawId, PetitionId, ResidentId};

/// One stacked entry in a resident's inventory.
///
/// `quantity` is always at least 1; entries that would drop to zero are
/// removed instead. `remaining_uses` is carried only by items that wear
/// out (sleeping bags) rather than being consumed whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// Stable identity of this stack (survives quantity changes).
    pub id: Uuid,
    /// What the stack holds.
    pub item: ItemKind,
    /// How many units are stacked; never zero.
    pub quantity: u32,
    /// Uses left on the top unit, for wearing items.
    pub remaining_uses: Option<u32>,
}

impl InventoryEntry {
    /// Create a fresh stack of `quantity` units of `item`.
    pub fn new(item: ItemKind, quantity: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            item,
            quantity,
            remaining_uses: item.initial_uses(),
        }
    }
}

/// Cosmetic appearance indices chosen at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appearance {
    /// Skin tone index.
    pub skin: u8,
    /// Hair style index.
    pub hair: u8,
    /// Body build index.
    pub build: u8,
    /// Eye color index.
    pub eyes: u8,
}

/// A resident's current employment, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employment {
    /// The job held.
    pub job_id: JobId,
    /// Whether the resident is currently accruing shift time.
    pub on_shift: bool,
    /// Game-seconds accrued towards the current shift. Pauses when the
    /// resident leaves the workplace; resets only on completion.
    pub shift_elapsed: f64,
}

impl Employment {
    /// Fresh employment record for a newly accepted job.
    pub const fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            on_shift: false,
            shift_elapsed: 0.0,
        }
    }
}

/// Law-enforcement state attached to a resident.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LawState {
    /// Violations currently on record.
    pub violations: Vec<ViolationKind>,
    /// Game-time at which imprisonment ends, while serving a sentence.
    pub imprisoned_until: Option<f64>,
    /// The suspect (or body) currently being carried, if any.
    pub carrying: Option<ResidentId>,
}

impl LawState {
    /// Whether any violation marks this resident as subject to arrest.
    pub fn is_wanted(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Whether the resident is still serving a sentence at `world_time`.
    pub fn is_imprisoned(&self, world_time: f64) -> bool {
        self.imprisoned_until.is_some_and(|end| world_time < end)
    }
}

/// Status of a petition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetitionStatus {
    /// Accepting votes.
    Open,
    /// Closed to further votes.
    Closed,
}

/// A civic petition authored by a resident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetitionRecord {
    /// Petition id.
    pub id: PetitionId,
    /// The author.
    pub author: ResidentId,
    /// Free-form category chosen by the author.
    pub category: String,
    /// What the petition proposes.
    pub description: String,
    /// Open or closed.
    pub status: PetitionStatus,
    /// Votes in favour.
    pub votes_for: u32,
    /// Votes against.
    pub votes_against: u32,
    /// Game-time when the petition was opened.
    pub opened_at: f64,
}

/// A job posting residents can apply to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job id.
    pub id: JobId,
    /// Display title.
    pub title: String,
    /// Workplace building; `None` for outdoor jobs (groundskeeper).
    pub building: Option<BuildingId>,
    /// Wage paid on each completed shift, in whole currency units.
    pub wage: i64,
    /// Length of one shift in game-hours.
    pub shift_hours: f64,
    /// Maximum simultaneous holders.
    pub max_positions: u32,
    /// Whether holders carry police powers (arrest, booking).
    #[serde(default)]
    pub police: bool,
    /// Description shown in listings.
    pub description: String,
}

/// A law on the books, referenced when booking suspects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawRecord {
    /// Law id.
    pub id: LawId,
    /// Display name.
    pub name: String,
    /// What the law prohibits.
    pub description: String,
    /// Sentence length in game-hours.
    pub sentence_hours: f64,
}

/// The post-mortem object form of a deceased resident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyRecord {
    /// The resident this body belonged to.
    pub resident: ResidentId,
    /// Name shown when the body is inspected.
    pub name: String,
    /// World x position in pixels.
    pub x: f64,
    /// World y position in pixels.
    pub y: f64,
    /// Game-time of death.
    pub died_at: f64,
    /// Who is carrying the body, if anyone.
    pub carried_by: Option<ResidentId>,
}

/// A speech act queued for the current perception window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechAct {
    /// Who spoke.
    pub speaker: ResidentId,
    /// Speaker's preferred name at the time of speaking.
    pub speaker_name: String,
    /// What was said.
    pub text: String,
    /// How loudly.
    pub volume: SpeechVolume,
    /// Addressee for directed speech.
    pub to: Option<ResidentId>,
    /// Speaker x position when the words were spoken.
    pub x: f64,
    /// Speaker y position when the words were spoken.
    pub y: f64,
    /// Game-time of the utterance.
    pub world_time: f64,
}

/// Public record of a resident served by the HTTP read surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicResidentRecord {
    /// Resident id.
    pub id: ResidentId,
    /// Passport number.
    pub passport: String,
    /// Preferred name.
    pub name: String,
    /// Declared origin.
    pub origin: String,
    /// Lifecycle status string (`alive`, `deceased`, `departed`).
    pub status: String,
    /// Wallet balance.
    pub wallet: i64,
    /// Game-time the resident arrived, if they have spawned.
    pub arrived_at: Option<f64>,
    /// Wall-clock registration time.
    pub registered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stack_carries_item_uses() {
        let bag = InventoryEntry::new(ItemKind::SleepingBag, 1);
        assert_eq!(bag.remaining_uses, Some(20));
        let bread = InventoryEntry::new(ItemKind::Bread, 3);
        assert_eq!(bread.remaining_uses, None);
        assert_eq!(bread.quantity, 3);
    }

    #[test]
    fn wanted_follows_violations() {
        let mut law = LawState::default();
        assert!(!law.is_wanted());
        law.violations.push(ViolationKind::Loitering);
        assert!(law.is_wanted());
    }

    #[test]
    fn imprisonment_expires_with_the_clock() {
        let law = LawState {
            violations: Vec::new(),
            imprisoned_until: Some(1000.0),
            carrying: None,
        };
        assert!(law.is_imprisoned(999.0));
        assert!(!law.is_imprisoned(1000.0));
    }
}
