//! The resident entity: identity, spatial state, physiology, economy,
//! employment, law state, and the per-tick transient buffers.
//!
//! World state owns every [`Resident`] exclusively; sessions hold only the
//! [`city_types::ResidentId`] and re-resolve on each use. All cross-entity
//! links (carried bodies, job sites) are ids resolved at the use site.

use chrono::{DateTime, Utc};
use city_types::{
    Appearance, Employment, LawState, InventoryEntry, MoveSpeed, ResidentId, ResidentKind,
    ResidentStatus, BuildingId,
};
use serde::{Deserialize, Serialize};

/// The six physiological scalars, each clamped to `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Needs {
    /// Fullness; 0 is starving.
    pub hunger: f64,
    /// Hydration; 0 is parched.
    pub thirst: f64,
    /// Wakefulness; 0 forces collapse.
    pub energy: f64,
    /// Bladder pressure; 0 empty, 100 desperate.
    pub bladder: f64,
    /// Vitality; 0 is death.
    pub health: f64,
    /// Companionship.
    pub social: f64,
}

impl Needs {
    /// Fresh-arrival values: everything full, bladder empty.
    pub const fn fresh() -> Self {
        Self {
            hunger: 100.0,
            thirst: 100.0,
            energy: 100.0,
            bladder: 0.0,
            health: 100.0,
            social: 100.0,
        }
    }

    /// Clamp every scalar into `[0, 100]`.
    pub const fn clamp_all(&mut self) {
        self.hunger = self.hunger.clamp(0.0, 100.0);
        self.thirst = self.thirst.clamp(0.0, 100.0);
        self.energy = self.energy.clamp(0.0, 100.0);
        self.bladder = self.bladder.clamp(0.0, 100.0);
        self.health = self.health.clamp(0.0, 100.0);
        self.social = self.social.clamp(0.0, 100.0);
    }
}

/// Current movement intent, consumed by the position phase.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MoveIntent {
    /// Standing still.
    #[default]
    Idle,
    /// Continuous movement in a direction.
    Direction {
        /// Normalized direction x.
        dx: f64,
        /// Normalized direction y.
        dy: f64,
        /// Desired pace.
        speed: MoveSpeed,
    },
    /// Following a waypoint path from `move_to`.
    Waypoints {
        /// Remaining waypoints, front first.
        path: Vec<(f64, f64)>,
        /// Desired pace.
        speed: MoveSpeed,
    },
}

/// A living participant in the city.
#[derive(Debug, Clone, PartialEq)]
pub struct Resident {
    /// Stable internal id.
    pub id: ResidentId,
    /// Human-visible passport number (unique, prefix-tagged).
    pub passport: String,
    /// Full legal name.
    pub full_name: String,
    /// Name used in perception and speech.
    pub preferred_name: String,
    /// Declared place of origin.
    pub origin: String,
    /// Who controls this resident.
    pub kind: ResidentKind,
    /// Cosmetic appearance indices.
    pub appearance: Appearance,
    /// Lifecycle status.
    pub status: ResidentStatus,
    /// Wall-clock registration time.
    pub registered_at: DateTime<Utc>,

    /// World x in pixels.
    pub x: f64,
    /// World y in pixels.
    pub y: f64,
    /// Facing in degrees (0 = east, counter-clockwise).
    pub facing: f64,
    /// Current building, when inside one.
    pub building: Option<BuildingId>,
    /// Whether asleep.
    pub sleeping: bool,
    /// Whether the current sleep was an involuntary collapse.
    pub collapsed: bool,

    /// The six needs.
    pub needs: Needs,

    /// Wallet balance in whole currency units; never negative.
    pub wallet: i64,
    /// Inventory stacks in acquisition order; quantities never zero.
    pub inventory: Vec<InventoryEntry>,
    /// Current employment.
    pub employment: Option<Employment>,
    /// Law-enforcement state.
    pub law: LawState,

    /// Movement intent, consumed by the position phase.
    pub move_intent: MoveIntent,
    /// Notifications accumulated since the last perception flush.
    pub pending_notifications: Vec<String>,
    /// Game-time of the last UBI collection.
    pub last_ubi_collection: Option<f64>,
    /// Game-time this resident stepped off the train; `None` while queued.
    pub arrived_at: Option<f64>,
    /// Anchor position for the loitering detector.
    pub loiter_anchor: (f64, f64),
    /// Game-time the resident has been inside the loiter radius.
    pub loiter_since: f64,
    /// Most recent directed-speech partner and when, for conversations.
    pub last_conversation: Option<(ResidentId, f64)>,
    /// Perception tick counter of the last update sent to this resident.
    pub last_perception_tick: u64,
    /// Last `uses_remaining` this resident saw per forageable node, used
    /// to compute the map-knowledge delta in perception.
    pub forage_knowledge: std::collections::BTreeMap<city_types::ForageableId, u32>,
}

impl Resident {
    /// Create a freshly registered resident waiting for the train.
    ///
    /// Position is the map origin until the train places them on the
    /// platform; `arrived_at` stays `None` until then.
    pub fn register(
        id: ResidentId,
        passport: String,
        full_name: String,
        preferred_name: String,
        origin: String,
        kind: ResidentKind,
        appearance: Appearance,
    ) -> Self {
        Self {
            id,
            passport,
            full_name,
            preferred_name,
            origin,
            kind,
            appearance,
            status: ResidentStatus::Alive,
            registered_at: Utc::now(),
            x: 0.0,
            y: 0.0,
            facing: 0.0,
            building: None,
            sleeping: false,
            collapsed: false,
            needs: Needs::fresh(),
            wallet: 0,
            inventory: Vec::new(),
            employment: None,
            law: LawState::default(),
            move_intent: MoveIntent::Idle,
            pending_notifications: Vec::new(),
            last_ubi_collection: None,
            arrived_at: None,
            loiter_anchor: (0.0, 0.0),
            loiter_since: 0.0,
            last_conversation: None,
            last_perception_tick: 0,
            forage_knowledge: std::collections::BTreeMap::new(),
        }
    }

    /// Whether this resident is dead.
    pub fn is_dead(&self) -> bool {
        self.status == ResidentStatus::Deceased
    }

    /// Whether this resident is in the world and simulated.
    pub fn is_active(&self) -> bool {
        self.status == ResidentStatus::Alive && self.arrived_at.is_some()
    }

    /// Place the resident on the station platform.
    pub fn spawn_at(&mut self, x: f64, y: f64, world_time: f64) {
        self.x = x;
        self.y = y;
        self.arrived_at = Some(world_time);
        self.loiter_anchor = (x, y);
        self.loiter_since = world_time;
    }

    /// Queue a notification for the next perception flush.
    pub fn notify(&mut self, text: impl Into<String>) {
        self.pending_notifications.push(text.into());
    }

    /// Whether a live conversation (directed speech within `window`
    /// game-seconds) is in progress at `world_time`.
    pub fn conversation_live(&self, world_time: f64, window: f64) -> bool {
        self.last_conversation
            .is_some_and(|(_, at)| world_time - at <= window)
    }

    /// Whether the resident holds a job that grants police powers,
    /// according to the given lookup.
    pub fn employment_job(&self) -> Option<city_types::JobId> {
        self.employment.as_ref().map(|e| e.job_id)
    }
}
