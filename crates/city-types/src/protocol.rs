//! The wire protocol: inbound client commands and outbound server messages.
//!
//! Both directions are sealed, serde-tagged sum types. A frame whose `type`
//! tag does not match a variant fails deserialization and is answered with
//! a validation error; nothing in the engine ever panics on foreign input.
//!
//! Inbound frames may carry an opaque `request_id`; the dispatcher echoes
//! it on the single `action_result` each command produces.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::{ItemKind, MoveSpeed, PainIntensity, PainSource, SpeechVolume};
use crate::ids::{BuildingId, ForageableId, JobId, PetitionId, ResidentId};
use crate::perception::PerceptionUpdate;

/// Maximum characters accepted in a speech act.
pub const MAX_SPEECH_LEN: usize = 500;

/// Maximum characters accepted in a petition description.
pub const MAX_PETITION_LEN: usize = 2000;

/// One inbound frame: an optional request id plus the tagged command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Opaque client-chosen id echoed on the matching `action_result`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// The command itself.
    #[serde(flatten)]
    pub command: ClientCommand,
}

/// Every command a client may send, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Present a session credential (first frame of a player session).
    Auth {
        /// The signed bearer credential from registration.
        token: String,
    },
    /// Set a continuous movement intent by direction.
    Move {
        /// Direction x component (normalized by the server).
        dx: f64,
        /// Direction y component.
        dy: f64,
        /// Desired pace.
        #[serde(default)]
        speed: MoveSpeed,
    },
    /// Path towards a target point using A*.
    MoveTo {
        /// Target x in pixels.
        x: f64,
        /// Target y in pixels.
        y: f64,
    },
    /// Clear any movement intent.
    Stop,
    /// Turn to face a heading without moving.
    Face {
        /// Heading in degrees (0 = east, counter-clockwise).
        degrees: f64,
    },
    /// Say something out loud.
    Speak {
        /// The words spoken.
        text: String,
        /// How loudly.
        #[serde(default)]
        volume: SpeechVolume,
        /// Addressee for directed speech.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<ResidentId>,
    },
    /// Eat the first edible item in inventory.
    Eat,
    /// Drink the first drinkable item in inventory.
    Drink,
    /// Consume a specific item kind from inventory.
    Consume {
        /// The item kind to consume.
        item: ItemKind,
    },
    /// Lie down and sleep.
    Sleep,
    /// Wake from sleep.
    Wake,
    /// Relieve the bladder (requires a toilet building).
    UseToilet,
    /// Enter a building through a nearby door.
    EnterBuilding {
        /// The building to enter.
        building: BuildingId,
    },
    /// Leave the current building through the door used to enter.
    ExitBuilding,
    /// Buy from the shop.
    Buy {
        /// What to buy.
        item: ItemKind,
        /// How many (clamped to 1..10 by validation).
        quantity: u32,
    },
    /// Collect universal basic income at the bank.
    CollectUbi,
    /// Look closely at another resident or body.
    Inspect {
        /// Who to inspect.
        target: ResidentId,
    },
    /// Offer an item stack to another resident for payment.
    Trade {
        /// The counterparty.
        target: ResidentId,
        /// Item offered.
        offer_item: ItemKind,
        /// Units offered.
        offer_quantity: u32,
        /// Asking price in whole currency units.
        ask_price: i64,
    },
    /// Hand an item stack to another resident for free.
    Give {
        /// The recipient.
        target: ResidentId,
        /// Item given.
        item: ItemKind,
        /// Units given.
        quantity: u32,
    },
    /// Apply for a job posting.
    ApplyJob {
        /// The posting to apply to.
        job: JobId,
    },
    /// Quit the current job.
    QuitJob,
    /// Author a petition at city hall.
    WritePetition {
        /// Free-form category.
        category: String,
        /// What the petition proposes.
        description: String,
    },
    /// Vote on an open petition at city hall.
    VotePetition {
        /// The petition voted on.
        petition: PetitionId,
        /// `true` for, `false` against.
        approve: bool,
    },
    /// Pick up a nearby body.
    CollectBody {
        /// The body's resident id.
        body: ResidentId,
    },
    /// Deliver a carried body at the mortuary for the bounty.
    ProcessBody,
    /// Leave the city permanently.
    Depart,
    /// List job postings and openings.
    ListJobs,
    /// List petitions and tallies.
    ListPetitions,
    /// Arrest a wanted resident (police only).
    Arrest {
        /// The suspect.
        target: ResidentId,
    },
    /// Book a carried suspect at the police station.
    BookSuspect,
    /// Harvest one use from a forageable node.
    Forage {
        /// The node to forage.
        node: ForageableId,
    },
    /// Submit free-form feedback about the run.
    SubmitFeedback {
        /// The feedback text.
        text: String,
    },
}

impl ClientCommand {
    /// Short stable name for logging and event payloads.
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Move { .. } => "move",
            Self::MoveTo { .. } => "move_to",
            Self::Stop => "stop",
            Self::Face { .. } => "face",
            Self::Speak { .. } => "speak",
            Self::Eat => "eat",
            Self::Drink => "drink",
            Self::Consume { .. } => "consume",
            Self::Sleep => "sleep",
            Self::Wake => "wake",
            Self::UseToilet => "use_toilet",
            Self::EnterBuilding { .. } => "enter_building",
            Self::ExitBuilding => "exit_building",
            Self::Buy { .. } => "buy",
            Self::CollectUbi => "collect_ubi",
            Self::Inspect { .. } => "inspect",
            Self::Trade { .. } => "trade",
            Self::Give { .. } => "give",
            Self::ApplyJob { .. } => "apply_job",
            Self::QuitJob => "quit_job",
            Self::WritePetition { .. } => "write_petition",
            Self::VotePetition { .. } => "vote_petition",
            Self::CollectBody { .. } => "collect_body",
            Self::ProcessBody => "process_body",
            Self::Depart => "depart",
            Self::ListJobs => "list_jobs",
            Self::ListPetitions => "list_petitions",
            Self::Arrest { .. } => "arrest",
            Self::BookSuspect => "book_suspect",
            Self::Forage { .. } => "forage",
            Self::SubmitFeedback { .. } => "submit_feedback",
        }
    }
}

/// Why a command was refused. Kinds, not free text; the dispatcher maps
/// each to a stable reason code on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionFailure {
    /// The frame was malformed or a parameter was out of range.
    ValidationFailed {
        /// Human-readable detail for the client.
        detail: String,
    },
    /// Not enough energy for the action's cost.
    InsufficientEnergy,
    /// Wallet balance too low.
    InsufficientWallet,
    /// The shop shelf is empty (or holds fewer than requested).
    OutOfStock,
    /// The action requires being inside a building.
    NotInBuilding,
    /// Inside a building, but not the right kind.
    WrongBuilding,
    /// The target is too far away.
    RangeExceeded,
    /// No walkable path reaches the target (including search-budget
    /// exhaustion).
    NoPath,
    /// The action is rate-limited.
    Cooldown {
        /// Game-seconds until the action becomes available.
        remaining: f64,
    },
    /// This resident already voted on that petition.
    AlreadyVoted,
    /// The job has no open positions.
    NoOpenings,
    /// The resident holds no job.
    NotEmployed,
    /// The resident (or the target) is dead.
    AlreadyDead,
    /// The referenced entity does not exist.
    NotFound,
    /// Arrest target has no active violations.
    NotWanted,
    /// Only police employees may do this.
    NotPolice,
    /// The resident is asleep and must wake first.
    Asleep,
    /// Cannot sleep with energy above the threshold.
    NotSleepy,
    /// No body or suspect is being carried.
    NothingCarried,
}

impl ActionFailure {
    /// The stable reason code sent on the wire.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed { .. } => "validation_failed",
            Self::InsufficientEnergy => "insufficient_energy",
            Self::InsufficientWallet => "insufficient_wallet",
            Self::OutOfStock => "out_of_stock",
            Self::NotInBuilding => "not_in_building",
            Self::WrongBuilding => "wrong_building",
            Self::RangeExceeded => "range_exceeded",
            Self::NoPath => "no_path",
            Self::Cooldown { .. } => "cooldown",
            Self::AlreadyVoted => "already_voted",
            Self::NoOpenings => "no_openings",
            Self::NotEmployed => "not_employed",
            Self::AlreadyDead => "already_dead",
            Self::NotFound => "not_found",
            Self::NotWanted => "not_wanted",
            Self::NotPolice => "not_police",
            Self::Asleep => "asleep",
            Self::NotSleepy => "not_sleepy",
            Self::NothingCarried => "nothing_carried",
        }
    }

    /// Structured detail attached to the `action_result`, when any.
    pub fn detail(&self) -> Option<Value> {
        match self {
            Self::ValidationFailed { detail } => {
                Some(Value::String(detail.clone()))
            }
            Self::Cooldown { remaining } => {
                serde_json::to_value(remaining).ok()
            }
            _ => None,
        }
    }
}

impl core::fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ValidationFailed { detail } => {
                write!(f, "validation failed: {detail}")
            }
            Self::Cooldown { remaining } => {
                write!(f, "on cooldown for {remaining:.0} more game-seconds")
            }
            other => f.write_str(other.code()),
        }
    }
}

/// Outcome status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// The command was applied.
    Ok,
    /// The command was refused; `reason` says why.
    Error,
}

/// The single reply emitted for every inbound command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResultMessage {
    /// Echo of the inbound `request_id`, when one was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Which command this answers.
    pub action: String,
    /// Ok or error.
    pub status: ActionStatus,
    /// Stable reason code on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Command-specific payload (listings, receipts, cooldown detail).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResultMessage {
    /// Build a success result.
    pub fn ok(request_id: Option<String>, action: &str, data: Option<Value>) -> Self {
        Self {
            request_id,
            action: action.to_owned(),
            status: ActionStatus::Ok,
            reason: None,
            data,
        }
    }

    /// Build an error result from a typed failure.
    pub fn error(request_id: Option<String>, action: &str, failure: &ActionFailure) -> Self {
        Self {
            request_id,
            action: action.to_owned(),
            status: ActionStatus::Error,
            reason: Some(failure.code().to_owned()),
            data: failure.detail(),
        }
    }
}

/// Report returned by the `inspect` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectReport {
    /// The inspected resident.
    pub resident: ResidentId,
    /// Passport number.
    pub passport: String,
    /// Preferred name.
    pub name: String,
    /// Declared origin.
    pub origin: String,
    /// Whether the target is a body.
    pub is_dead: bool,
    /// Whether the target is asleep.
    pub sleeping: bool,
    /// Whether the target has active violations.
    pub wanted: bool,
    /// Target x position.
    pub x: f64,
    /// Target y position.
    pub y: f64,
}

/// Every message the server may push, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after a successful auth.
    Welcome {
        /// The controlled resident.
        resident: ResidentId,
        /// Passport number.
        passport: String,
        /// Preferred name.
        name: String,
        /// Current game-time.
        world_time: f64,
        /// Whether the resident has already spawned (false = still queued
        /// for the next train).
        spawned: bool,
    },
    /// Periodic bounded view of the world.
    Perception(PerceptionUpdate),
    /// Reply to one command.
    ActionResult(ActionResultMessage),
    /// A narrative event concerning this resident.
    Event {
        /// Stable event kind string.
        kind: String,
        /// Game-time of the event.
        world_time: f64,
        /// Event-specific payload.
        data: Value,
    },
    /// A pain message from the body.
    Pain {
        /// Which need hurts.
        source: PainSource,
        /// How badly.
        intensity: PainIntensity,
        /// Narrative text.
        text: String,
    },
    /// This resident has died. Terminal for the session.
    Death {
        /// Cause of death.
        cause: String,
    },
    /// A resident stepped off the train onto the platform.
    Spawn {
        /// Who spawned.
        resident: ResidentId,
        /// Their name.
        name: String,
        /// Platform x.
        x: f64,
        /// Platform y.
        y: f64,
    },
    /// A train is about to arrive.
    TrainArriving {
        /// Game-seconds until arrival.
        arriving_in: f64,
        /// Passengers queued to disembark.
        passengers: u32,
    },
    /// Reply to the `inspect` command.
    InspectResult(InspectReport),
    /// Operator-facing broadcast (persistence stalls, shutdown notices).
    SystemAnnouncement {
        /// The announcement text.
        text: String,
    },
    /// Protocol-level error outside the `action_result` flow.
    Error {
        /// Stable reason code.
        reason: String,
    },
}

impl ServerMessage {
    /// Whether this message may be dropped under outbound backpressure.
    ///
    /// Only stale perception ticks are droppable; speech, events, pain,
    /// and action results always survive.
    pub const fn is_droppable(&self) -> bool {
        matches!(self, Self::Perception(_))
    }
}
