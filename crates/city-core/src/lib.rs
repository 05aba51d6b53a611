//! World clock, tick scheduling, and orchestration for the City server.
//!
//! This crate is the single-writer core: the [`engine::Engine`] owns
//! world state and runs the three fixed-rate loops (position, simulation,
//! perception). Sessions and persistence live on other tasks and talk to
//! the engine over bounded channels only.
//!
//! # Modules
//!
//! - [`clock`] -- game-time at `TIME_SCALE` times real time
//! - [`config`] -- typed YAML configuration with the numeric contract
//! - [`state`] -- the in-memory world snapshot and its public projection
//! - [`scheduler`] -- fixed-rate accumulators and stall detection
//! - [`perception`] -- the bounded per-resident view builder
//! - [`dispatcher`] -- inbound command validation and application
//! - [`detector`] -- need-edge events and the pain channel
//! - [`outbox`] -- per-session outbound queues with drop policy
//! - [`engine`] -- the tick loop that ties it all together

pub mod clock;
pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod engine;
pub mod outbox;
pub mod perception;
pub mod scheduler;
pub mod state;

pub use clock::{WorldClock, GAME_DAY_SECONDS};
pub use config::{CityConfig, ConfigError, GatewayConfig};
pub use detector::{DetectedSignal, EventDetector};
pub use dispatcher::{dispatch, DispatchOutcome};
pub use engine::{Engine, EngineCommand, EngineError, EngineHandle};
pub use outbox::{PushOutcome, SessionOutbox};
pub use perception::{build_perception, is_visible};
pub use scheduler::{SchedulerError, StallDetector, TickSchedule, MAX_FRAME_DELTA};
pub use state::{BuildingInfo, LeaderboardEntry, PublicSnapshot, WorldState};
