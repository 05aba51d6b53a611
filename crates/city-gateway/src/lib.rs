//! HTTP and `WebSocket` gateway for the City simulation server.
//!
//! One axum application carries three surfaces:
//!
//! - **Registration** (`POST /passport`): validates an applicant, admits
//!   the resident to the train queue, and returns a signed credential.
//! - **Sessions** (`GET /connect`): player sessions authenticate with
//!   the credential and exchange commands for perception; spectator
//!   sessions subscribe read-only to a resident's perception stream.
//! - **Read API**: map, public records, status, feed, buildings, and
//!   the leaderboard, all served from the engine's public snapshot.
//!
//! The gateway holds no world state and performs no game logic; every
//! write flows through the engine's command channel.

pub mod error;
pub mod handlers;
pub mod registration;
pub mod router;
pub mod server;
pub mod session;
pub mod state;
pub mod token;

pub use error::GatewayError;
pub use router::build_router;
pub use server::{spawn_server, start_server, ServerError};
pub use state::AppState;
pub use token::{Claims, TokenAuthority, TokenError};
