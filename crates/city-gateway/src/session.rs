//! `WebSocket` sessions: players and spectators.
//!
//! Both kinds share one framing (JSON text frames) and one socket loop:
//! a writer half drains the session's [`SessionOutbox`] and a reader half
//! parses inbound frames. Players present a credential in the query
//! string and may send commands; spectators name a resident and receive
//! the perception stream only -- any command from a spectator is answered
//! with a validation error and never applied.
//!
//! Close codes: `4003` bad credential, `1000` clean shutdown.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use city_core::{EngineCommand, SessionOutbox};
use city_types::{CommandEnvelope, ResidentId, ServerMessage, SessionId};
use futures::{SinkExt as _, StreamExt as _};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Close code for a bad or expired credential.
pub const CLOSE_BAD_CREDENTIAL: u16 = 4003;

/// Close code for a clean shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Query parameters accepted by `GET /connect`.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Player credential from registration.
    pub token: Option<String>,
    /// Resident id to spectate.
    pub spectate: Option<Uuid>,
}

/// The session kind resolved from the query string.
enum SessionKind {
    Player(ResidentId),
    Spectator(ResidentId),
}

/// Handle `GET /connect`, upgrading to a `WebSocket` session.
pub async fn connect(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    // Resolve the session kind before upgrading; a bad credential still
    // upgrades so the 4003 close code can be delivered in-protocol.
    let kind = match (&params.token, params.spectate) {
        (Some(token), _) => match state.tokens.verify(token) {
            Ok(claims) => Ok(SessionKind::Player(claims.resident_id)),
            Err(err) => {
                warn!(%err, "credential rejected");
                Err(())
            }
        },
        (None, Some(resident)) => Ok(SessionKind::Spectator(ResidentId::from(resident))),
        (None, None) => Err(()),
    };

    ws.on_upgrade(move |socket| async move {
        match kind {
            Ok(kind) => run_session(socket, state, kind).await,
            Err(()) => close_with(socket, CLOSE_BAD_CREDENTIAL, "bad credential").await,
        }
    })
}

/// Send a close frame and drop the socket.
async fn close_with(mut socket: WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_owned().into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Run one session to completion.
async fn run_session(socket: WebSocket, state: Arc<AppState>, kind: SessionKind) {
    let session = SessionId::new();
    let outbox = Arc::new(SessionOutbox::new(state.session_config.outbox_capacity));

    let (attached, resident, is_player) = match kind {
        SessionKind::Player(resident) => (
            state
                .engine
                .send(EngineCommand::AttachPlayer {
                    session,
                    resident,
                    outbox: Arc::clone(&outbox),
                })
                .await,
            resident,
            true,
        ),
        SessionKind::Spectator(resident) => (
            state
                .engine
                .send(EngineCommand::AttachSpectator {
                    session,
                    resident,
                    outbox: Arc::clone(&outbox),
                })
                .await,
            resident,
            false,
        ),
    };
    if !attached {
        close_with(socket, CLOSE_NORMAL, "server shutting down").await;
        return;
    }

    debug!(%session, %resident, is_player, "session connected");

    let (mut sink, mut stream) = socket.split();

    // Writer half: drain the outbox into the socket.
    let writer_outbox = Arc::clone(&outbox);
    let mut writer = tokio::spawn(async move {
        while let Some(message) = writer_outbox.pop().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(err) => {
                    warn!(%err, "failed to serialize outbound message");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
        // Outbox closed by the engine: say goodbye cleanly.
        let frame = CloseFrame {
            code: CLOSE_NORMAL,
            reason: "goodbye".into(),
        };
        let _ = sink.send(Message::Close(Some(frame))).await;
    });

    // Reader half: parse frames until the socket closes.
    loop {
        tokio::select! {
            _ = &mut writer => break,
            frame = stream.next() => {
                let Some(Ok(frame)) = frame else { break };
                match frame {
                    Message::Text(text) => {
                        if is_player {
                            handle_player_frame(&state, session, resident, text.as_str(), &outbox)
                                .await;
                        } else {
                            // Spectators are read-only.
                            let _ = outbox.push(ServerMessage::Error {
                                reason: String::from("validation_failed"),
                            });
                        }
                    }
                    Message::Close(_) => break,
                    // Axum answers pings automatically; ignore the rest.
                    _ => {}
                }
            }
        }
    }

    let _ = state
        .engine
        .send(EngineCommand::Detach { session })
        .await;
    outbox.close();
    writer.abort();
    debug!(%session, "session closed");
}

/// Decode and forward one player frame.
async fn handle_player_frame(
    state: &Arc<AppState>,
    session: SessionId,
    resident: ResidentId,
    text: &str,
    outbox: &Arc<SessionOutbox>,
) {
    match serde_json::from_str::<CommandEnvelope>(text) {
        Ok(envelope) => {
            let sent = state
                .engine
                .send(EngineCommand::Command {
                    session,
                    resident,
                    envelope,
                })
                .await;
            if !sent {
                let _ = outbox.push(ServerMessage::Error {
                    reason: String::from("engine_unavailable"),
                });
            }
        }
        Err(err) => {
            debug!(%err, "unparseable frame");
            let _ = outbox.push(ServerMessage::Error {
                reason: String::from("validation_failed"),
            });
        }
    }
}
