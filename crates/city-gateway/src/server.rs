//! Gateway HTTP server lifecycle management.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Errors that can occur when starting or running the gateway server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// Start the gateway server on the given port.
///
/// Binds to all interfaces, builds the router, and serves requests
/// until the process is terminated.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the TCP listener cannot bind, or
/// [`ServerError::Serve`] on a fatal I/O error while serving.
pub async fn start_server(port: u16, state: Arc<AppState>) -> Result<(), ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let router = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, "gateway listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    Ok(())
}

/// Spawn the gateway server as a background task.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the listener cannot bind before the
/// task is spawned.
pub async fn spawn_server(
    port: u16,
    state: Arc<AppState>,
) -> Result<tokio::task::JoinHandle<()>, ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;
    let router = build_router(state);

    info!(%addr, "gateway listening");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "gateway server stopped");
        }
    }))
}
