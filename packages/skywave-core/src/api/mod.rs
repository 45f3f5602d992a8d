//! HTTP API layer for the push fan-out.
//!
//! Thin handlers over the [`Broadcaster`](crate::fanout::Broadcaster); the
//! server binds loopback only and is fronted by a reverse proxy for
//! anything public.

pub mod http;

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

use crate::config::RadioConfig;
use crate::fanout::Broadcaster;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the loopback port.
    #[error("failed to bind push fan-out port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    /// Fan-out of snapshot broadcasts to SSE clients.
    pub broadcaster: Broadcaster,
    /// Station configuration (origin allow-list, snapshot path).
    pub config: Arc<RadioConfig>,
}

/// Starts the HTTP server on the configured loopback port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], state.config.push.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("[Server] push fan-out listening on http://{addr}");
    serve_on(listener, state).await
}

/// Serves the router on an already-bound listener (used by tests to get an
/// ephemeral port).
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    state: AppState,
) -> Result<(), ServerError> {
    let app = http::create_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}
