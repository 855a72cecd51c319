//! Axum WebSocket upgrade handler and accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use tower_http::trace::TraceLayer;

use super::connection::run_session;
use super::hooks::{HookThreads, TransportHooks};
use super::session::Session;

/// State shared by every upgrade request of one listener.
#[derive(Debug, Clone)]
pub struct TransportState {
    /// Hook receiver for all sessions.
    pub hooks: Arc<dyn TransportHooks>,
    /// Sessions without inbound frames for this long are closed.
    pub idle_timeout: Option<Duration>,
    /// Where hook calls run.
    pub hook_threads: HookThreads,
}

/// Upgrades a request on any path to a WebSocket session.
///
/// Requests that are not valid upgrades are rejected by the
/// [`WebSocketUpgrade`] extractor before a session exists.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<TransportState>,
) -> impl IntoResponse {
    let (session, outbound) = Session::new(peer);
    let session = Arc::new(session);
    tracing::debug!(session = %session.id(), peer = %peer, "upgrade accepted");

    let hooks = Arc::clone(&state.hooks);
    let idle_timeout = state.idle_timeout;
    let hook_threads = state.hook_threads;
    ws.on_failed_upgrade(move |err| {
        tracing::warn!(peer = %peer, error = %err, "websocket handshake failed");
    })
    .on_upgrade(move |socket| {
        run_session(socket, session, outbound, hooks, idle_timeout, hook_threads)
    })
}

/// Builds the router: every path accepts WebSocket upgrades.
pub fn build_router(state: TransportState) -> Router {
    Router::new()
        .fallback(ws_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the accept loop on `listener` until it fails.
///
/// Each accepted connection is served on its own task; all hooks of one
/// session run on that task, one at a time.
///
/// # Errors
///
/// Returns the I/O error that ended the accept loop.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: TransportState,
) -> std::io::Result<()> {
    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
