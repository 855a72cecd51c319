//! wshooks demo server entry point.
//!
//! Logs connects and disconnects, logs every message and answers each one
//! with a text frame. Keeps its own table of live connections, since the
//! server does not track them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::EnvFilter;

use wshooks::{ConnectionInfo, FrameType, ServerConfig, SessionId, WebsocketServer};

const REPLY: &str = "Hello from server!";

type Registry = Arc<Mutex<HashMap<SessionId, ConnectionInfo>>>;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("WS_LOG_JSON").is_ok_and(|v| v == "1" || v == "true") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = ServerConfig::from_env();
    tracing::info!(addr = %config.bind_addr(), "starting wshooks");

    let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
    let on_connect_registry = Arc::clone(&registry);
    let on_disconnect_registry = Arc::clone(&registry);

    let server = WebsocketServer::new(
        |conn, data, frame_type| {
            match frame_type {
                FrameType::Text => tracing::info!(
                    session = %conn.id(),
                    message = %String::from_utf8_lossy(&data),
                    "websocket message"
                ),
                FrameType::Binary => tracing::info!(
                    session = %conn.id(),
                    len = data.len(),
                    "websocket binary message"
                ),
            }
            conn.send_text(REPLY)?;
            Ok(())
        },
        move |conn| {
            tracing::info!("client {}:{} connected", conn.address(), conn.port());
            let live = {
                let mut table = on_connect_registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                table.insert(conn.id(), conn.info());
                table.len()
            };
            tracing::debug!(live, "connection registered");
            Ok(())
        },
        move |conn| {
            tracing::info!("client {}:{} disconnected", conn.address(), conn.port());
            on_disconnect_registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&conn.id());
            Ok(())
        },
        config,
    );

    match server.start() {
        Ok(never) => match never {},
        Err(err) => {
            tracing::error!(error = %err, "server stopped");
            Err(err.into())
        }
    }
}
