//! # wshooks
//!
//! Minimal WebSocket server that dispatches three connection events to
//! user callbacks: connect, data (text or binary frame) and disconnect.
//!
//! ## Architecture
//!
//! ```text
//! TCP accept + HTTP upgrade (ws/handler)
//!     │
//!     ├── per-session task (ws/connection)
//!     │       on_open → on_message* → on_close
//!     │
//!     ├── Dispatcher (server)          TransportHooks impl
//!     │
//!     └── user callbacks               receive a fresh Connection per event
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use wshooks::{ServerConfig, WebsocketServer};
//!
//! let server = WebsocketServer::new(
//!     |conn, _data, _frame| {
//!         conn.send_text("Hello from server!")?;
//!         Ok(())
//!     },
//!     |conn| {
//!         tracing::info!(peer = %conn.address(), "connected");
//!         Ok(())
//!     },
//!     |_conn| Ok(()),
//!     ServerConfig::new("0.0.0.0", 8080),
//! );
//! if let Err(err) = server.start() {
//!     eprintln!("server stopped: {err}");
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod server;
pub mod ws;

pub use config::ServerConfig;
pub use connection::{Connection, ConnectionInfo};
pub use error::{HookError, SendError, ServerError};
pub use server::{BoundServer, WebsocketServer};
pub use ws::{ConnectionState, FrameType, SessionId};
