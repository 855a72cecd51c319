//! WebSocket transport: handshake, framing, per-session tasks.
//!
//! The dispatch core never touches sockets. It implements
//! [`TransportHooks`] and receives lent [`Session`] handles from the
//! per-session task started by [`handler::ws_handler`].

pub mod connection;
pub mod handler;
pub mod hooks;
pub mod messages;
pub mod session;

pub use hooks::{HookThreads, TransportHooks};
pub use messages::{ConnectionState, FrameType};
pub use session::{Session, SessionId};
