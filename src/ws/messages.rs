//! Frame and lifecycle types shared between the transport and the core.

use std::fmt;

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

/// Discriminator for inbound and outbound data frames.
///
/// Passed unchanged from the transport to the data callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    /// UTF-8 text frame.
    Text,
    /// Opaque binary frame.
    Binary,
}

impl FrameType {
    /// Returns the RFC 6455 opcode for this frame type.
    #[must_use]
    pub const fn opcode(self) -> u8 {
        match self {
            Self::Text => 0x1,
            Self::Binary => 0x2,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

/// Lifecycle state of a session.
///
/// Moves strictly forward: `Connecting` → `Open` → `Closing` → `Closed`
/// (`Closing` may be skipped when the peer drops the socket).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    /// Handshake accepted, socket not yet handed to the session task.
    Connecting = 0,
    /// Frames may be sent and received.
    Open = 1,
    /// A close was requested; no new frames are accepted for sending.
    Closing = 2,
    /// The session has ended and the disconnect hook has fired or is firing.
    Closed = 3,
}

impl ConnectionState {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Commands queued by a session handle for its connection task.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// Write this frame to the socket.
    Frame(Message),
    /// Send a close frame and end the session.
    Close,
}
