//! Transport-side session: the native handle behind every connection.
//!
//! A [`Session`] is owned by its connection task. The dispatch core only
//! ever sees it through an `Arc` lent for the duration of a hook call.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::messages::{ConnectionState, Outbound};
use crate::error::SendError;

/// Unique identifier for a WebSocket session.
///
/// Wraps a UUID v4 assigned when the upgrade request is accepted.
/// Applications use it as the key of their own connection tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Creates a new random `SessionId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One established (or establishing) WebSocket session.
///
/// Outbound frames are queued on an unbounded channel drained by the
/// connection task, so every send operation is non-blocking and frames of
/// one session are written in FIFO order.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    connected_at: DateTime<Utc>,
    state: AtomicU8,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Session {
    /// Creates a session in the `Connecting` state together with the
    /// receiving end of its outbound queue.
    pub(crate) fn new(peer: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let session = Self {
            id: SessionId::new(),
            peer,
            connected_at: Utc::now(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            outbound,
        };
        (session, rx)
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the peer socket address.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Returns the peer IP address as a string.
    #[must_use]
    pub fn peer_address(&self) -> String {
        self.peer.ip().to_string()
    }

    /// Returns the peer port as a string.
    #[must_use]
    pub fn peer_port(&self) -> String {
        self.peer.port().to_string()
    }

    /// Returns the time the upgrade request was accepted.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Returns the current lifecycle state.
    ///
    /// Only a snapshot: another thread or the idle timer may move the
    /// state forward right after this returns.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Asks the connection task to send a close frame and end the session.
    ///
    /// Returns immediately. Only the first call on an open session queues
    /// the close; later calls, and calls on a session that is already
    /// closing or closed, do nothing.
    pub fn request_close(&self) {
        if self.transition(ConnectionState::Open, ConnectionState::Closing) {
            // The receiver is gone only if the task already exited.
            let _ = self.outbound.send(Outbound::Close);
        }
    }

    /// Queues a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::InvalidUtf8`] if `bytes` is not valid UTF-8
    /// and [`SendError::NotOpen`] if the session no longer accepts frames.
    /// axum text frames carry `Utf8Bytes`, so invalid bytes cannot be put
    /// on the wire as a text frame and are rejected here.
    pub fn send_text(&self, bytes: Vec<u8>) -> Result<(), SendError> {
        let text = String::from_utf8(bytes)?;
        self.enqueue(Message::Text(text.into()))
    }

    /// Queues a binary frame carrying `bytes` verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotOpen`] if the session no longer accepts
    /// frames.
    pub fn send_binary(&self, bytes: Vec<u8>) -> Result<(), SendError> {
        self.enqueue(Message::Binary(bytes.into()))
    }

    fn enqueue(&self, message: Message) -> Result<(), SendError> {
        if self.state() != ConnectionState::Open {
            return Err(SendError::NotOpen(self.id));
        }
        self.outbound
            .send(Outbound::Frame(message))
            .map_err(|_| SendError::NotOpen(self.id))
    }

    pub(crate) fn mark_open(&self) {
        self.transition(ConnectionState::Connecting, ConnectionState::Open);
    }

    pub(crate) fn mark_closing(&self) {
        self.transition(ConnectionState::Open, ConnectionState::Closing);
    }

    pub(crate) fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
