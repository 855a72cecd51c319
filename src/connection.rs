//! Connection handle passed to user callbacks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SendError;
use crate::ws::{ConnectionState, Session, SessionId};

/// Thin reference to one WebSocket session.
///
/// A fresh handle is built for every callback invocation and cloning it
/// only bumps a reference count. The transport owns the session; once the
/// disconnect callback has run, sends on a retained handle fail with
/// [`SendError::NotOpen`] and [`Connection::close`] does nothing. Store
/// [`Connection::id`] rather than the handle to address a connection later.
#[derive(Debug, Clone)]
pub struct Connection {
    session: Arc<Session>,
}

/// Serializable snapshot of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Session identifier.
    pub id: SessionId,
    /// Peer IP address.
    pub address: String,
    /// Peer port.
    pub port: String,
    /// State at the time of the snapshot.
    pub state: ConnectionState,
    /// When the upgrade request was accepted.
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    pub(crate) fn new(session: &Arc<Session>) -> Self {
        Self {
            session: Arc::clone(session),
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    /// Returns the peer IP address.
    #[must_use]
    pub fn address(&self) -> String {
        self.session.peer_address()
    }

    /// Returns the peer port.
    #[must_use]
    pub fn port(&self) -> String {
        self.session.peer_port()
    }

    /// Returns the lifecycle state at the time of the call.
    ///
    /// The state can change right after this returns: a close from another
    /// thread or the idle timer may be in progress.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Requests the transport to close this connection.
    ///
    /// Asynchronous: the disconnect callback fires later, from the
    /// connection's own task. Calling it more than once is harmless.
    pub fn close(&self) {
        self.session.request_close();
    }

    /// Queues a text frame.
    ///
    /// The bytes must be UTF-8: the transport only builds text frames from
    /// validated strings (axum's `Utf8Bytes`). Use [`Connection::send_bin`]
    /// for arbitrary bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::InvalidUtf8`] if `bytes` is not UTF-8, or
    /// [`SendError::NotOpen`] if the connection is closing or closed.
    pub fn send_text(&self, bytes: impl Into<Vec<u8>>) -> Result<(), SendError> {
        self.session.send_text(bytes.into())
    }

    /// Queues a binary frame with `bytes` verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotOpen`] if the connection is closing or
    /// closed.
    pub fn send_bin(&self, bytes: impl Into<Vec<u8>>) -> Result<(), SendError> {
        self.session.send_binary(bytes.into())
    }

    /// Returns a serializable snapshot of this connection.
    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id(),
            address: self.address(),
            port: self.port(),
            state: self.state(),
            connected_at: self.session.connected_at(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::ws::session::tests::open_session;

    #[test]
    fn handle_reports_peer_identity() {
        let (session, _rx) = open_session();
        let conn = Connection::new(&Arc::new(session));
        assert_eq!(conn.address(), "127.0.0.1");
        assert_eq!(conn.port(), "40000");
        assert_eq!(conn.state(), ConnectionState::Open);
    }

    #[test]
    fn clones_share_the_session() {
        let (session, _rx) = open_session();
        let conn = Connection::new(&Arc::new(session));
        let copy = conn.clone();
        copy.close();
        assert_eq!(conn.id(), copy.id());
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn double_close_does_not_fault() {
        let (session, _rx) = open_session();
        let conn = Connection::new(&Arc::new(session));
        conn.close();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn send_helpers_accept_str_and_slices() {
        let (session, _rx) = open_session();
        let conn = Connection::new(&Arc::new(session));
        assert!(conn.send_text("Hello from server!").is_ok());
        assert!(conn.send_bin(&[0x00_u8, 0xFF, 0x10][..]).is_ok());
    }

    #[test]
    fn non_utf8_text_is_refused_but_sendable_as_binary() {
        let (session, _rx) = open_session();
        let conn = Connection::new(&Arc::new(session));
        let bytes = vec![0xC3_u8, 0x28];
        assert!(matches!(
            conn.send_text(bytes.clone()),
            Err(SendError::InvalidUtf8(_))
        ));
        assert!(conn.send_bin(bytes).is_ok());
        assert_eq!(conn.state(), ConnectionState::Open);
    }

    #[test]
    fn info_serializes_to_json() {
        let (session, _rx) = open_session();
        let conn = Connection::new(&Arc::new(session));
        let Ok(json) = serde_json::to_value(conn.info()) else {
            panic!("serialization failed");
        };
        assert_eq!(json["address"], "127.0.0.1");
        assert_eq!(json["port"], "40000");
        assert_eq!(json["state"], "open");
        assert_eq!(json["id"], conn.id().to_string());
    }
}
