//! Error types for the server, the transport hooks and session sends.
//!
//! [`ServerError`] is fatal and ends [`crate::WebsocketServer::start`].
//! [`HookError`] and [`SendError`] are scoped to a single connection.

use std::string::FromUtf8Error;

use crate::ws::SessionId;

/// Failure that stops the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be bound to the configured host and port.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// `host:port` as configured.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The bound listener could not be prepared for the runtime.
    #[error("listener setup failed: {0}")]
    Listener(#[source] std::io::Error),

    /// The async runtime could not be built.
    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The accept loop failed.
    #[error("accept loop failed: {0}")]
    Serve(#[source] std::io::Error),

    /// The accept loop returned without an error.
    #[error("accept loop exited")]
    LoopExited,
}

/// Failure of a user callback, isolated to the connection it ran for.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The callback returned an error.
    #[error("{hook} callback failed: {source:#}")]
    Failed {
        /// Which lifecycle callback failed.
        hook: &'static str,
        /// Error returned by the callback.
        #[source]
        source: anyhow::Error,
    },

    /// The callback panicked.
    #[error("{hook} callback panicked: {message}")]
    Panicked {
        /// Which lifecycle callback panicked.
        hook: &'static str,
        /// Panic payload, when it was a string.
        message: String,
    },
}

/// Failure to queue an outbound frame.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The session is closing or closed and accepts no more frames.
    #[error("session {0} is not open")]
    NotOpen(SessionId),

    /// A text frame payload was not valid UTF-8.
    #[error("text frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}
