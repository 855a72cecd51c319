//! Per-session read/write loop.
//!
//! Drives one upgraded socket: forwards inbound data frames to the hooks,
//! writes frames queued by session handles, and enforces the idle timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::hooks::{HookThreads, TransportHooks};
use super::messages::{FrameType, Outbound};
use super::session::Session;
use crate::error::HookError;

/// Stand-in deadline for sessions without an idle timeout.
const NO_DEADLINE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// Peer sent a close frame or dropped the socket.
    Peer,
    /// A session handle requested the close.
    Requested,
    /// No inbound frame within the idle timeout.
    Idle,
    /// A hook returned an error or panicked.
    HookFailed,
    /// Reading or writing the socket failed.
    Transport,
}

impl CloseReason {
    /// Whether the server still owes the peer a close frame.
    const fn needs_close_frame(self) -> bool {
        matches!(self, Self::Idle | Self::HookFailed)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Peer => "peer",
            Self::Requested => "requested",
            Self::Idle => "idle_timeout",
            Self::HookFailed => "hook_failed",
            Self::Transport => "transport_error",
        };
        f.write_str(s)
    }
}

/// Runs a session from handshake completion to its single close hook.
pub(crate) async fn run_session(
    socket: WebSocket,
    session: Arc<Session>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    hooks: Arc<dyn TransportHooks>,
    idle_timeout: Option<Duration>,
    hook_threads: HookThreads,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    session.mark_open();
    tracing::info!(session = %session.id(), peer = %session.peer(), "session opened");

    let reason = match hook_threads.run(|| hooks.on_open(&session)) {
        Ok(()) => {
            pump(
                &mut ws_tx,
                &mut ws_rx,
                &session,
                &mut outbound,
                hooks.as_ref(),
                idle_timeout,
                hook_threads,
            )
            .await
        }
        Err(err) => {
            tracing::error!(session = %session.id(), error = %err, "open hook failed");
            CloseReason::HookFailed
        }
    };

    session.mark_closing();
    if reason.needs_close_frame() && ws_tx.send(Message::Close(None)).await.is_err() {
        tracing::debug!(session = %session.id(), "close frame not delivered");
    }
    // Flushes a close reply tungstenite may have queued for the peer.
    let _ = ws_tx.close().await;

    session.mark_closed();
    tracing::info!(session = %session.id(), reason = %reason, "session closed");

    if let Err(err) = hook_threads.run(|| hooks.on_close(&session)) {
        tracing::error!(session = %session.id(), error = %err, "close hook failed");
    }
}

/// Multiplexes inbound frames, queued outbound commands and the idle timer
/// until the session ends.
async fn pump(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    ws_rx: &mut SplitStream<WebSocket>,
    session: &Arc<Session>,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    hooks: &dyn TransportHooks,
    idle_timeout: Option<Duration>,
    hook_threads: HookThreads,
) -> CloseReason {
    let idle = tokio::time::sleep(idle_timeout.unwrap_or(NO_DEADLINE));
    tokio::pin!(idle);

    loop {
        tokio::select! {
            // Frame from the peer
            frame = ws_rx.next() => {
                let delivered = match frame {
                    Some(Ok(Message::Text(text))) => hook_threads.run(|| {
                        deliver(hooks, session, text.as_str().as_bytes(), FrameType::Text)
                    }),
                    Some(Ok(Message::Binary(bytes))) => hook_threads.run(|| {
                        deliver(hooks, session, &bytes, FrameType::Binary)
                    }),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(()),
                    Some(Ok(Message::Close(_))) | None => return CloseReason::Peer,
                    Some(Err(err)) => {
                        tracing::warn!(session = %session.id(), error = %err, "socket read failed");
                        return CloseReason::Transport;
                    }
                };
                if let Err(err) = delivered {
                    tracing::error!(session = %session.id(), error = %err, "message hook failed");
                    return CloseReason::HookFailed;
                }
                if let Some(timeout) = idle_timeout {
                    idle.as_mut().reset(Instant::now() + timeout);
                }
            }
            // Command from a session handle
            command = outbound.recv() => {
                match command {
                    Some(Outbound::Frame(message)) => {
                        if let Err(err) = ws_tx.send(message).await {
                            tracing::warn!(session = %session.id(), error = %err, "socket write failed");
                            return CloseReason::Transport;
                        }
                    }
                    Some(Outbound::Close) => {
                        if ws_tx.send(Message::Close(None)).await.is_err() {
                            return CloseReason::Transport;
                        }
                        return CloseReason::Requested;
                    }
                    // The session keeps a sender alive, so this is unreachable
                    // while `session` is borrowed.
                    None => return CloseReason::Requested,
                }
            }
            () = &mut idle, if idle_timeout.is_some() => {
                tracing::debug!(session = %session.id(), "idle timeout elapsed");
                return CloseReason::Idle;
            }
        }
    }
}

fn deliver(
    hooks: &dyn TransportHooks,
    session: &Arc<Session>,
    payload: &[u8],
    frame_type: FrameType,
) -> Result<(), HookError> {
    tracing::debug!(
        session = %session.id(),
        frame = %frame_type,
        opcode = frame_type.opcode(),
        len = payload.len(),
        "frame received"
    );
    hooks.on_message(session, payload, frame_type)
}
