//! Hook interface the transport calls on session lifecycle events.

use std::fmt;
use std::sync::Arc;

use super::messages::FrameType;
use super::session::Session;
use crate::error::HookError;

/// Receiver of the three per-session lifecycle events.
///
/// The transport holds a single `Arc<dyn TransportHooks>` for the whole
/// accept loop and passes it the session handle on every call. For one
/// session the calls are strictly sequential: `on_open`, then any number of
/// `on_message`, then exactly one `on_close`. Calls for different sessions
/// may overlap on the multi-threaded runtime (see [`HookThreads`]).
///
/// The `Arc<Session>` and the byte slice are only lent for the duration of
/// the call.
pub trait TransportHooks: Send + Sync + fmt::Debug + 'static {
    /// Called once after the handshake completed.
    ///
    /// # Errors
    ///
    /// An error makes the transport close the session; `on_close` still
    /// fires.
    fn on_open(&self, session: &Arc<Session>) -> Result<(), HookError>;

    /// Called for every inbound text or binary frame.
    ///
    /// # Errors
    ///
    /// An error makes the transport close the session; `on_close` still
    /// fires.
    fn on_message(
        &self,
        session: &Arc<Session>,
        payload: &[u8],
        frame_type: FrameType,
    ) -> Result<(), HookError>;

    /// Called exactly once when the session has ended, whatever the cause.
    ///
    /// # Errors
    ///
    /// Errors are logged by the transport; the session is already gone.
    fn on_close(&self, session: &Arc<Session>) -> Result<(), HookError>;
}

/// Which thread a hook call runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookThreads {
    /// On the thread polling the session task. Used with the
    /// current-thread runtime, where that is the thread running the
    /// accept loop.
    Inline,
    /// On a thread the session holds for the duration of the call. The
    /// runtime moves its other tasks to a fresh worker first, so a slow
    /// hook never stalls other sessions or pending handshakes.
    ///
    /// Requires the multi-threaded runtime.
    Dedicated,
}

impl HookThreads {
    /// Runs one hook call under this policy.
    pub fn run<T>(self, call: impl FnOnce() -> T) -> T {
        match self {
            Self::Inline => call(),
            Self::Dedicated => tokio::task::block_in_place(call),
        }
    }
}
