//! WebSocket server: configuration, callbacks and hook translation.
//!
//! [`WebsocketServer`] owns the three user callbacks behind a
//! [`Dispatcher`], which is registered with the transport as its
//! [`TransportHooks`]. Each hook call wraps the lent session in a fresh
//! [`Connection`] and runs the matching callback synchronously on the
//! calling thread.
//!
//! # Callback failures
//!
//! A callback that returns `Err` or panics affects only its own
//! connection. The failure is logged, the transport closes the connection,
//! and the disconnect callback still runs exactly once. A failing
//! disconnect callback is logged and otherwise ignored.

use std::any::Any;
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{HookError, ServerError};
use crate::ws::handler::{TransportState, serve};
use crate::ws::{FrameType, HookThreads, Session, TransportHooks};

/// Callback for inbound data frames. Receives an owned copy of the payload.
pub type DataCallback =
    dyn Fn(&Connection, Vec<u8>, FrameType) -> anyhow::Result<()> + Send + Sync;

/// Callback for connect and disconnect events.
pub type LifecycleCallback = dyn Fn(&Connection) -> anyhow::Result<()> + Send + Sync;

/// Translates transport hooks into user callbacks.
pub struct Dispatcher {
    on_data: Box<DataCallback>,
    on_connect: Box<LifecycleCallback>,
    on_disconnect: Box<LifecycleCallback>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl TransportHooks for Dispatcher {
    fn on_open(&self, session: &Arc<Session>) -> Result<(), HookError> {
        let conn = Connection::new(session);
        invoke("on_connect", || (self.on_connect)(&conn))
    }

    fn on_message(
        &self,
        session: &Arc<Session>,
        payload: &[u8],
        frame_type: FrameType,
    ) -> Result<(), HookError> {
        // The transport reuses its read buffer once this returns.
        let owned = payload.to_vec();
        let conn = Connection::new(session);
        invoke("on_data", || (self.on_data)(&conn, owned, frame_type))
    }

    fn on_close(&self, session: &Arc<Session>) -> Result<(), HookError> {
        let conn = Connection::new(session);
        invoke("on_disconnect", || (self.on_disconnect)(&conn))
    }
}

/// Runs one callback, turning an error or a panic into a [`HookError`].
fn invoke<F>(hook: &'static str, callback: F) -> Result<(), HookError>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(HookError::Failed { hook, source }),
        Err(payload) => Err(HookError::Panicked {
            hook,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A WebSocket server that dispatches connect, data and disconnect events
/// to user callbacks.
///
/// Construction only stores the configuration and the callbacks; no socket
/// is opened until [`WebsocketServer::bind`] or [`WebsocketServer::start`].
///
/// # Threading
///
/// With `worker_threads == 0` every callback of every connection runs on
/// the thread that called `start`, one at a time. With `N > 0` each
/// connection's callbacks run on a thread of their own while `N` workers
/// keep accepting and serving the other connections, so a slow callback
/// stalls only its own connection. Callbacks for one connection never
/// overlap. The server takes no locks, so callbacks sharing state across
/// connections must synchronize it.
#[derive(Debug)]
pub struct WebsocketServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
}

impl WebsocketServer {
    /// Creates a server from its three callbacks and configuration.
    pub fn new<D, C, X>(on_data: D, on_connect: C, on_disconnect: X, config: ServerConfig) -> Self
    where
        D: Fn(&Connection, Vec<u8>, FrameType) -> anyhow::Result<()> + Send + Sync + 'static,
        C: Fn(&Connection) -> anyhow::Result<()> + Send + Sync + 'static,
        X: Fn(&Connection) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let dispatcher = Dispatcher {
            on_data: Box::new(on_data),
            on_connect: Box::new(on_connect),
            on_disconnect: Box::new(on_disconnect),
        };
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Returns the configuration the server was built with.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the listener without starting the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if `host:port` cannot be resolved or
    /// bound, and [`ServerError::Listener`] if the socket cannot be
    /// switched to non-blocking mode.
    pub fn bind(self) -> Result<BoundServer, ServerError> {
        let addr = self.config.bind_addr();
        let listener = std::net::TcpListener::bind((self.config.host.as_str(), self.config.port))
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        listener
            .set_nonblocking(true)
            .map_err(ServerError::Listener)?;
        let local_addr = listener.local_addr().map_err(ServerError::Listener)?;
        tracing::info!(addr = %addr, local_addr = %local_addr, "listener bound");

        Ok(BoundServer {
            config: self.config,
            dispatcher: self.dispatcher,
            listener,
            local_addr,
        })
    }

    /// Binds and runs the accept loop on the calling thread.
    ///
    /// Blocks for the lifetime of the server. There is no shutdown API;
    /// individual connections are stopped with [`Connection::close`].
    ///
    /// # Errors
    ///
    /// Never returns `Ok`. Returns the [`ServerError`] that prevented the
    /// server from starting or ended its accept loop.
    pub fn start(self) -> Result<Infallible, ServerError> {
        self.bind()?.run()
    }
}

/// A server whose listener is bound but whose accept loop is not running.
#[derive(Debug)]
pub struct BoundServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
}

impl BoundServer {
    /// Returns the address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop on the calling thread.
    ///
    /// # Errors
    ///
    /// Never returns `Ok`. Returns [`ServerError::Runtime`] if the runtime
    /// cannot be built, or the error that ended the accept loop.
    pub fn run(self) -> Result<Infallible, ServerError> {
        let runtime = build_runtime(self.config.worker_threads).map_err(ServerError::Runtime)?;
        let hooks: Arc<dyn TransportHooks> = self.dispatcher;
        let state = TransportState {
            hooks,
            idle_timeout: self.config.idle_timeout(),
            hook_threads: hook_threads(self.config.worker_threads),
        };
        tracing::info!(
            addr = %self.local_addr,
            worker_threads = self.config.worker_threads,
            idle_timeout_ms = self.config.idle_timeout_ms,
            "websocket server running"
        );

        let std_listener = self.listener;
        runtime.block_on(async move {
            let listener =
                tokio::net::TcpListener::from_std(std_listener).map_err(ServerError::Listener)?;
            serve(listener, state).await.map_err(ServerError::Serve)?;
            Err(ServerError::LoopExited)
        })
    }
}

/// Picks where hook calls run for the configured threading mode.
const fn hook_threads(worker_threads: usize) -> HookThreads {
    if worker_threads == 0 {
        HookThreads::Inline
    } else {
        HookThreads::Dedicated
    }
}

/// Builds the runtime for the configured threading mode.
///
/// `0` yields a current-thread runtime driven by the caller of
/// `block_on`, so every task runs on that one thread.
fn build_runtime(worker_threads: usize) -> std::io::Result<tokio::runtime::Runtime> {
    if worker_threads == 0 {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
    } else {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("wshooks-worker")
            .enable_all()
            .build()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::ws::ConnectionState;
    use crate::ws::session::tests::open_session;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Connect,
        Data(Vec<u8>, FrameType),
        Disconnect,
    }

    fn recording_dispatcher() -> (Arc<Dispatcher>, Arc<Mutex<Vec<Event>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (data_log, connect_log, disconnect_log) =
            (Arc::clone(&log), Arc::clone(&log), Arc::clone(&log));
        let server = WebsocketServer::new(
            move |_conn, payload, frame_type| {
                if let Ok(mut log) = data_log.lock() {
                    log.push(Event::Data(payload, frame_type));
                }
                Ok(())
            },
            move |_conn| {
                if let Ok(mut log) = connect_log.lock() {
                    log.push(Event::Connect);
                }
                Ok(())
            },
            move |_conn| {
                if let Ok(mut log) = disconnect_log.lock() {
                    log.push(Event::Disconnect);
                }
                Ok(())
            },
            ServerConfig::default(),
        );
        (server.dispatcher, log)
    }

    fn events(log: &Mutex<Vec<Event>>) -> Vec<Event> {
        log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    #[test]
    fn forwards_each_hook_exactly_once_in_order() {
        let (dispatcher, log) = recording_dispatcher();
        let (session, _rx) = open_session();
        let session = Arc::new(session);

        assert!(dispatcher.on_open(&session).is_ok());
        assert!(dispatcher.on_message(&session, b"hi", FrameType::Text).is_ok());
        assert!(
            dispatcher
                .on_message(&session, &[0x00, 0xFF, 0x10], FrameType::Binary)
                .is_ok()
        );
        assert!(dispatcher.on_close(&session).is_ok());

        assert_eq!(
            events(&log),
            vec![
                Event::Connect,
                Event::Data(b"hi".to_vec(), FrameType::Text),
                Event::Data(vec![0x00, 0xFF, 0x10], FrameType::Binary),
                Event::Disconnect,
            ]
        );
    }

    #[test]
    fn payload_is_an_owned_copy() {
        let (dispatcher, log) = recording_dispatcher();
        let (session, _rx) = open_session();
        let session = Arc::new(session);

        let mut buffer = vec![1_u8, 2, 3];
        assert!(dispatcher.on_message(&session, &buffer, FrameType::Binary).is_ok());
        buffer.fill(0);

        assert_eq!(
            events(&log),
            vec![Event::Data(vec![1, 2, 3], FrameType::Binary)]
        );
    }

    #[test]
    fn callback_error_becomes_hook_error() {
        let server = WebsocketServer::new(
            |_conn, _payload, _frame| Err(anyhow::anyhow!("bad payload")),
            |_conn| Ok(()),
            |_conn| Ok(()),
            ServerConfig::default(),
        );
        let (session, _rx) = open_session();
        let result = server
            .dispatcher
            .on_message(&Arc::new(session), b"x", FrameType::Text);
        let Err(HookError::Failed { hook, source }) = result else {
            panic!("expected a failed hook");
        };
        assert_eq!(hook, "on_data");
        assert_eq!(source.to_string(), "bad payload");
    }

    #[test]
    fn callback_panic_is_contained() {
        let server = WebsocketServer::new(
            |_conn, _payload, _frame| Ok(()),
            |_conn| panic!("connect exploded"),
            |_conn| Ok(()),
            ServerConfig::default(),
        );
        let (session, _rx) = open_session();
        let result = server.dispatcher.on_open(&Arc::new(session));
        let Err(HookError::Panicked { hook, message }) = result else {
            panic!("expected a panicked hook");
        };
        assert_eq!(hook, "on_connect");
        assert_eq!(message, "connect exploded");
    }

    #[test]
    fn close_from_disconnect_callback_is_harmless() {
        let server = WebsocketServer::new(
            |_conn, _payload, _frame| Ok(()),
            |_conn| Ok(()),
            |conn| {
                conn.close();
                conn.close();
                Ok(())
            },
            ServerConfig::default(),
        );
        let (session, _rx) = open_session();
        let session = Arc::new(session);
        session.mark_closed();
        assert!(server.dispatcher.on_close(&session).is_ok());
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[test]
    fn construction_does_not_bind() {
        let config = ServerConfig::new("127.0.0.1", 0);
        let server = WebsocketServer::new(
            |_conn, _payload, _frame| Ok(()),
            |_conn| Ok(()),
            |_conn| Ok(()),
            config.clone(),
        );
        assert_eq!(server.config(), &config);
    }

    #[test]
    fn bind_reports_os_assigned_port() {
        let server = WebsocketServer::new(
            |_conn, _payload, _frame| Ok(()),
            |_conn| Ok(()),
            |_conn| Ok(()),
            ServerConfig::new("127.0.0.1", 0),
        );
        let Ok(bound) = server.bind() else {
            panic!("loopback bind failed");
        };
        assert_ne!(bound.local_addr().port(), 0);
    }

    #[test]
    fn unresolvable_host_is_a_bind_error() {
        let server = WebsocketServer::new(
            |_conn, _payload, _frame| Ok(()),
            |_conn| Ok(()),
            |_conn| Ok(()),
            ServerConfig::new("256.256.256.256", 8080),
        );
        assert!(matches!(server.start(), Err(ServerError::Bind { .. })));
    }

    #[test]
    fn worker_count_selects_hook_threads() {
        assert_eq!(hook_threads(0), HookThreads::Inline);
        assert_eq!(hook_threads(1), HookThreads::Dedicated);
        assert_eq!(hook_threads(8), HookThreads::Dedicated);
    }

    #[test]
    fn panic_payload_falls_back_for_non_strings() {
        let payload: Box<dyn Any + Send> = Box::new(17_u32);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
