//! Server configuration loaded from environment variables.
//!
//! All values are passed through to the transport unchanged. Nothing is
//! validated beyond parsing: an unusable host or port surfaces as a
//! [`crate::error::ServerError::Bind`] when the server starts.

use std::time::Duration;

/// Default bind host (all interfaces).
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default idle timeout in milliseconds.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 1000;

/// Listener and threading configuration.
///
/// Built once and handed to [`crate::WebsocketServer::new`]; the server
/// never changes it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host name or IP address to bind to.
    pub host: String,

    /// TCP port to listen on. `0` asks the OS for a free port.
    pub port: u16,

    /// `0` runs every connection on the thread that calls
    /// [`crate::WebsocketServer::start`]. `N > 0` gives each connection's
    /// callbacks a thread of their own, with `N` runtime workers driving
    /// accepts and socket I/O.
    pub worker_threads: usize,

    /// Milliseconds without an inbound frame before a connection is
    /// closed. `0` disables the timeout.
    pub idle_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            worker_threads: 0,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration for `host:port` with default threading and
    /// idle timeout.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// | Variable             | Field             | Default   |
    /// |----------------------|-------------------|-----------|
    /// | `WS_HOST`            | `host`            | `0.0.0.0` |
    /// | `WS_PORT`            | `port`            | `8080`    |
    /// | `WS_WORKER_THREADS`  | `worker_threads`  | `0`       |
    /// | `WS_IDLE_TIMEOUT_MS` | `idle_timeout_ms` | `1000`    |
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    /// Missing or unparsable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = std::env::var("WS_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());

        Self {
            host,
            port: parse_env("WS_PORT", DEFAULT_PORT),
            worker_threads: parse_env("WS_WORKER_THREADS", 0),
            idle_timeout_ms: parse_env("WS_IDLE_TIMEOUT_MS", DEFAULT_IDLE_TIMEOUT_MS),
        }
    }

    /// Returns the idle timeout, or `None` when it is disabled.
    #[must_use]
    pub const fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.idle_timeout_ms))
        }
    }

    /// Returns `host:port` for logging and error messages.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.idle_timeout(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn zero_idle_timeout_disables_it() {
        let config = ServerConfig {
            idle_timeout_ms: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn new_keeps_host_verbatim() {
        let config = ServerConfig::new("localhost", 9001);
        assert_eq!(config.bind_addr(), "localhost:9001");
        assert_eq!(config.worker_threads, 0);
    }

    #[test]
    fn parse_env_falls_back_on_missing_key() {
        let value: u16 = parse_env("WSHOOKS_TEST_SURELY_UNSET_KEY", 4242);
        assert_eq!(value, 4242);
    }
}
