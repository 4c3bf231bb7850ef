//! Configuration for the session connection.

use std::time::Duration;

/// Default timeout for opening the transport.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a single outbound frame to be flushed.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`ConnectionManager`](crate::connection::ConnectionManager).
///
/// The only required field is `url`; all others have sensible defaults.
///
/// # Example
///
/// ```
/// use hangman_session::config::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new("ws://localhost:8000/ws/user")
///     .with_connect_timeout(Some(Duration::from_secs(3)))
///     .with_shutdown_timeout(Duration::from_millis(500));
/// assert_eq!(config.url, "ws://localhost:8000/ws/user");
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Endpoint the default WebSocket connector dials.
    pub url: String,
    /// Upper bound on `connect()`. `None` waits on the transport indefinitely.
    ///
    /// Defaults to **10 seconds**.
    pub connect_timeout: Option<Duration>,
    /// Upper bound on `send()` waiting for the frame to be flushed.
    /// `None` waits indefinitely.
    ///
    /// Defaults to **5 seconds**.
    pub send_timeout: Option<Duration>,
    /// Time the transport loop is given to close the transport during
    /// `disconnect()` before it is aborted.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the loop immediately.
    pub shutdown_timeout: Duration,
}

impl SessionConfig {
    /// Create a new configuration for the given endpoint with default timeouts.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            send_timeout: Some(DEFAULT_SEND_TIMEOUT),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the connect timeout. `None` disables it.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the send flush timeout. `None` disables it.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
