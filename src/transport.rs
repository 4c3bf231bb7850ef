//! Transport abstraction for the game session connection.
//!
//! A [`Transport`] is one open, bidirectional text-frame channel to the game
//! server. A [`Connector`] knows how to open one. The
//! [`ConnectionManager`](crate::connection::ConnectionManager) owns the
//! connector and holds at most one transport at a time.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use hangman_session::error::SessionError;
//! use hangman_session::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), SessionError> {
//!         // Write one JSON text frame
//! #       let _ = frame;
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SessionError>> {
//!         // Return None when the connection is closed cleanly
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SessionError> {
//!         Ok(())
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self) -> Result<Box<dyn Transport>, SessionError> {
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SessionError;

/// A bidirectional text frame transport.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame.
/// Each call to [`recv`](Transport::recv) returns one complete JSON frame.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the transport
/// loop polls it inside `tokio::select!`. Channel-based implementations
/// (e.g. wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportSend`] or
    /// [`SessionError::TransportClosed`] if the frame could not be written.
    async fn send(&mut self, frame: String) -> Result<(), SessionError>;

    /// Receive the next JSON text frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the server closed the connection
    async fn recv(&mut self) -> Option<Result<String, SessionError>>;

    /// Close the transport.
    ///
    /// Implementations must release their resources even if the close
    /// handshake fails, and a second call must be a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens a [`Transport`] to the game server.
///
/// Connection parameters (URL, credentials) live in the implementor.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new transport. Called at most once per `connect()` attempt.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] (or [`SessionError::Timeout`]) if
    /// the transport cannot be opened.
    async fn connect(&self) -> Result<Box<dyn Transport>, SessionError>;
}
