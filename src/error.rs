//! Error types for the hangman session layer.

use thiserror::Error;

/// Errors that can occur inside the session layer.
///
/// The game-facing operations on
/// [`GameStateProjector`](crate::projector::GameStateProjector) never return
/// these to the UI; they match on the kind and log it. The
/// [`ConnectionManager`](crate::connection::ConnectionManager) returns them
/// directly.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Opening the transport failed (network error, handshake rejection,
    /// or the attempt was abandoned by a concurrent `disconnect`).
    #[error("connection failed: {0}")]
    Connection(String),

    /// A send was attempted while the connection is not `Connected`.
    /// The envelope was dropped.
    #[error("not connected to server")]
    NotConnected,

    /// An inbound frame could not be parsed as an envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),

    /// The player lookup/create collaborator rejected the call.
    #[error("player service failure: {0}")]
    Collaborator(String),

    /// A guess was not exactly one alphabetic character.
    #[error("invalid guess {0:?}: expected exactly one alphabetic character")]
    InvalidGuess(String),

    /// Failed to write a frame to the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to read a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport was closed before the operation could complete.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize an outbound envelope or decode a payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation did not complete within its configured timeout.
    #[error("operation timed out")]
    Timeout,
}

/// A specialized [`Result`] type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
