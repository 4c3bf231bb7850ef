//! # Hangman Session
//!
//! Realtime session layer for a turn-based word-guessing game client.
//!
//! The crate owns the single connection to the game server and keeps a
//! local projection of the server-authoritative game state:
//!
//! - [`ConnectionManager`] opens and closes the connection, sends
//!   [`Envelope`]s and publishes the latest inbound envelope and the
//!   connection state through `tokio::sync::watch` channels.
//! - [`GameStateProjector`] applies inbound `game_started` snapshots to a
//!   [`GameState`] and turns UI actions (start, guess, continue, end) into
//!   outbound envelopes.
//! - [`ServerStatsWatcher`] tracks the server's active-player count.
//!
//! Credentials ([`AuthSource`]) and the player service
//! ([`PlayerDirectory`]) are collaborators supplied by the embedding
//! application.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for
//!   any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature
//!   provides `WebSocketConnector`

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod player;
pub mod projector;
pub mod protocol;
pub mod stats;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use auth::{AuthSource, StaticAuth};
pub use config::SessionConfig;
pub use connection::{ConnectionManager, ConnectionState, InboundMessages};
pub use error::SessionError;
pub use game::{GameState, GameStatus};
pub use player::{PlayerDirectory, PlayerId, PlayerIdentity};
pub use projector::GameStateProjector;
pub use protocol::{Envelope, ServerStats};
pub use stats::ServerStatsWatcher;
pub use transport::{Connector, Transport};
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
