//! Transport implementations for the game session connection.
//!
//! | Feature                | Transport / Connector                              |
//! |------------------------|----------------------------------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] / [`WebSocketConnector`]    |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), hangman_session::SessionError> {
//! use hangman_session::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:8000/ws/user").await?;
//! ws.send(r#"{"action":"server_stats","data":null}"#.to_string()).await?;
//!
//! if let Some(Ok(frame)) = ws.recv().await {
//!     println!("server said: {frame}");
//! }
//!
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
