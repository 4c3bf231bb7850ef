//! Wire envelope and payload types for the game session connection.
//!
//! Every frame in both directions is a JSON text message shaped as
//! `{"action": <string>, "data": <object|null>}`. There are no sequence
//! numbers or correlation ids; a reply is matched to a request only by its
//! action name and arrival order.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SessionError};

/// Action names understood by this client.
pub mod actions {
    /// Request (outbound) or report (inbound) the number of active players.
    pub const SERVER_STATS: &str = "server_stats";
    /// Ask the server to start a new game for the session's player.
    pub const START_GAME: &str = "start_game";
    /// Submit one guessed letter; `data.letter` is one lowercase character.
    pub const GUESS_LETTER: &str = "guess_letter";
    /// Ask for the next word after a finished game.
    pub const CONTINUE_GAME: &str = "continue_game";
    /// Tell the server the player is leaving the session.
    pub const END_GAME: &str = "end_game";
    /// Inbound full game-state snapshot.
    pub const GAME_STARTED: &str = "game_started";
    /// Inbound server-side validation error.
    pub const ERROR: &str = "error";
}

// ── Envelope ────────────────────────────────────────────────────────

/// The `{action, data}` message unit exchanged over the session connection.
///
/// Immutable once constructed.
///
/// # Example
///
/// ```
/// use hangman_session::protocol::Envelope;
///
/// let envelope = Envelope::guess_letter("a");
/// assert_eq!(
///     envelope.to_frame().unwrap(),
///     r#"{"action":"guess_letter","data":{"letter":"a"}}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    action: String,
    #[serde(default)]
    data: Option<Value>,
}

impl Envelope {
    /// Build an envelope carrying a structured payload.
    pub fn new(action: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            action: action.into(),
            data,
        }
    }

    /// Build an envelope with `data: null`.
    pub fn bare(action: impl Into<String>) -> Self {
        Self::new(action, None)
    }

    /// `{"action":"guess_letter","data":{"letter":<letter>}}`.
    ///
    /// The letter is sent as given; normalization happens in
    /// [`GameStateProjector::submit_guess`](crate::projector::GameStateProjector::submit_guess).
    pub fn guess_letter(letter: impl Into<String>) -> Self {
        let payload = GuessLetter {
            letter: letter.into(),
        };
        // A struct holding one string always serializes.
        Self::new(actions::GUESS_LETTER, serde_json::to_value(payload).ok())
    }

    /// The action name this envelope is dispatched on.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// The raw payload, if any.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Decode the payload into a typed structure. A missing payload decodes
    /// from JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Serialization`] if the payload does not match `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.data.clone().unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    /// Parse one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MalformedFrame`] if the frame is not a JSON
    /// object with a string `action`.
    pub fn from_frame(frame: &str) -> Result<Self> {
        serde_json::from_str(frame).map_err(SessionError::MalformedFrame)
    }

    /// Serialize into one outbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Serialization`] if the payload cannot be encoded.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Payloads ────────────────────────────────────────────────────────

/// Payload of an outbound `guess_letter` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessLetter {
    pub letter: String,
}

/// Payload of an inbound `server_stats` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    /// Players currently connected. Older servers call this `active_users`.
    #[serde(alias = "active_users")]
    pub active_players: u32,
}

/// Payload of an inbound `error` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorPayload {
    pub error: String,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn bare_envelope_serializes_null_data() {
        let frame = Envelope::bare(actions::START_GAME).to_frame().unwrap();
        assert_eq!(frame, r#"{"action":"start_game","data":null}"#);
    }

    #[test]
    fn guess_letter_wire_shape() {
        let envelope = Envelope::guess_letter("q");
        let frame = envelope.to_frame().unwrap();
        assert_eq!(frame, r#"{"action":"guess_letter","data":{"letter":"q"}}"#);
        assert_eq!(
            envelope.payload::<GuessLetter>().unwrap(),
            GuessLetter {
                letter: "q".into()
            }
        );
    }

    #[test]
    fn from_frame_accepts_missing_data() {
        let envelope = Envelope::from_frame(r#"{"action":"ping"}"#).unwrap();
        assert_eq!(envelope.action(), "ping");
        assert!(envelope.data().is_none());
    }

    #[test]
    fn from_frame_rejects_garbage() {
        for frame in [
            "",
            "not json",
            "null",
            "[]",
            r#"{"data":{}}"#,
            r#"{"action":42}"#,
            r#"{"action":"game_started""#,
        ] {
            let err = Envelope::from_frame(frame).unwrap_err();
            assert!(
                matches!(err, SessionError::MalformedFrame(_)),
                "frame {frame:?} should be malformed, got {err:?}"
            );
        }
    }

    #[test]
    fn server_stats_accepts_both_field_names() {
        let a = Envelope::from_frame(r#"{"action":"server_stats","data":{"active_players":3}}"#)
            .unwrap();
        let b = Envelope::from_frame(r#"{"action":"server_stats","data":{"active_users":7}}"#)
            .unwrap();
        assert_eq!(a.payload::<ServerStats>().unwrap().active_players, 3);
        assert_eq!(b.payload::<ServerStats>().unwrap().active_players, 7);
    }

    #[test]
    fn payload_of_missing_data_is_an_error_for_structs() {
        let envelope = Envelope::bare(actions::ERROR);
        let err = envelope.payload::<ServerErrorPayload>().unwrap_err();
        assert!(matches!(err, SessionError::Serialization(_)));
    }
}
