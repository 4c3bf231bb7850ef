//! Local projection of the server-authoritative game state.

use serde::{Deserialize, Serialize};

/// Tries per word when no snapshot has been received yet.
pub const DEFAULT_MAX_TRIES: u32 = 5;

/// Terminal-state flag. Encoded on the wire as `-1`, `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum GameStatus {
    Lost,
    #[default]
    Ongoing,
    Won,
}

impl GameStatus {
    /// `true` once the game is won or lost.
    pub fn is_terminal(self) -> bool {
        self != GameStatus::Ongoing
    }
}

impl TryFrom<i8> for GameStatus {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(GameStatus::Lost),
            0 => Ok(GameStatus::Ongoing),
            1 => Ok(GameStatus::Won),
            other => Err(format!("game_status must be -1, 0 or 1, got {other}")),
        }
    }
}

impl From<GameStatus> for i8 {
    fn from(status: GameStatus) -> Self {
        match status {
            GameStatus::Lost => -1,
            GameStatus::Ongoing => 0,
            GameStatus::Won => 1,
        }
    }
}

/// The client's copy of the current game.
///
/// Only ever replaced wholesale from a `game_started` snapshot or reset to
/// [`Default`] when a session ends. Fields absent from a snapshot take their
/// default values. `tries_left` is never changed locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameState {
    pub word_progress: Option<String>,
    pub guessed_letters: Vec<String>,
    pub tries_left: u32,
    pub max_tries: u32,
    pub successful_guesses: u32,
    pub game_status: GameStatus,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            word_progress: None,
            guessed_letters: Vec::new(),
            tries_left: 0,
            max_tries: DEFAULT_MAX_TRIES,
            successful_guesses: 0,
            game_status: GameStatus::Ongoing,
        }
    }
}

impl GameState {
    /// The terminal-state flag.
    pub fn status(&self) -> GameStatus {
        self.game_status
    }

    /// Whether the current game has been won or lost.
    pub fn is_terminal(&self) -> bool {
        self.game_status.is_terminal()
    }

    /// Whether the UI should offer guessing: a word is in play and the game
    /// has not concluded.
    pub fn accepts_guesses(&self) -> bool {
        self.word_progress.is_some() && !self.is_terminal()
    }

    /// Whether `letter` has already been guessed (case-insensitive).
    pub fn has_guessed(&self, letter: &str) -> bool {
        let letter = letter.to_lowercase();
        self.guessed_letters.iter().any(|g| g.to_lowercase() == letter)
    }
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
    use serde_json::json;

    #[test]
    fn status_wire_values() {
        assert_eq!(serde_json::to_string(&GameStatus::Lost).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&GameStatus::Won).unwrap(), "1");
        let status: GameStatus = serde_json::from_str("0").unwrap();
        assert_eq!(status, GameStatus::Ongoing);
        assert!(serde_json::from_str::<GameStatus>("2").is_err());
    }

    #[test]
    fn snapshot_without_status_is_ongoing() {
        let state: GameState = serde_json::from_value(json!({
            "word_progress": "****",
            "guessed_letters": [],
            "tries_left": 5,
            "max_tries": 5,
            "successful_guesses": 0
        }))
        .unwrap();
        assert_eq!(state.game_status, GameStatus::Ongoing);
        assert!(state.accepts_guesses());
    }

    #[test]
    fn negative_tries_are_rejected() {
        let result = serde_json::from_value::<GameState>(json!({ "tries_left": -1 }));
        assert!(result.is_err());
    }

    #[test]
    fn terminal_state_blocks_guessing() {
        let state = GameState {
            word_progress: Some("dog".into()),
            game_status: GameStatus::Won,
            ..GameState::default()
        };
        assert!(state.is_terminal());
        assert!(!state.accepts_guesses());
    }

    #[test]
    fn default_state_has_no_word() {
        let state = GameState::default();
        assert!(!state.accepts_guesses());
        assert_eq!(state.max_tries, DEFAULT_MAX_TRIES);
    }

    #[test]
    fn has_guessed_ignores_case() {
        let state = GameState {
            guessed_letters: vec!["o".into()],
            ..GameState::default()
        };
        assert!(state.has_guessed("O"));
        assert!(!state.has_guessed("x"));
    }
}
