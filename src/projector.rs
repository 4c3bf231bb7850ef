//! Game state projector.
//!
//! [`GameStateProjector`] turns inbound envelopes into [`GameState`]
//! replacements and turns UI actions into outbound envelopes. It never
//! blocks the UI on a failure: every operation matches the error kind, logs
//! it and returns, so a dropped send shows up as an action that did nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! let connection = Arc::new(ConnectionManager::websocket(config, Some(auth.clone())));
//! let projector = Arc::new(GameStateProjector::new(connection, players, auth));
//! let _follower = projector.observe_inbound();
//!
//! projector.start_session().await;
//! projector.submit_guess("E").await;
//!
//! let mut game = projector.subscribe_game();
//! while game.changed().await.is_ok() {
//!     if game.borrow().is_terminal() { break; }
//! }
//! projector.end_session().await;
//! ```

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::AuthSource;
use crate::connection::ConnectionManager;
use crate::error::{Result, SessionError};
use crate::game::GameState;
use crate::player::{PlayerDirectory, PlayerId, PlayerIdentity};
use crate::protocol::{actions, Envelope, ServerErrorPayload};

/// Projects server-pushed game events onto a local [`GameState`].
pub struct GameStateProjector {
    connection: Arc<ConnectionManager>,
    players: Arc<dyn PlayerDirectory>,
    auth: Arc<dyn AuthSource>,
    game: watch::Sender<GameState>,
    identity: Mutex<PlayerIdentity>,
    last_server_error: watch::Sender<Option<String>>,
}

impl GameStateProjector {
    /// Create a projector with a default game state and a random identity.
    pub fn new(
        connection: Arc<ConnectionManager>,
        players: Arc<dyn PlayerDirectory>,
        auth: Arc<dyn AuthSource>,
    ) -> Self {
        let (game, _) = watch::channel(GameState::default());
        let (last_server_error, _) = watch::channel(None);
        Self {
            connection,
            players,
            auth,
            game,
            identity: Mutex::new(PlayerIdentity::random()),
            last_server_error,
        }
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Spawn a task applying every inbound envelope to the game state.
    ///
    /// The subscription is taken before returning, so nothing that arrives
    /// afterwards is missed. The task holds the projector alive; abort the
    /// returned handle to stop following.
    pub fn observe_inbound(self: &Arc<Self>) -> JoinHandle<()> {
        let projector = Arc::clone(self);
        let mut inbound = self.connection.inbound();
        tokio::spawn(async move {
            while let Some(envelope) = inbound.next().await {
                projector.apply_envelope(&envelope);
            }
            debug!("inbound stream ended");
        })
    }

    /// Merge one inbound envelope, dispatching on its action only.
    ///
    /// `game_started` replaces the whole state with the snapshot. Unknown
    /// actions and unreadable payloads are ignored.
    pub fn apply_envelope(&self, envelope: &Envelope) {
        match envelope.action() {
            actions::GAME_STARTED => match envelope.payload::<GameState>() {
                Ok(snapshot) => {
                    let status = snapshot.status();
                    debug!(
                        tries_left = snapshot.tries_left,
                        status = i8::from(status),
                        "applying game snapshot"
                    );
                    self.game.send_replace(snapshot);
                    self.last_server_error.send_replace(None);
                    if status.is_terminal() {
                        info!(status = ?status, "game concluded");
                    }
                }
                Err(e) => warn!("ignoring game_started with unreadable snapshot: {e}"),
            },
            actions::ERROR => match envelope.payload::<ServerErrorPayload>() {
                Ok(payload) => {
                    warn!(error = %payload.error, "server rejected a request");
                    self.last_server_error.send_replace(Some(payload.error));
                }
                Err(e) => warn!("ignoring error envelope with unreadable payload: {e}"),
            },
            // Consumed by `ServerStatsWatcher`.
            actions::SERVER_STATS => {}
            other => debug!(action = other, "ignoring unrecognized action"),
        }
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Send one guessed letter, lowercased.
    ///
    /// Anything other than exactly one alphabetic character is logged and
    /// not sent. Does not wait for the result; it arrives later as a
    /// `game_started` snapshot.
    pub async fn submit_guess(&self, character: &str) {
        match normalize_guess(character) {
            Ok(letter) => {
                self.dispatch(Envelope::guess_letter(letter)).await;
            }
            Err(e) => warn!("{e}"),
        }
    }

    /// Make sure the player is known to the server, connect, and ask for a
    /// new game.
    pub async fn start_session(&self) {
        match self.ensure_player().await {
            Ok(player_id) => debug!(%player_id, "starting session"),
            Err(SessionError::Collaborator(reason)) => {
                warn!("cannot start session, player lookup failed: {reason}");
                return;
            }
            Err(e) => {
                error!("cannot start session: {e}");
                return;
            }
        }

        match self.connection.connect().await {
            Ok(()) => {}
            Err(e @ (SessionError::Connection(_) | SessionError::Timeout)) => {
                warn!("cannot start session, connect failed: {e}");
                return;
            }
            Err(e) => {
                error!("cannot start session: {e}");
                return;
            }
        }

        self.dispatch(Envelope::bare(actions::START_GAME)).await;
    }

    /// Ask for the next word after a finished game.
    pub async fn continue_session(&self) {
        self.dispatch(Envelope::bare(actions::CONTINUE_GAME)).await;
    }

    /// Tell the server the player is leaving, close the connection and reset
    /// the local game state.
    ///
    /// The reset happens after the transport loop has stopped, so no late
    /// snapshot can land on top of it.
    pub async fn end_session(&self) {
        self.dispatch(Envelope::bare(actions::END_GAME)).await;
        self.connection.disconnect().await;
        self.connection.reset();
        self.game.send_replace(GameState::default());
        self.last_server_error.send_replace(None);
        info!("session ended");
    }

    /// Ask the server for the current player count.
    pub async fn request_server_stats(&self) {
        self.dispatch(Envelope::bare(actions::SERVER_STATS)).await;
    }

    /// Drop the resolved player, e.g. on logout. A new random display name
    /// is generated.
    pub async fn forget_player(&self) {
        *self.identity.lock().await = PlayerIdentity::random();
        debug!("player identity cleared");
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current game state.
    pub fn game_state(&self) -> GameState {
        self.game.borrow().clone()
    }

    /// Observe game state replacements.
    pub fn subscribe_game(&self) -> watch::Receiver<GameState> {
        self.game.subscribe()
    }

    /// Whether the UI should offer guessing right now.
    pub fn accepts_guesses(&self) -> bool {
        self.game.borrow().accepts_guesses()
    }

    /// Current player identity.
    pub async fn identity(&self) -> PlayerIdentity {
        self.identity.lock().await.clone()
    }

    /// Message of the last inbound `error` envelope, cleared by the next
    /// snapshot.
    pub fn last_server_error(&self) -> Option<String> {
        self.last_server_error.borrow().clone()
    }

    /// The connection this projector sends through.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Resolve the player id through the player service if not known yet.
    /// On failure the identity is left as it was.
    async fn ensure_player(&self) -> Result<PlayerId> {
        let mut identity = self.identity.lock().await;
        if let Some(id) = identity.id {
            return Ok(id);
        }

        let resolved = if self.auth.is_authenticated() {
            match self.players.get_own_player().await {
                Ok(found) => found,
                Err(e) => {
                    debug!("no existing player ({e}); creating one");
                    self.players
                        .create_player(&identity.display_name)
                        .await
                        .map_err(collaborator_failure)?
                }
            }
        } else {
            self.players
                .create_player(&identity.display_name)
                .await
                .map_err(collaborator_failure)?
        };

        let Some(id) = resolved.id else {
            return Err(SessionError::Collaborator(
                "player service returned a player without an id".into(),
            ));
        };
        *identity = resolved;
        info!(player_id = %id, name = %identity.display_name, "player resolved");
        Ok(id)
    }

    /// Send best-effort. Returns whether the transport accepted the frame.
    async fn dispatch(&self, envelope: Envelope) -> bool {
        let action = envelope.action();
        match self.connection.send(&envelope).await {
            Ok(()) => true,
            Err(SessionError::NotConnected) => {
                warn!(action, "not connected; envelope dropped");
                false
            }
            Err(e @ (SessionError::TransportSend(_)
            | SessionError::TransportClosed
            | SessionError::Timeout)) => {
                warn!(action, "send did not complete: {e}");
                false
            }
            Err(e @ SessionError::Serialization(_)) => {
                error!(action, "could not encode envelope: {e}");
                false
            }
            Err(e) => {
                error!(action, "unexpected send failure: {e}");
                false
            }
        }
    }
}

impl std::fmt::Debug for GameStateProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameStateProjector")
            .field("connection", &self.connection)
            .field("game", &*self.game.borrow())
            .finish()
    }
}

fn collaborator_failure(e: SessionError) -> SessionError {
    match e {
        SessionError::Collaborator(_) => e,
        other => SessionError::Collaborator(other.to_string()),
    }
}

/// Exactly one alphabetic character whose lowercase form is also a single
/// character.
fn normalize_guess(input: &str) -> Result<String> {
    let mut chars = input.chars();
    let letter = match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_alphabetic() => c,
        _ => return Err(SessionError::InvalidGuess(input.to_owned())),
    };
    let mut lower = letter.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => Ok(l.to_string()),
        _ => Err(SessionError::InvalidGuess(input.to_owned())),
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
    use crate::auth::StaticAuth;
    use crate::config::SessionConfig;
    use crate::game::GameStatus;
    use crate::transport::{Connector, Transport};
    use async_trait::async_trait;
    use serde_json::json;

    struct NoNetwork;

    #[async_trait]
    impl Connector for NoNetwork {
        async fn connect(&self) -> Result<Box<dyn Transport>> {
            Err(SessionError::Connection("offline".into()))
        }
    }

    struct NoPlayers;

    #[async_trait]
    impl PlayerDirectory for NoPlayers {
        async fn create_player(&self, _display_name: &str) -> Result<PlayerIdentity> {
            Err(SessionError::Collaborator("unavailable".into()))
        }

        async fn get_own_player(&self) -> Result<PlayerIdentity> {
            Err(SessionError::Collaborator("unavailable".into()))
        }
    }

    fn offline_projector() -> GameStateProjector {
        let connection = Arc::new(ConnectionManager::new(
            NoNetwork,
            SessionConfig::new("ws://offline.invalid"),
        ));
        GameStateProjector::new(connection, Arc::new(NoPlayers), Arc::new(StaticAuth::default()))
    }

    #[test]
    fn normalize_guess_lowercases_single_letters() {
        assert_eq!(normalize_guess("A").unwrap(), "a");
        assert_eq!(normalize_guess("ä").unwrap(), "ä");
        assert_eq!(normalize_guess("Ж").unwrap(), "ж");
    }

    #[test]
    fn normalize_guess_rejects_everything_else() {
        // 'İ' lowercases to "i\u{307}", two characters on the wire.
        for input in ["", "ab", "1", " ", "?", "a ", "İ"] {
            assert!(
                matches!(normalize_guess(input), Err(SessionError::InvalidGuess(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn snapshot_replaces_state_wholesale() {
        let projector = offline_projector();
        projector.apply_envelope(&Envelope::new(
            "game_started",
            Some(json!({
                "word_progress": "c*t",
                "guessed_letters": ["c", "t", "x"],
                "tries_left": 2,
                "max_tries": 5,
                "successful_guesses": 4,
                "game_status": 0
            })),
        ));
        projector.apply_envelope(&Envelope::new(
            "game_started",
            Some(json!({ "word_progress": "****", "tries_left": 5, "max_tries": 5 })),
        ));

        let state = projector.game_state();
        assert_eq!(state.word_progress.as_deref(), Some("****"));
        assert!(state.guessed_letters.is_empty());
        assert_eq!(state.successful_guesses, 0);
    }

    #[tokio::test]
    async fn unreadable_snapshot_is_ignored() {
        let projector = offline_projector();
        projector.apply_envelope(&Envelope::new(
            "game_started",
            Some(json!({ "word_progress": "d*g", "tries_left": 4, "game_status": 0 })),
        ));
        let before = projector.game_state();

        projector.apply_envelope(&Envelope::bare("game_started"));
        projector.apply_envelope(&Envelope::new(
            "game_started",
            Some(json!({ "game_status": 7 })),
        ));

        assert_eq!(projector.game_state(), before);
    }

    #[tokio::test]
    async fn server_error_is_recorded_until_next_snapshot() {
        let projector = offline_projector();
        projector.apply_envelope(&Envelope::new(
            "error",
            Some(json!({ "error": "letter must be a single character" })),
        ));
        assert_eq!(
            projector.last_server_error().as_deref(),
            Some("letter must be a single character")
        );

        projector.apply_envelope(&Envelope::new(
            "game_started",
            Some(json!({ "word_progress": "**", "game_status": -1 })),
        ));
        assert!(projector.last_server_error().is_none());
        assert_eq!(projector.game_state().status(), GameStatus::Lost);
    }

    #[tokio::test]
    async fn start_session_stalls_when_player_service_fails() {
        let projector = offline_projector();
        let before = projector.identity().await;

        projector.start_session().await;

        assert_eq!(projector.identity().await, before);
        assert_eq!(
            projector.connection().state(),
            crate::connection::ConnectionState::Disconnected
        );
    }

    #[tokio::test]
    async fn forget_player_generates_new_name() {
        let projector = offline_projector();
        let before = projector.identity().await;
        projector.forget_player().await;
        let after = projector.identity().await;
        assert!(after.id.is_none());
        assert_ne!(before.display_name, after.display_name);
    }
}
