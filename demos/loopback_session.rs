//! # Loopback Session Example
//!
//! Plays one game of hangman against an in-process fake server. The
//! [`Connector`] hands out a channel-based [`Transport`]; a small task on the
//! other end answers `start_game` and `guess_letter` envelopes with full
//! `game_started` snapshots, the way the real server does.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_session
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use hangman_session::{
    ConnectionManager, Connector, Envelope, GameStateProjector, PlayerDirectory, PlayerIdentity,
    ServerStatsWatcher, SessionConfig, SessionError, StaticAuth, Transport,
};
use serde_json::json;
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Loopback transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of an in-process connection.
struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, frame: String) -> Result<(), SessionError> {
        self.tx
            .send(frame)
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }

    /// `None` once the fake server task exits.
    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.rx.close();
        Ok(())
    }
}

/// Spawns a fresh fake server for every connection.
struct LoopbackConnector {
    word: &'static str,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, SessionError> {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        tokio::spawn(fake_server(self.word, server_rx, server_tx));
        Ok(Box::new(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Fake game server
// ─────────────────────────────────────────────────────────────────────

const MAX_TRIES: u32 = 5;

async fn fake_server(
    word: &'static str,
    mut rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
) {
    let mut guessed: Vec<String> = Vec::new();
    let mut tries_left = MAX_TRIES;

    while let Some(frame) = rx.recv().await {
        let Ok(envelope) = Envelope::from_frame(&frame) else {
            continue;
        };
        tracing::info!("server received: {frame}");

        match envelope.action() {
            "start_game" | "continue_game" => {
                guessed.clear();
                tries_left = MAX_TRIES;
            }
            "guess_letter" => {
                let letter = envelope
                    .data()
                    .and_then(|d| d.get("letter"))
                    .and_then(|l| l.as_str())
                    .unwrap_or_default()
                    .to_owned();
                if !word.contains(letter.as_str()) {
                    tries_left = tries_left.saturating_sub(1);
                }
                guessed.push(letter);
            }
            "server_stats" => {
                let reply = json!({ "action": "server_stats", "data": { "active_players": 1 } });
                let _ = tx.send(reply.to_string());
                continue;
            }
            "end_game" => break,
            _ => continue,
        }

        let progress: String = word
            .chars()
            .map(|c| {
                if guessed.iter().any(|g| g.starts_with(c)) {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let status = if !progress.contains('_') {
            1
        } else if tries_left == 0 {
            -1
        } else {
            0
        };
        let successful = guessed
            .iter()
            .filter(|g| word.contains(g.as_str()))
            .count();

        let snapshot = json!({
            "action": "game_started",
            "data": {
                "word_progress": progress,
                "guessed_letters": guessed,
                "tries_left": tries_left,
                "max_tries": MAX_TRIES,
                "successful_guesses": successful,
                "game_status": status,
            }
        });
        if tx.send(snapshot.to_string()).is_err() {
            break;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Player service stand-in
// ─────────────────────────────────────────────────────────────────────

struct LocalPlayers;

#[async_trait]
impl PlayerDirectory for LocalPlayers {
    async fn create_player(&self, display_name: &str) -> Result<PlayerIdentity, SessionError> {
        Ok(PlayerIdentity {
            id: Some(uuid::Uuid::new_v4()),
            display_name: display_name.to_owned(),
        })
    }

    async fn get_own_player(&self) -> Result<PlayerIdentity, SessionError> {
        Err(SessionError::Collaborator("guests have no account".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Play
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let connection = Arc::new(ConnectionManager::new(
        LoopbackConnector { word: "rust" },
        SessionConfig::new("loopback://hangman"),
    ));
    let projector = Arc::new(GameStateProjector::new(
        Arc::clone(&connection),
        Arc::new(LocalPlayers),
        Arc::new(StaticAuth::default()),
    ));
    let stats = Arc::new(ServerStatsWatcher::new(Arc::clone(&connection)));
    let _follower = projector.observe_inbound();
    let _stats = stats.observe_inbound();
    let mut game = projector.subscribe_game();

    projector.start_session().await;
    game.changed().await?;
    tracing::info!(progress = ?game.borrow_and_update().word_progress, "game started");

    stats.request().await;

    for letter in ["E", "t", "x", "r", "s", "u"] {
        if !projector.accepts_guesses() {
            break;
        }
        projector.submit_guess(letter).await;
        game.changed().await?;
        let state = game.borrow_and_update().clone();
        tracing::info!(
            letter,
            progress = state.word_progress.as_deref().unwrap_or(""),
            tries_left = state.tries_left,
            status = ?state.status(),
            "guess applied"
        );
    }

    if let Some(count) = stats.latest() {
        tracing::info!(active_players = count.active_players, "server stats");
    }
    tracing::info!(status = ?projector.game_state().status(), "final result");

    projector.end_session().await;
    tracing::info!(state = ?connection.state(), "done");
    Ok(())
}
