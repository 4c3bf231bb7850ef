#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the session layer integration tests.
//!
//! Provides a channel-based [`MockConnector`] whose transports record every
//! frame the client sends and deliver whatever the test pushes through
//! [`MockServer`], plus a scripted [`MockPlayers`] directory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use hangman_session::{
    Connector, PlayerDirectory, PlayerIdentity, SessionError, Transport,
};
use tokio::sync::mpsc;

// ── MockTransport ───────────────────────────────────────────────────

/// One open mock connection.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<String>,
    probe: Arc<Probe>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), SessionError> {
        if self.probe.stall_send {
            std::future::pending::<()>().await;
        }
        self.probe.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        // `None` once the test drops the server handle.
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        if self.probe.hang_close {
            std::future::pending::<()>().await;
        }
        if self.probe.fail_close {
            return Err(SessionError::TransportSend("close handshake failed".into()));
        }
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Counters and recordings shared by a connector and its transports.
#[derive(Default)]
pub struct Probe {
    pub opened: AtomicUsize,
    pub closes: AtomicUsize,
    pub sent: StdMutex<Vec<String>>,
    server: StdMutex<Option<mpsc::UnboundedSender<String>>>,
    delay: Option<Duration>,
    refuse: bool,
    fail_close: bool,
    hang_close: bool,
    stall_send: bool,
}

impl Probe {
    /// Frames sent so far, across all connections.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent frames decoded as JSON.
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Handle for pushing frames to the most recently opened connection.
    pub fn server(&self) -> MockServer {
        MockServer {
            tx: self.server.lock().unwrap().clone().expect("no open connection"),
        }
    }

    /// Simulate the server closing the most recent connection.
    pub fn hang_up(&self) {
        self.server.lock().unwrap().take();
    }
}

/// Server side of the current mock connection.
#[derive(Clone)]
pub struct MockServer {
    tx: mpsc::UnboundedSender<String>,
}

impl MockServer {
    pub fn push(&self, frame: impl Into<String>) {
        self.tx.send(frame.into()).unwrap();
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.push(value.to_string());
    }
}

/// Connector producing [`MockTransport`]s.
pub struct MockConnector {
    pub probe: Arc<Probe>,
}

impl MockConnector {
    pub fn new() -> (Self, Arc<Probe>) {
        Self::with_probe(Probe::default())
    }

    /// Connector whose handshake takes `delay`.
    pub fn slow(delay: Duration) -> (Self, Arc<Probe>) {
        Self::with_probe(Probe {
            delay: Some(delay),
            ..Probe::default()
        })
    }

    /// Connector whose handshake is always rejected.
    pub fn refusing() -> (Self, Arc<Probe>) {
        Self::with_probe(Probe {
            refuse: true,
            ..Probe::default()
        })
    }

    /// Connector whose transports report an error when closed.
    pub fn failing_close() -> (Self, Arc<Probe>) {
        Self::with_probe(Probe {
            fail_close: true,
            ..Probe::default()
        })
    }

    /// Connector whose transports never finish closing.
    pub fn hanging_close() -> (Self, Arc<Probe>) {
        Self::with_probe(Probe {
            hang_close: true,
            ..Probe::default()
        })
    }

    /// Connector whose transports never finish a write.
    pub fn stalled_send() -> (Self, Arc<Probe>) {
        Self::with_probe(Probe {
            stall_send: true,
            ..Probe::default()
        })
    }

    fn with_probe(probe: Probe) -> (Self, Arc<Probe>) {
        let probe = Arc::new(probe);
        (
            Self {
                probe: Arc::clone(&probe),
            },
            probe,
        )
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, SessionError> {
        if let Some(delay) = self.probe.delay {
            tokio::time::sleep(delay).await;
        }
        if self.probe.refuse {
            return Err(SessionError::Connection("handshake rejected".into()));
        }
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.probe.server.lock().unwrap() = Some(tx);
        Ok(Box::new(MockTransport {
            incoming: rx,
            probe: Arc::clone(&self.probe),
        }))
    }
}

// ── MockPlayers ─────────────────────────────────────────────────────

/// Player directory with a fixed answer for each call.
pub struct MockPlayers {
    pub own: Option<PlayerIdentity>,
    pub created: Option<PlayerIdentity>,
    pub create_calls: StdMutex<Vec<String>>,
    pub lookup_calls: AtomicUsize,
}

impl MockPlayers {
    pub fn new(own: Option<PlayerIdentity>, created: Option<PlayerIdentity>) -> Self {
        Self {
            own,
            created,
            create_calls: StdMutex::new(Vec::new()),
            lookup_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PlayerDirectory for MockPlayers {
    async fn create_player(&self, display_name: &str) -> Result<PlayerIdentity, SessionError> {
        self.create_calls.lock().unwrap().push(display_name.to_owned());
        self.created
            .clone()
            .ok_or_else(|| SessionError::Collaborator("create rejected".into()))
    }

    async fn get_own_player(&self) -> Result<PlayerIdentity, SessionError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.own
            .clone()
            .ok_or_else(|| SessionError::Collaborator("player not found".into()))
    }
}

/// A registered identity with a fixed id.
pub fn registered(name: &str, id: u128) -> PlayerIdentity {
    PlayerIdentity {
        id: Some(uuid::Uuid::from_u128(id)),
        display_name: name.into(),
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// A `game_started` frame carrying the given snapshot fields.
pub fn game_started_json(data: serde_json::Value) -> String {
    serde_json::json!({ "action": "game_started", "data": data }).to_string()
}

/// A `server_stats` frame.
pub fn server_stats_json(active_players: u32) -> String {
    serde_json::json!({
        "action": "server_stats",
        "data": { "active_players": active_players }
    })
    .to_string()
}
