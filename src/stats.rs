//! Active-player count published by the server.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::error::SessionError;
use crate::protocol::{actions, Envelope, ServerStats};

/// Tracks the latest `server_stats` envelope.
///
/// A second subscriber of the connection's latest-message slot, next to the
/// [`GameStateProjector`](crate::projector::GameStateProjector).
#[derive(Debug)]
pub struct ServerStatsWatcher {
    connection: Arc<ConnectionManager>,
    stats: watch::Sender<Option<ServerStats>>,
}

impl ServerStatsWatcher {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        let (stats, _) = watch::channel(None);
        Self { connection, stats }
    }

    /// Spawn a task recording every `server_stats` envelope. Abort the
    /// handle to stop.
    pub fn observe_inbound(self: &Arc<Self>) -> JoinHandle<()> {
        let watcher = Arc::clone(self);
        let mut inbound = self.connection.inbound();
        tokio::spawn(async move {
            while let Some(envelope) = inbound.next().await {
                watcher.apply_envelope(&envelope);
            }
        })
    }

    /// Record `envelope` if it is a readable `server_stats`; ignore anything
    /// else.
    pub fn apply_envelope(&self, envelope: &Envelope) {
        if envelope.action() != actions::SERVER_STATS {
            return;
        }
        match envelope.payload::<ServerStats>() {
            Ok(stats) => {
                debug!(active_players = stats.active_players, "server stats");
                self.stats.send_replace(Some(stats));
            }
            Err(e) => warn!("ignoring server_stats with unreadable payload: {e}"),
        }
    }

    /// Ask the server for a fresh count. Best-effort: a failed send is
    /// logged and the previous figure stays in place.
    pub async fn request(&self) {
        match self.connection.send(&Envelope::bare(actions::SERVER_STATS)).await {
            Ok(()) => {}
            Err(SessionError::NotConnected) => debug!("not connected; stats request dropped"),
            Err(e) => warn!("stats request failed: {e}"),
        }
    }

    /// The most recent count, if one has arrived.
    pub fn latest(&self) -> Option<ServerStats> {
        *self.stats.borrow()
    }

    /// Observe count updates.
    pub fn subscribe(&self) -> watch::Receiver<Option<ServerStats>> {
        self.stats.subscribe()
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
    use crate::config::SessionConfig;
    use crate::transport::{Connector, Transport};
    use async_trait::async_trait;
    use serde_json::json;

    struct NoNetwork;

    #[async_trait]
    impl Connector for NoNetwork {
        async fn connect(&self) -> Result<Box<dyn Transport>, SessionError> {
            Err(SessionError::Connection("offline".into()))
        }
    }

    fn watcher() -> ServerStatsWatcher {
        ServerStatsWatcher::new(Arc::new(ConnectionManager::new(
            NoNetwork,
            SessionConfig::new("ws://offline.invalid"),
        )))
    }

    #[test]
    fn records_stats_and_ignores_other_actions() {
        let watcher = watcher();
        assert!(watcher.latest().is_none());

        watcher.apply_envelope(&Envelope::new(
            "game_started",
            Some(json!({ "active_players": 9 })),
        ));
        assert!(watcher.latest().is_none());

        watcher.apply_envelope(&Envelope::new(
            "server_stats",
            Some(json!({ "active_users": 4 })),
        ));
        assert_eq!(watcher.latest().unwrap().active_players, 4);

        watcher.apply_envelope(&Envelope::new(
            "server_stats",
            Some(json!({ "active_players": "many" })),
        ));
        assert_eq!(watcher.latest().unwrap().active_players, 4);
    }

    #[tokio::test]
    async fn request_while_disconnected_is_a_no_op() {
        let watcher = watcher();
        watcher.request().await;
        assert!(watcher.latest().is_none());
    }
}
