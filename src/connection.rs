//! Session connection manager.
//!
//! [`ConnectionManager`] owns the single connection to the game server. While
//! connected, a background transport loop multiplexes outbound frames, a
//! shutdown signal and inbound frames with `tokio::select!`. Inbound frames
//! that parse as an [`Envelope`] overwrite the single-slot latest message,
//! published through a [`watch`] channel; intermediate messages that no
//! subscriber observed in time are dropped.
//!
//! # State machine
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Connected ──disconnect()──▶ Closing ──▶ Disconnected
//!                                  │                  │
//!                                  └──fail────────────┴──server closed──▶ Disconnected
//! ```
//!
//! There is no automatic reconnection; callers decide when to call
//! [`connect`](ConnectionManager::connect) again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::protocol::Envelope;
use crate::transport::{Connector, Transport};

/// Lifecycle of the session connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the manager handle and the transport loop.
struct Shared {
    state: watch::Sender<ConnectionState>,
    latest: watch::Sender<Option<Envelope>>,
}

/// One outbound frame plus the channel its flush result is reported on.
struct Outbound {
    frame: String,
    flushed: oneshot::Sender<Result<()>>,
}

/// Handles to a running transport loop.
struct Link {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

// ── Manager ─────────────────────────────────────────────────────────

/// Owner of the session connection.
///
/// Holds at most one open transport. Share it between consumers with an
/// [`Arc`]; every operation takes `&self`.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    config: SessionConfig,
    shared: Arc<Shared>,
    link: Mutex<Option<Link>>,
    /// Bumped by every `connect` attempt and every `disconnect`; a handshake
    /// that finishes under a stale value was abandoned.
    attempt: AtomicU64,
}

impl ConnectionManager {
    /// Create a disconnected manager. Nothing is opened until
    /// [`connect`](Self::connect).
    pub fn new(connector: impl Connector, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (latest, _) = watch::channel(None);
        Self {
            connector: Box::new(connector),
            config,
            shared: Arc::new(Shared { state, latest }),
            link: Mutex::new(None),
            attempt: AtomicU64::new(0),
        }
    }

    /// Open the connection.
    ///
    /// Returns immediately with `Ok(())` and no side effects if the manager
    /// is already `Connected` or `Connecting`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] if the transport cannot be opened
    /// or the attempt was abandoned by [`disconnect`](Self::disconnect), and
    /// [`SessionError::Timeout`] if `connect_timeout` elapsed. The state is
    /// back to `Disconnected` in both cases.
    pub async fn connect(&self) -> Result<()> {
        let claimed = self.shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!(state = ?self.state(), "connect: already connected or connecting");
            return Ok(());
        }

        let ticket = self.attempt.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(url = %self.config.url, "connecting to game server");

        let opened = match self.config.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.connector.connect()).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::Timeout),
            },
            None => self.connector.connect().await,
        };

        let mut link = self.link.lock().await;
        if self.attempt.load(Ordering::Acquire) != ticket {
            if let Ok(mut transport) = opened {
                if let Err(e) = transport.close().await {
                    debug!("error closing abandoned transport: {e}");
                }
            }
            debug!("connect: attempt abandoned by disconnect");
            return Err(SessionError::Connection(
                "connection attempt abandoned".into(),
            ));
        }

        match opened {
            Ok(transport) => {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let (shutdown_tx, shutdown_rx) = oneshot::channel();
                // Connected must be visible before the loop can observe a
                // server-side close and move it back to Disconnected.
                self.shared.state.send_replace(ConnectionState::Connected);
                let task = tokio::spawn(transport_loop(
                    transport,
                    outbound_rx,
                    shutdown_rx,
                    Arc::clone(&self.shared),
                    self.config.shutdown_timeout,
                ));
                *link = Some(Link {
                    outbound_tx,
                    shutdown_tx,
                    task,
                });
                info!(url = %self.config.url, "session connected");
                Ok(())
            }
            Err(e) => {
                self.shared.state.send_replace(ConnectionState::Disconnected);
                warn!(url = %self.config.url, "connect failed: {e}");
                Err(match e {
                    SessionError::Connection(_) | SessionError::Timeout => e,
                    other => SessionError::Connection(other.to_string()),
                })
            }
        }
    }

    /// Serialize and transmit one envelope.
    ///
    /// Waits until the transport has flushed the frame (bounded by
    /// `send_timeout`) but never for a server reply. Nothing is queued while
    /// disconnected.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotConnected`] if the state is not `Connected`;
    ///   the envelope was dropped.
    /// - [`SessionError::TransportSend`] if the write failed; the manager
    ///   is now `Disconnected`.
    /// - [`SessionError::TransportClosed`] if the connection went away before
    ///   the frame was flushed.
    /// - [`SessionError::Timeout`] if the flush did not complete in time.
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }

        let flushed_rx = {
            let link = self.link.lock().await;
            let link = match link.as_ref() {
                Some(link) if self.state() == ConnectionState::Connected => link,
                _ => return Err(SessionError::NotConnected),
            };
            let frame = envelope.to_frame()?;
            let (flushed, flushed_rx) = oneshot::channel();
            link.outbound_tx
                .send(Outbound { frame, flushed })
                .map_err(|_| SessionError::NotConnected)?;
            flushed_rx
        };

        debug!(action = envelope.action(), "envelope queued");
        let flushed = match self.config.send_timeout {
            Some(limit) => tokio::time::timeout(limit, flushed_rx)
                .await
                .map_err(|_| SessionError::Timeout)?,
            None => flushed_rx.await,
        };
        flushed.map_err(|_| SessionError::TransportClosed)?
    }

    /// Close the connection. Idempotent.
    ///
    /// Moves through `Closing` to `Disconnected` and always releases the
    /// transport, even if closing it reports an error. Also abandons a
    /// pending [`connect`](Self::connect).
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        self.attempt.fetch_add(1, Ordering::AcqRel);

        let was_live = self.shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                false
            } else {
                *state = ConnectionState::Closing;
                true
            }
        });

        if let Some(link) = link.take() {
            self.release(link).await;
        }

        if was_live {
            self.shared.state.send_replace(ConnectionState::Disconnected);
            info!("session disconnected");
        } else {
            debug!("disconnect: already disconnected");
        }
    }

    /// Clear the latest message without touching the connection.
    pub fn reset(&self) {
        self.shared.latest.send_if_modified(|latest| latest.take().is_some());
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Returns `true` if the state is `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Observe connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// The most recent successfully parsed inbound envelope.
    pub fn latest_message(&self) -> Option<Envelope> {
        self.shared.latest.borrow().clone()
    }

    /// Observe the latest-message slot. The receiver is marked changed once
    /// per overwrite; values it did not look at in between are lost.
    pub fn subscribe(&self) -> watch::Receiver<Option<Envelope>> {
        self.shared.latest.subscribe()
    }

    /// Stream of inbound envelopes arriving after this call, one per
    /// overwrite of the latest-message slot.
    pub fn inbound(&self) -> InboundMessages {
        InboundMessages {
            rx: self.shared.latest.subscribe(),
        }
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Stop a transport loop, waiting up to `shutdown_timeout` before
    /// aborting it.
    async fn release(&self, link: Link) {
        let Link {
            outbound_tx,
            shutdown_tx,
            mut task,
        } = link;
        drop(outbound_tx);
        let _ = shutdown_tx.send(());

        match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => {
                warn!("transport loop terminated with join error: {join_err}");
            }
            Err(_) => {
                warn!("transport loop did not exit within timeout; aborting task");
                task.abort();
                if let Err(join_err) = task.await {
                    debug!("transport loop aborted: {join_err}");
                }
            }
        }
    }
}

#[cfg(feature = "transport-websocket")]
impl ConnectionManager {
    /// Manager dialing `config.url` over WebSocket, attaching the bearer
    /// token from `auth` when authenticated.
    pub fn websocket(
        config: SessionConfig,
        auth: Option<Arc<dyn crate::auth::AuthSource>>,
    ) -> Self {
        let mut connector = crate::transports::WebSocketConnector::new(config.url.clone());
        if let Some(auth) = auth {
            connector = connector.with_auth(auth);
        }
        Self::new(connector, config)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .field(
                "latest_action",
                &self
                    .shared
                    .latest
                    .borrow()
                    .as_ref()
                    .map(|e| e.action().to_owned()),
            )
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // No executor is available to await a graceful close here; aborting
        // drops the loop future and with it the transport.
        if let Some(link) = self.link.get_mut().take() {
            link.task.abort();
        }
    }
}

// ── Inbound subscription ────────────────────────────────────────────

/// Subscription to the latest-message slot returned by
/// [`ConnectionManager::inbound`].
///
/// Yields each envelope the subscriber observes. If several arrive between
/// two calls to [`next`](Self::next), only the newest is seen. Clearing the
/// slot with [`ConnectionManager::reset`] yields nothing.
#[derive(Debug)]
pub struct InboundMessages {
    rx: watch::Receiver<Option<Envelope>>,
}

impl InboundMessages {
    /// Wait for the next inbound envelope. Returns `None` once the manager
    /// has been dropped.
    pub async fn next(&mut self) -> Option<Envelope> {
        loop {
            self.rx.changed().await.ok()?;
            let latest = self.rx.borrow_and_update().clone();
            if latest.is_some() {
                return latest;
            }
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background loop owning the transport.
///
/// Exits when:
/// - the shutdown signal fires or the outbound channel closes (local close)
/// - the transport returns `None` or an error (server-side close)
/// - a write fails
///
/// The transport is closed exactly once on every exit path, bounded by
/// `close_timeout`. A server-side exit moves the state to `Disconnected`
/// before closing; a local close leaves that to
/// [`ConnectionManager::disconnect`].
async fn transport_loop(
    mut transport: Box<dyn Transport>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    mut shutdown_rx: oneshot::Receiver<()>,
    shared: Arc<Shared>,
    close_timeout: Duration,
) {
    debug!("transport loop started");

    let lost = loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                break false;
            }

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound { frame, flushed }) => {
                        let result = transport.send(frame).await;
                        let failed = result.is_err();
                        if let Err(e) = &result {
                            error!("transport send error: {e}");
                        }
                        let _ = flushed.send(result);
                        if failed {
                            break true;
                        }
                    }
                    None => {
                        debug!("outbound channel closed");
                        break false;
                    }
                }
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(frame)) => publish(&shared, &frame),
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        break true;
                    }
                    None => {
                        debug!("transport closed by server");
                        break true;
                    }
                }
            }
        }
    };

    // The peer is already gone; report it before the close handshake.
    if lost {
        let changed = shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });
        if changed {
            info!("connection lost; not reconnecting");
        }
    }

    match tokio::time::timeout(close_timeout, transport.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("error while closing transport: {e}"),
        Err(_) => warn!("transport close did not finish within timeout; dropping it"),
    }

    debug!("transport loop exited");
}

/// Parse an inbound frame and overwrite the latest-message slot. Malformed
/// frames are dropped and the slot keeps its previous value.
fn publish(shared: &Shared, frame: &str) {
    match Envelope::from_frame(frame) {
        Ok(envelope) => {
            debug!(action = envelope.action(), "inbound envelope");
            shared.latest.send_replace(Some(envelope));
        }
        Err(e) => {
            warn!("dropping inbound frame: {e}");
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// Transport fed by an in-process channel; records what it sends.
    struct ChannelTransport {
        incoming: mpsc::UnboundedReceiver<String>,
        sent: Arc<StdMutex<Vec<String>>>,
        closes: Arc<AtomicUsize>,
        fail_sends: bool,
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&mut self, frame: String) -> Result<()> {
            if self.fail_sends {
                return Err(SessionError::TransportSend("broken pipe".into()));
            }
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            self.incoming.recv().await.map(Ok)
        }

        async fn close(&mut self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct TestConnector {
        server: Arc<StdMutex<Option<mpsc::UnboundedSender<String>>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closes: Arc<AtomicUsize>,
        opened: Arc<AtomicUsize>,
        refuse: bool,
        fail_sends: bool,
    }

    #[async_trait]
    impl Connector for Arc<TestConnector> {
        async fn connect(&self) -> Result<Box<dyn Transport>> {
            if self.refuse {
                return Err(SessionError::Connection("refused".into()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::unbounded_channel();
            *self.server.lock().unwrap() = Some(tx);
            Ok(Box::new(ChannelTransport {
                incoming: rx,
                sent: Arc::clone(&self.sent),
                closes: Arc::clone(&self.closes),
                fail_sends: self.fail_sends,
            }))
        }
    }

    fn manager(connector: &Arc<TestConnector>) -> ConnectionManager {
        ConnectionManager::new(
            Arc::clone(connector),
            SessionConfig::new("ws://test.invalid/ws/user"),
        )
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn starts_disconnected_with_no_message() {
        let connector = Arc::new(TestConnector::default());
        let manager = manager(&connector);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.latest_message().is_none());
        assert_eq!(connector.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn connect_then_disconnect_walks_the_state_machine() {
        let connector = Arc::new(TestConnector::default());
        let manager = manager(&connector);
        let mut states = manager.subscribe_state();

        manager.connect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.is_connected());

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn refused_connect_returns_to_disconnected() {
        let connector = Arc::new(TestConnector {
            refuse: true,
            ..TestConnector::default()
        });
        let manager = manager(&connector);

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn inbound_frames_overwrite_latest_message() {
        let connector = Arc::new(TestConnector::default());
        let manager = manager(&connector);
        manager.connect().await.unwrap();
        let mut latest = manager.subscribe();

        let server = connector.server.lock().unwrap().clone().unwrap();
        server
            .send(r#"{"action":"server_stats","data":{"active_players":2}}"#.into())
            .unwrap();
        latest.changed().await.unwrap();
        assert_eq!(
            latest.borrow_and_update().as_ref().unwrap().action(),
            "server_stats"
        );

        manager.reset();
        assert!(manager.latest_message().is_none());
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.disconnect().await;
    }

    #[tokio::test]
    async fn send_failure_disconnects() {
        let connector = Arc::new(TestConnector {
            fail_sends: true,
            ..TestConnector::default()
        });
        let manager = manager(&connector);
        manager.connect().await.unwrap();

        let err = manager
            .send(&Envelope::bare("server_stats"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::TransportSend(_)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn debug_output_names_state() {
        let connector = Arc::new(TestConnector::default());
        let manager = manager(&connector);
        let out = format!("{manager:?}");
        assert!(out.contains("Disconnected"));
    }
}
