//! Integration tests for `ConnectionManager`.
//!
//! Uses the channel-based `MockConnector` from `tests/common` to drive the
//! connection state machine, inbound publication and release discipline.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use hangman_session::{
    ConnectionManager, ConnectionState, Envelope, SessionConfig, SessionError,
};
use tokio_test::{assert_err, assert_ok};

use common::{game_started_json, server_stats_json, MockConnector};

fn config() -> SessionConfig {
    SessionConfig::new("ws://mock.invalid/ws/user")
}

/// Wait until the manager reports `target`, failing after one second.
async fn wait_for_state(manager: &ConnectionManager, target: ConnectionState) {
    let mut states = manager.subscribe_state();
    tokio::time::timeout(Duration::from_secs(1), async {
        while *states.borrow_and_update() != target {
            states.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| panic!("state never became {target:?}"));
}

// ════════════════════════════════════════════════════════════════════
// connect()
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn overlapping_connects_open_one_transport() {
    let (connector, probe) = MockConnector::slow(Duration::from_millis(50));
    let manager = ConnectionManager::new(connector, config());

    let (a, b, c) = tokio::join!(manager.connect(), manager.connect(), manager.connect());
    assert_ok!(a);
    assert_ok!(b);
    assert_ok!(c);

    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(probe.opened(), 1);

    // Connecting again while connected is also a no-op.
    assert_ok!(manager.connect().await);
    assert_eq!(probe.opened(), 1);

    manager.disconnect().await;
}

#[tokio::test]
async fn rejected_handshake_returns_to_disconnected() {
    let (connector, probe) = MockConnector::refusing();
    let manager = ConnectionManager::new(connector, config());

    let err = assert_err!(manager.connect().await);
    assert!(matches!(err, SessionError::Connection(_)), "got {err:?}");
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(probe.opened(), 0);
}

#[tokio::test]
async fn slow_handshake_times_out() {
    let (connector, _probe) = MockConnector::slow(Duration::from_millis(500));
    let manager = ConnectionManager::new(
        connector,
        config().with_connect_timeout(Some(Duration::from_millis(20))),
    );

    let err = assert_err!(manager.connect().await);
    assert!(matches!(err, SessionError::Timeout), "got {err:?}");
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn disconnect_abandons_pending_connect() {
    let (connector, probe) = MockConnector::slow(Duration::from_millis(50));
    let manager = Arc::new(ConnectionManager::new(connector, config()));

    let pending = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.state(), ConnectionState::Connecting);

    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(SessionError::Connection(_))), "got {result:?}");
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    // The late transport was opened and immediately released.
    assert_eq!(probe.opened(), 1);
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn reconnect_after_disconnect_opens_new_transport() {
    let (connector, probe) = MockConnector::new();
    let manager = ConnectionManager::new(connector, config());

    assert_ok!(manager.connect().await);
    manager.disconnect().await;
    assert_ok!(manager.connect().await);

    assert_eq!(probe.opened(), 2);
    assert_eq!(manager.state(), ConnectionState::Connected);
    manager.disconnect().await;
}

// ════════════════════════════════════════════════════════════════════
// send()
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn send_while_disconnected_is_rejected_and_not_transmitted() {
    let (connector, probe) = MockConnector::new();
    let manager = ConnectionManager::new(connector, config());

    let err = assert_err!(manager.send(&Envelope::bare("start_game")).await);
    assert!(matches!(err, SessionError::NotConnected));

    assert_ok!(manager.connect().await);
    manager.disconnect().await;

    let err = assert_err!(manager.send(&Envelope::bare("start_game")).await);
    assert!(matches!(err, SessionError::NotConnected));
    assert!(probe.sent().is_empty());
}

#[tokio::test]
async fn send_while_connecting_is_rejected() {
    let (connector, probe) = MockConnector::slow(Duration::from_millis(50));
    let manager = ConnectionManager::new(connector, config());

    let (connected, sent) = tokio::join!(manager.connect(), async {
        manager.send(&Envelope::bare("start_game")).await
    });

    assert_ok!(connected);
    assert!(matches!(sent, Err(SessionError::NotConnected)));
    assert!(probe.sent().is_empty());
    manager.disconnect().await;
}

#[tokio::test]
async fn send_transmits_serialized_envelope() {
    let (connector, probe) = MockConnector::new();
    let manager = ConnectionManager::new(connector, config());
    assert_ok!(manager.connect().await);

    assert_ok!(manager.send(&Envelope::guess_letter("e")).await);
    assert_ok!(manager.send(&Envelope::bare("server_stats")).await);

    assert_eq!(
        probe.sent(),
        vec![
            r#"{"action":"guess_letter","data":{"letter":"e"}}"#.to_string(),
            r#"{"action":"server_stats","data":null}"#.to_string(),
        ]
    );
    manager.disconnect().await;
}

#[tokio::test]
async fn send_times_out_when_flush_stalls() {
    let (connector, probe) = MockConnector::stalled_send();
    let manager = ConnectionManager::new(
        connector,
        config()
            .with_send_timeout(Some(Duration::from_millis(50)))
            .with_shutdown_timeout(Duration::from_millis(100)),
    );
    assert_ok!(manager.connect().await);

    let started = Instant::now();
    let err = assert_err!(manager.send(&Envelope::bare("start_game")).await);
    assert!(matches!(err, SessionError::Timeout), "got {err:?}");
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(probe.sent().is_empty());

    // The loop is stuck in the write; disconnect has to abort it.
    let started = Instant::now();
    manager.disconnect().await;
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

// ════════════════════════════════════════════════════════════════════
// Inbound frames
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn latest_message_is_overwritten_not_queued() {
    let (connector, probe) = MockConnector::new();
    let manager = ConnectionManager::new(connector, config());
    assert_ok!(manager.connect().await);

    let server = probe.server();
    server.push(server_stats_json(1));
    server.push(server_stats_json(2));
    server.push(game_started_json(serde_json::json!({ "word_progress": "***" })));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let latest = manager.latest_message().unwrap();
    assert_eq!(latest.action(), "game_started");
    manager.disconnect().await;
}

#[tokio::test]
async fn malformed_frame_keeps_previous_message() {
    let (connector, probe) = MockConnector::new();
    let manager = ConnectionManager::new(connector, config());
    assert_ok!(manager.connect().await);
    let mut latest = manager.subscribe();

    let server = probe.server();
    server.push(server_stats_json(3));
    latest.changed().await.unwrap();
    let before = latest.borrow_and_update().clone();

    server.push("{not json");
    server.push(r#"{"data":{"letter":"a"}}"#);
    server.push("\u{0}garbage");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!latest.has_changed().unwrap());
    assert_eq!(manager.latest_message(), before);
    assert_eq!(manager.state(), ConnectionState::Connected);
    manager.disconnect().await;
}

#[tokio::test]
async fn inbound_stream_skips_reset() {
    let (connector, probe) = MockConnector::new();
    let manager = ConnectionManager::new(connector, config());
    assert_ok!(manager.connect().await);
    let mut inbound = manager.inbound();

    probe.server().push(server_stats_json(5));
    let first = inbound.next().await.unwrap();
    assert_eq!(first.action(), "server_stats");

    manager.reset();
    assert!(manager.latest_message().is_none());
    assert_eq!(manager.state(), ConnectionState::Connected);

    probe.server().push(r#"{"action":"ping"}"#);
    let second = inbound.next().await.unwrap();
    assert_eq!(second.action(), "ping");
    manager.disconnect().await;
}

// ════════════════════════════════════════════════════════════════════
// Close paths
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn double_disconnect_releases_once() {
    let (connector, probe) = MockConnector::new();
    let manager = ConnectionManager::new(connector, config());
    assert_ok!(manager.connect().await);

    manager.disconnect().await;
    manager.disconnect().await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn disconnect_passes_through_closing() {
    let (connector, _probe) = MockConnector::new();
    let manager = Arc::new(ConnectionManager::new(connector, config()));
    assert_ok!(manager.connect().await);

    let mut states = manager.subscribe_state();
    let seen = tokio::spawn(async move {
        let mut seen = Vec::new();
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            seen.push(state);
            if state == ConnectionState::Disconnected {
                break;
            }
        }
        seen
    });
    tokio::task::yield_now().await;

    manager.disconnect().await;
    let seen = seen.await.unwrap();
    assert!(
        seen.contains(&ConnectionState::Closing),
        "Closing was never observed: {seen:?}"
    );
    assert_eq!(seen.last(), Some(&ConnectionState::Disconnected));
}

#[tokio::test]
async fn close_error_still_releases_transport() {
    let (connector, probe) = MockConnector::failing_close();
    let manager = ConnectionManager::new(connector, config());
    assert_ok!(manager.connect().await);

    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(probe.closes(), 1);

    assert_ok!(manager.connect().await);
    assert_eq!(probe.opened(), 2);
    manager.disconnect().await;
}

#[tokio::test]
async fn server_hang_up_disconnects_without_retry() {
    let (connector, probe) = MockConnector::new();
    let manager = ConnectionManager::new(connector, config());
    assert_ok!(manager.connect().await);

    probe.hang_up();
    wait_for_state(&manager, ConnectionState::Disconnected).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(probe.opened(), 1);
    assert_eq!(probe.closes(), 1);

    let err = assert_err!(manager.send(&Envelope::bare("start_game")).await);
    assert!(matches!(err, SessionError::NotConnected));

    // Explicit disconnect afterwards is harmless and does not close again.
    manager.disconnect().await;
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn disconnect_aborts_close_that_never_finishes() {
    let (connector, probe) = MockConnector::hanging_close();
    let manager = ConnectionManager::new(
        connector,
        config().with_shutdown_timeout(Duration::from_millis(100)),
    );
    assert_ok!(manager.connect().await);

    let started = Instant::now();
    manager.disconnect().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(100), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "returned after {elapsed:?}");
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(probe.closes(), 1);

    // The slot is free again.
    assert_ok!(manager.connect().await);
    assert_eq!(probe.opened(), 2);
}

#[tokio::test]
async fn server_hang_up_reports_disconnected_while_close_hangs() {
    let (connector, probe) = MockConnector::hanging_close();
    let manager = ConnectionManager::new(
        connector,
        config().with_shutdown_timeout(Duration::from_millis(300)),
    );
    assert_ok!(manager.connect().await);

    let started = Instant::now();
    probe.hang_up();
    wait_for_state(&manager, ConnectionState::Disconnected).await;
    assert!(
        started.elapsed() < Duration::from_millis(300),
        "state changed only after the close timeout"
    );

    let started = Instant::now();
    let err = assert_err!(manager.send(&Envelope::bare("guess_letter")).await);
    assert!(matches!(err, SessionError::NotConnected), "got {err:?}");
    assert!(started.elapsed() < Duration::from_millis(50));
    assert!(probe.sent().is_empty());

    let started = Instant::now();
    manager.disconnect().await;
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(probe.closes(), 1);
}
