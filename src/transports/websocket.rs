//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries the game's JSON text frames over a
//! WebSocket connection; `ws://` and `wss://` URLs are both supported via
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//! [`WebSocketConnector`] opens one per
//! [`ConnectionManager::connect`](crate::connection::ConnectionManager::connect),
//! attaching the bearer token from the auth collaborator.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is
//! enabled (it is enabled by default).

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::auth::AuthSource;
use crate::error::SessionError;
use crate::transport::{Connector, Transport};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn connection_error(e: tungstenite::Error) -> SessionError {
    SessionError::Connection(e.to_string())
}

/// A [`Transport`] backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future before it
/// completes does not consume a message.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url` without credentials.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] if the URL is invalid or the
    /// handshake fails.
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        Self::connect_with_token(url, None).await
    }

    /// Open a WebSocket connection to `url`, sending
    /// `Authorization: Bearer <token>` when a token is given.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] if the URL or token is invalid or
    /// the handshake fails.
    pub async fn connect_with_token(url: &str, token: Option<&str>) -> Result<Self, SessionError> {
        tracing::debug!(url = %url, authenticated = token.is_some(), "connecting to WebSocket server");

        let mut request = url.into_client_request().map_err(connection_error)?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| SessionError::Connection(format!("invalid bearer token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(connection_error)?;

        tracing::info!(url = %url, "WebSocket connection established");

        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket stream, e.g. one opened with
    /// custom TLS or proxy settings.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::TransportClosed);
        }
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(SessionError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // tungstenite answers pings itself.
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(SessionError::TransportSend(e.to_string())),
        }
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Opens a [`WebSocketTransport`] to a fixed URL.
#[derive(Clone)]
pub struct WebSocketConnector {
    url: String,
    auth: Option<Arc<dyn AuthSource>>,
}

impl WebSocketConnector {
    /// Connector for `url` without credentials.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth: None,
        }
    }

    /// Attach the bearer token from `auth` while it reports authenticated.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthSource>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// The URL this connector dials.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for WebSocketConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnector")
            .field("url", &self.url)
            .field("has_auth", &self.auth.is_some())
            .finish()
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, SessionError> {
        let token = self
            .auth
            .as_ref()
            .filter(|auth| auth.is_authenticated())
            .and_then(|auth| auth.token());
        let transport = WebSocketTransport::connect_with_token(&self.url, token.as_deref()).await?;
        Ok(Box::new(transport))
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
    use crate::connection::{ConnectionManager, ConnectionState};
    use crate::protocol::Envelope;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
    }

    // ── Mock-server helpers ─────────────────────────────────────────

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    // ── Mock-server tests ───────────────────────────────────────────

    #[tokio::test]
    async fn recv_receives_text_frames_and_skips_binary() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"action":"ping"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"action":"ping"}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, SessionError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_sends_bearer_token() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (header_tx, header_rx) = tokio::sync::oneshot::channel::<Option<String>>();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let header = req
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let _ = header_tx.send(header);
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let auth = Arc::new(StaticAuth::new(Some("s3cret".into())));
        let connector = WebSocketConnector::new(url).with_auth(auth);
        let mut transport = connector.connect().await.unwrap();

        assert_eq!(header_rx.await.unwrap().as_deref(), Some("Bearer s3cret"));
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn manager_round_trip_over_websocket() {
        let url = start_mock_server(|mut ws| async move {
            // Answer the first request with a snapshot, then hold the socket.
            if let Some(Ok(Message::Text(_))) = ws.next().await {
                ws.send(Message::Text(
                    r#"{"action":"game_started","data":{"word_progress":"****","tries_left":5}}"#
                        .into(),
                ))
                .await
                .unwrap();
            }
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let manager = ConnectionManager::websocket(SessionConfig::new(url), None);
        let mut latest = manager.subscribe();

        manager.connect().await.unwrap();
        manager.send(&Envelope::bare("start_game")).await.unwrap();

        latest.changed().await.unwrap();
        assert_eq!(
            latest.borrow_and_update().as_ref().unwrap().action(),
            "game_started"
        );

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn server_close_moves_manager_to_disconnected() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let manager = ConnectionManager::websocket(SessionConfig::new(url), None);
        let mut states = manager.subscribe_state();
        manager.connect().await.unwrap();

        while *states.borrow_and_update() != ConnectionState::Disconnected {
            states.changed().await.unwrap();
        }
        assert!(!manager.is_connected());
    }
}
