//! Scripted in-process server for integration tests.
//!
//! Binds a real TCP listener and speaks WebSocket on the accept side, so
//! tests exercise the same socket path as production.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use url::Url;

// ============================================================================
// TestServer
// ============================================================================

/// A listening endpoint that upgrades connections to WebSocket.
pub(crate) struct TestServer {
    listener: TcpListener,
    url: Url,
}

impl TestServer {
    /// Binds to a random localhost port.
    pub async fn bind() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let url = Url::parse(&format!("ws://127.0.0.1:{port}")).expect("url");
        Self { listener, url }
    }

    /// Returns the server's `ws://` URL.
    pub fn url(&self) -> Url {
        self.url.clone()
    }

    /// Accepts one connection and completes the WebSocket handshake.
    pub async fn accept(&self) -> ServerConn {
        let (stream, _addr) = self.listener.accept().await.expect("accept");
        let ws = accept_async(stream).await.expect("upgrade");
        ServerConn { ws }
    }
}

// ============================================================================
// ServerConn
// ============================================================================

/// The server side of one accepted connection.
pub(crate) struct ServerConn {
    ws: WebSocketStream<TcpStream>,
}

impl ServerConn {
    /// Sends a JSON value as a text frame.
    pub async fn send_json(&mut self, value: &Value) {
        self.ws
            .send(Message::Text(value.to_string().into()))
            .await
            .expect("server send");
    }

    /// Sends a raw text frame, valid JSON or not.
    pub async fn send_text(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("server send");
    }

    /// Receives the next text frame as JSON.
    pub async fn recv_json(&mut self) -> Value {
        loop {
            let message = self
                .ws
                .next()
                .await
                .expect("connection open")
                .expect("frame");
            if let Message::Text(text) = message {
                return serde_json::from_str(text.as_str()).expect("json frame");
            }
        }
    }

    /// Receives the next non-ping JSON frame.
    pub async fn recv_non_ping(&mut self) -> Value {
        loop {
            let frame = self.recv_json().await;
            if frame["cmd"] != "ping" {
                return frame;
            }
        }
    }

    /// Closes the connection.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Initializes test logging from `RUST_LOG`, once per process.
fn init_tracing() {
    use std::sync::Once;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Polls a condition until it holds or a 2s deadline passes.
pub(crate) async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
