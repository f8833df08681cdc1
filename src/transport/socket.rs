//! WebSocket connection and connection loop.
//!
//! The transport owns at most one socket to the server at a time. It
//! exposes an idempotent [`Transport::connect`], a raw [`Transport::send`]
//! that fails before the connection is open, and a single ordered event
//! channel carrying inbound frames and the close notification.
//!
//! The transport never reconnects on its own: an unexpected close emits
//! [`TransportEvent::Closed`] and the session layer decides what happens
//! next.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Packet;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is open; sends are accepted.
    Open,
    /// No socket; the initial state and the state after any close.
    Closed,
}

// ============================================================================
// TransportEvent
// ============================================================================

/// An event delivered on the transport's inbound channel.
///
/// Frames and the close notification share one channel so their relative
/// order is exactly the order observed on the socket.
#[derive(Debug)]
pub(crate) enum TransportEvent {
    /// A text frame, still unparsed.
    Frame(String),
    /// The connection closed, locally or remotely.
    Closed,
}

// ============================================================================
// Transport
// ============================================================================

/// A single persistent connection to a Cloudlink server.
///
/// Cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    /// Server endpoint.
    endpoint: Url,

    /// Connection state; mutated only by the transport itself, read by
    /// everyone else (the readiness gate polls it).
    state: Mutex<ConnectionState>,

    /// Outbound half of the active connection, when open.
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,

    /// Inbound event channel shared by every connection generation.
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Creates a transport for an endpoint.
    ///
    /// Returns the transport and the receiving end of its event channel.
    /// No connection is attempted until [`Transport::connect`] is called.
    pub(crate) fn new(endpoint: Url) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let transport = Self {
            inner: Arc::new(TransportInner {
                endpoint,
                state: Mutex::new(ConnectionState::Closed),
                outbound: Mutex::new(None),
                events: events_tx,
            }),
        };

        (transport, events_rx)
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Returns `true` if the connection accepts sends.
    #[inline]
    #[must_use]
    pub fn is_sendable(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Establishes the connection.
    ///
    /// Idempotent: calling this while already connecting or open is a
    /// no-op. On failure the state returns to `Closed` and no event is
    /// emitted; the caller owns the retry decision.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the WebSocket handshake fails.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != ConnectionState::Closed {
                trace!(state = ?*state, "connect is a no-op");
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }

        debug!(endpoint = %self.inner.endpoint, "connecting");

        let ws_stream = match connect_async(self.inner.endpoint.as_str()).await {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                *self.inner.state.lock() = ConnectionState::Closed;
                warn!(error = %e, "connect failed");
                return Err(Error::connection(e.to_string()));
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        {
            let mut state = self.inner.state.lock();
            *self.inner.outbound.lock() = Some(outbound_tx);
            *state = ConnectionState::Open;
        }

        debug!(endpoint = %self.inner.endpoint, "connection established");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(Self::run_connection(ws_stream, outbound_rx, inner));

        Ok(())
    }

    /// Writes one packet to the socket.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the connection is not open
    /// - [`Error::Json`] if the packet fails to serialize
    pub fn send(&self, packet: &Packet) -> Result<()> {
        let wire = packet.to_wire()?;

        let outbound = self.inner.outbound.lock();
        let tx = outbound.as_ref().ok_or(Error::NotConnected)?;
        tx.send(Message::Text(wire.into()))
            .map_err(|_| Error::NotConnected)?;

        trace!(cmd = %packet.cmd, "frame queued");
        Ok(())
    }

    /// Closes the connection locally.
    ///
    /// The close notification is still delivered on the event channel, so
    /// listeners observe local and remote closes the same way.
    pub fn close(&self) {
        // Dropping the outbound sender ends the connection loop.
        let dropped = self.inner.outbound.lock().take().is_some();
        if dropped {
            debug!("transport closing");
        }
    }

    /// Connection loop for one socket generation.
    async fn run_connection(
        ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        mut outbound_rx: mpsc::UnboundedReceiver<Message>,
        inner: Arc<TransportInner>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Inbound frames from the server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let frame = TransportEvent::Frame(text.as_str().to_owned());
                            if inner.events.send(frame).is_err() {
                                debug!("event channel closed");
                                break;
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Outbound frames queued by send()
                message = outbound_rx.recv() => {
                    match message {
                        Some(message) => {
                            if let Err(e) = ws_write.send(message).await {
                                warn!(error = %e, "write failed");
                                break;
                            }
                        }

                        None => {
                            // Local close(); say goodbye cleanly.
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        inner.mark_closed();
        let _ = inner.events.send(TransportEvent::Closed);

        debug!("connection loop terminated");
    }
}

impl TransportInner {
    /// Records the end of a socket generation.
    fn mark_closed(&self) {
        let mut state = self.state.lock();
        *self.outbound.lock() = None;
        *state = ConnectionState::Closed;
    }
}

// ============================================================================
// Tests
// ============================================================================
