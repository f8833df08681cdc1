//! Client coordinator: correlation, subscriptions, readiness.
//!
//! The [`Client`] ties the transport to the listener registry. A
//! background dispatch task parses every inbound frame and tests it
//! against all active listeners in registration order; a keepalive task
//! probes the connection on an interval.
//!
//! # Request/Response Correlation
//!
//! The protocol carries no request IDs. A [`Client::send`] therefore
//! registers two one-shot listeners - one for the caller's success shape,
//! one for request-failing `statuscode` envelopes - and races them against
//! a timer. Exactly one of success, error, or timeout resolves each call.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `listeners` | Insertion-ordered listener registry |
//! | `keepalive` | Periodic liveness probing |
//! | `presence` | Live online-user snapshot |

// ============================================================================
// Submodules
// ============================================================================

/// Periodic liveness probing.
pub(crate) mod keepalive;

/// Listener registry and frame dispatch.
pub(crate) mod listeners;

/// Live online-user snapshot.
pub mod presence;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{Packet, Shape};
use crate::transport::{ConnectionState, Transport, TransportEvent};

use listeners::ListenerRegistry;

pub use listeners::ListenerId;
pub use presence::PresenceFeed;

// ============================================================================
// Subscription
// ============================================================================

/// A continuous listener registration.
///
/// Yields every matching inbound frame for as long as the handle lives;
/// dropping it deregisters the listener on its next match.
pub struct Subscription<T> {
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Waits for the next matching frame.
    ///
    /// Returns `None` once the client has been torn down.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Returns the listener id backing this subscription.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

// ============================================================================
// PendingMatch
// ============================================================================

/// A one-shot listener registration.
///
/// Resolves with the first matching inbound frame, then deregisters.
pub struct PendingMatch<T> {
    id: ListenerId,
    rx: oneshot::Receiver<T>,
}

impl<T> PendingMatch<T> {
    /// Waits for the first matching frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] if the client is torn down first.
    pub async fn recv(self) -> Result<T> {
        Ok(self.rx.await?)
    }

    /// Returns the listener id backing this match.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

// ============================================================================
// ConnectionLost
// ============================================================================

/// Receiver for connection-lost notifications.
///
/// Both the transport's close event and the keepalive's dead-connection
/// detection land here.
pub struct ConnectionLost {
    rx: broadcast::Receiver<()>,
}

impl ConnectionLost {
    /// Waits for the next connection loss.
    ///
    /// Returns `false` once the client has been torn down.
    pub async fn recv(&mut self) -> bool {
        match self.rx.recv().await {
            Ok(()) => true,
            // Missing a duplicate signal is fine; the connection is
            // either lost or it is not.
            Err(broadcast::error::RecvError::Lagged(_)) => true,
            Err(broadcast::error::RecvError::Closed) => false,
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Cloudlink client: one connection, shape-correlated requests, and
/// long-lived subscriptions.
///
/// Cheap to clone; all clones share the same connection and listeners.
///
/// # Example
///
/// ```no_run
/// use cloudlink_client::{Client, ClientConfig, Packet, Shape};
/// use serde_json::Value;
///
/// # async fn example() -> cloudlink_client::Result<()> {
/// let config = ClientConfig::parse("wss://api.meower.org/v0/cloudlink")?;
/// let client = Client::new(config)?;
/// client.connect().await?;
///
/// let command = Packet::direct(Packet::new("get_ulist", ""))?;
/// let response: Value = client.send(command, Shape::direct()).await?;
/// println!("{response}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    transport: Transport,
    registry: Arc<ListenerRegistry>,
    lost: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.config.endpoint.as_str())
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Constructor
// ============================================================================

impl Client {
    /// Creates a client and spawns its background tasks.
    ///
    /// Must be called within a tokio runtime. No connection is attempted
    /// until [`Client::connect`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let (transport, events) = Transport::new(config.endpoint.clone());
        let registry = Arc::new(ListenerRegistry::new());
        let (lost_tx, _) = broadcast::channel(8);

        let dispatch = tokio::spawn(Self::run_dispatch(
            events,
            Arc::clone(&registry),
            lost_tx.clone(),
        ));
        let keepalive = keepalive::spawn(transport.clone(), config.ping_interval, lost_tx.clone());

        debug!(endpoint = %config.endpoint, "client created");

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                registry,
                lost: lost_tx,
                tasks: Mutex::new(vec![dispatch, keepalive]),
            }),
        })
    }
}

// ============================================================================
// Client - Connection
// ============================================================================

impl Client {
    /// Establishes the connection. No-op while connecting or open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the handshake fails.
    pub async fn connect(&self) -> Result<()> {
        self.inner.transport.connect().await
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.transport.state()
    }

    /// Returns `true` if the connection accepts sends.
    #[inline]
    #[must_use]
    pub fn is_sendable(&self) -> bool {
        self.inner.transport.is_sendable()
    }

    /// Resolves once the connection is open.
    ///
    /// Polls the connection state at the configured interval; any number
    /// of callers may wait on the same readiness point, with no ordering
    /// guarantee among them.
    pub async fn wait_until_sendable(&self) {
        let mut interval = tokio::time::interval(self.inner.config.poll_interval);
        loop {
            interval.tick().await;
            if self.is_sendable() {
                return;
            }
        }
    }

    /// Subscribes to connection-lost notifications.
    #[must_use]
    pub fn on_connection_lost(&self) -> ConnectionLost {
        ConnectionLost {
            rx: self.inner.lost.subscribe(),
        }
    }

    /// Tears the client down: closes the connection and stops the
    /// background tasks. Pending requests resolve as timeouts.
    pub fn close(&self) {
        debug!("client closing");
        self.inner.transport.close();
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

// ============================================================================
// Client - Requests
// ============================================================================

impl Client {
    /// Sends a request and waits for a shape-matched response, with the
    /// configured default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::Status`] if the server rejects the request
    /// - [`Error::RequestTimeout`] if nothing matches within the timeout
    /// - [`Error::NotConnected`] if the connection drops between the
    ///   readiness gate and the write
    pub async fn send<T: Send + 'static>(&self, command: Packet, success: Shape<T>) -> Result<T> {
        self.send_with_timeout(command, success, self.inner.config.request_timeout)
            .await
    }

    /// Sends a request and waits for a shape-matched response.
    ///
    /// Waits for readiness first, then writes the envelope and races the
    /// success shape, the error shape, and a timer. Exactly one of the
    /// three outcomes resolves this call; later matching frames find the
    /// call gone and are dropped.
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub async fn send_with_timeout<T: Send + 'static>(
        &self,
        command: Packet,
        success: Shape<T>,
        request_timeout: Duration,
    ) -> Result<T> {
        self.wait_until_sendable().await;

        let registry = &self.inner.registry;
        let (success_id, success_rx) = registry.register_once(success);
        let (error_id, error_rx) = registry.register_once(Shape::status_error());

        if let Err(e) = self.inner.transport.send(&command) {
            registry.remove(success_id);
            registry.remove(error_id);
            return Err(e);
        }
        debug!(cmd = %command.cmd, "request sent");

        tokio::select! {
            value = success_rx => {
                registry.remove(error_id);
                Ok(value?)
            }

            status = error_rx => {
                registry.remove(success_id);
                let status = status?;
                debug!(%status, "request rejected");
                Err(Error::status(status))
            }

            () = tokio::time::sleep(request_timeout) => {
                // The two listeners stay registered; their receivers drop
                // with this future, so a late match delivers nothing and
                // gets swept.
                let timeout_ms = request_timeout.as_millis() as u64;
                debug!(timeout_ms, cmd = %command.cmd, "request timed out");
                Err(Error::request_timeout(timeout_ms))
            }
        }
    }
}

// ============================================================================
// Client - Subscriptions
// ============================================================================

impl Client {
    /// Registers a continuous listener for a shape.
    #[must_use]
    pub fn subscribe<T: Send + 'static>(&self, shape: Shape<T>) -> Subscription<T> {
        let (id, rx) = self.inner.registry.register_stream(shape);
        trace!(listener = %id, "continuous listener registered");
        Subscription { id, rx }
    }

    /// Registers a one-shot listener for a shape.
    #[must_use]
    pub fn subscribe_once<T: Send + 'static>(&self, shape: Shape<T>) -> PendingMatch<T> {
        let (id, rx) = self.inner.registry.register_once(shape);
        trace!(listener = %id, "one-shot listener registered");
        PendingMatch { id, rx }
    }

    /// Returns the number of active listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.registry.len()
    }
}

// ============================================================================
// Client - Dispatch Loop
// ============================================================================

impl Client {
    /// Parses inbound frames and feeds them to the registry.
    async fn run_dispatch(
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        registry: Arc<ListenerRegistry>,
        lost: broadcast::Sender<()>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Frame(text) => match Packet::parse(&text) {
                    Some(packet) => {
                        let delivered = registry.dispatch(&packet);
                        trace!(cmd = %packet.cmd, delivered, "frame dispatched");
                    }
                    None => {
                        warn!("dropping malformed frame");
                    }
                },

                TransportEvent::Closed => {
                    debug!("connection lost");
                    let _ = lost.send(());
                }
            }
        }

        debug!("dispatch loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
