//! Periodic liveness probing.
//!
//! While the connection is open, a `{ "cmd": "ping", "val": "" }` envelope
//! is written on a fixed interval. No reply is awaited; the ping exists to
//! detect silently-dead connections faster than the transport's own
//! timeout and to keep intermediary proxies from closing an idle socket.
//!
//! When a tick finds the connection dead, the keepalive reports it on the
//! connection-lost channel and leaves the reconnect decision to the
//! session layer.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::protocol::Packet;
use crate::transport::{ConnectionState, Transport};

// ============================================================================
// Keepalive Task
// ============================================================================

/// Spawns the keepalive loop.
pub(crate) fn spawn(
    transport: Transport,
    interval: Duration,
    lost: broadcast::Sender<()>,
) -> JoinHandle<()> {
    tokio::spawn(run(transport, interval, lost))
}

async fn run(transport: Transport, interval: Duration, lost: broadcast::Sender<()>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Tracks whether the previous tick saw a live connection, so a dead
    // socket is reported once rather than on every tick.
    let mut was_open = false;

    loop {
        ticker.tick().await;

        match transport.state() {
            ConnectionState::Open => match transport.send(&Packet::ping()) {
                Ok(()) => {
                    trace!("ping sent");
                    was_open = true;
                }
                Err(e) => {
                    // The send raced a close; treat it as a dead connection.
                    debug!(error = %e, "ping failed");
                    if was_open {
                        let _ = lost.send(());
                    }
                    was_open = false;
                }
            },

            ConnectionState::Closed => {
                if was_open {
                    debug!("dead connection detected at ping tick");
                    let _ = lost.send(());
                }
                was_open = false;
            }

            ConnectionState::Connecting => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::TestServer;

    #[tokio::test]
    async fn test_pings_flow_while_open() {
        let server = TestServer::bind().await;
        let (transport, _events) = Transport::new(server.url());

        let (mut conn, ()) = tokio::join!(server.accept(), async {
            transport.connect().await.expect("connect");
        });

        let (lost_tx, _lost_rx) = broadcast::channel(8);
        let task = spawn(transport, Duration::from_millis(20), lost_tx);

        let frame = conn.recv_json().await;
        assert_eq!(frame["cmd"], "ping");
        assert_eq!(frame["val"], "");

        task.abort();
    }

    #[tokio::test]
    async fn test_dead_connection_reported_once() {
        let server = TestServer::bind().await;
        let (transport, _events) = Transport::new(server.url());

        let (conn, ()) = tokio::join!(server.accept(), async {
            transport.connect().await.expect("connect");
        });

        let (lost_tx, mut lost_rx) = broadcast::channel(8);
        let task = spawn(transport, Duration::from_millis(20), lost_tx);

        // Let at least one ping tick observe the open connection.
        conn.recv_json().await;
        conn.close().await;

        lost_rx.recv().await.expect("lost signal");

        // Further ticks stay quiet while the connection remains closed.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(lost_rx.try_recv().is_err());

        task.abort();
    }

    #[tokio::test]
    async fn test_no_pings_while_closed() {
        let server = TestServer::bind().await;
        let (transport, _events) = Transport::new(server.url());

        let (lost_tx, mut lost_rx) = broadcast::channel(8);
        let task = spawn(transport, Duration::from_millis(20), lost_tx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(lost_rx.try_recv().is_err());

        task.abort();
    }
}
