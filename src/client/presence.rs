//! Live online-user snapshot.
//!
//! The server pushes the full online list unsolicited; this feed keeps
//! the latest snapshot available synchronously.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::protocol::ulist_shape;

use super::Client;

// ============================================================================
// PresenceFeed
// ============================================================================

/// Continuously updated view of who is online.
///
/// Seeded empty; each `ulist` push replaces the whole snapshot.
pub struct PresenceFeed {
    online: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl PresenceFeed {
    /// Attaches a presence feed to a client.
    #[must_use]
    pub fn attach(client: &Client) -> Self {
        let mut subscription = client.subscribe(ulist_shape());
        let online = Arc::new(Mutex::new(Vec::new()));

        let snapshot = Arc::clone(&online);
        let task = tokio::spawn(async move {
            while let Some(users) = subscription.next().await {
                trace!(count = users.len(), "presence updated");
                *snapshot.lock() = users;
            }
        });

        Self { online, task }
    }

    /// Returns the latest online-user snapshot.
    #[must_use]
    pub fn online_users(&self) -> Vec<String> {
        self.online.lock().clone()
    }

    /// Returns `true` if a user is in the latest snapshot.
    #[must_use]
    pub fn is_online(&self, username: &str) -> bool {
        self.online.lock().iter().any(|user| user == username)
    }

    /// Stops tracking.
    pub fn detach(&self) {
        self.task.abort();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::config::ClientConfig;
    use crate::testutil::{TestServer, wait_until};

    #[tokio::test]
    async fn test_feed_tracks_ulist_pushes() {
        let server = TestServer::bind().await;
        let client = Client::new(ClientConfig::new(server.url())).expect("client");
        let feed = PresenceFeed::attach(&client);

        assert!(feed.online_users().is_empty());

        let (mut conn, ()) = tokio::join!(server.accept(), async {
            client.connect().await.expect("connect");
        });

        conn.send_json(&json!({ "cmd": "ulist", "val": "alice;bob;" }))
            .await;
        wait_until("first ulist", || feed.online_users().len() == 2).await;
        assert!(feed.is_online("alice"));
        assert!(feed.is_online("bob"));

        conn.send_json(&json!({ "cmd": "ulist", "val": ";" })).await;
        wait_until("empty ulist", || feed.online_users().is_empty()).await;
        assert!(!feed.is_online("alice"));

        feed.detach();
        client.close();
    }
}
