//! Session bootstrap and credential replay.
//!
//! A logical session must outlive the socket that carries it. This module
//! owns the state machine that authenticates on startup, re-authenticates
//! after every reconnect using persisted credentials, and escalates to the
//! user only when resuming is hopeless.
//!
//! # State Machine
//!
//! ```text
//!        login / stored credentials
//! Anonymous ──────► Authenticating ──────► Authenticated
//!     ▲                   ▲                     │
//!     │ decline           │ readiness           │ transport close
//!     │                   │                     ▼
//!     └────────────── Reconnecting ◄────────────┘
//! ```
//!
//! # Collaborators
//!
//! Credential persistence and user interaction are external concerns,
//! injected through [`CredentialStore`] and [`UserPrompt`]. The session
//! does not know whether credentials live in `localStorage`, a keychain,
//! or a test fixture, and treats dialogs as awaitable black boxes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::client::{Client, ConnectionLost, Subscription};
use crate::error::{Error, Result};
use crate::protocol::{
    AuthPayload, AuthRequest, AuthResponse, Packet, Relationship, RelationshipPush,
    RelationshipState, Shape, StatusCode,
};

// ============================================================================
// Constants
// ============================================================================

/// Persistence key for the account name.
pub const USERNAME_KEY: &str = "username";

/// Persistence key for the session token.
pub const TOKEN_KEY: &str = "token";

// ============================================================================
// CredentialStore
// ============================================================================

/// Key/value persistence for session credentials.
///
/// Values survive process restarts; the storage mechanism is the
/// implementor's business.
pub trait CredentialStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Writes a value.
    fn set(&self, key: &str, value: &str);

    /// Deletes a value.
    fn remove(&self, key: &str);
}

/// In-memory [`CredentialStore`].
///
/// Nothing survives a restart; useful for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<FxHashMap<String, String>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

// ============================================================================
// UserPrompt
// ============================================================================

/// User-facing interaction points of the resume flow.
#[async_trait]
pub trait UserPrompt: Send + Sync {
    /// Asks whether to retry after a failed re-authentication.
    ///
    /// Returning `false` wipes the stored credentials and triggers
    /// [`UserPrompt::request_reload`].
    async fn confirm_retry_auth(&self, error: &Error) -> bool;

    /// Shows (`true`) or dismisses (`false`) the blocking reconnect
    /// indicator.
    fn set_reconnecting(&self, active: bool);

    /// Requests a full restart of the host application.
    ///
    /// The one deliberately fatal path: a stuck half-authenticated state
    /// is worse than starting over.
    fn request_reload(&self);
}

// ============================================================================
// SessionState
// ============================================================================

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No authenticated identity.
    Anonymous,
    /// An auth call is in flight.
    Authenticating,
    /// Logged in; requests carry this identity.
    Authenticated,
    /// The transport dropped out from under a live session; resume in
    /// progress.
    Reconnecting,
}

// ============================================================================
// Session
// ============================================================================

/// Session coordinator.
///
/// Cheap to clone; all clones share the same state.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use cloudlink_client::{Client, ClientConfig, MemoryCredentialStore, Session};
///
/// # async fn example(prompt: Arc<dyn cloudlink_client::UserPrompt>) -> cloudlink_client::Result<()> {
/// let config = ClientConfig::parse("wss://api.meower.org/v0/cloudlink")?;
/// let client = Client::new(config)?;
/// let session = Session::new(client, Arc::new(MemoryCredentialStore::new()), prompt);
///
/// session.start().await?;
/// let payload = session.login("alice", "secret").await?;
/// println!("blocked: {:?}", session.blocked_users());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: Client,
    store: Arc<dyn CredentialStore>,
    prompt: Arc<dyn UserPrompt>,
    state: Mutex<SessionState>,
    username: Mutex<Option<String>>,
    blocked: Mutex<FxHashSet<String>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("username", &self.username())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Public API
// ============================================================================

impl Session {
    /// Creates a session around a client.
    ///
    /// Nothing happens until [`Session::start`].
    #[must_use]
    pub fn new(
        client: Client,
        store: Arc<dyn CredentialStore>,
        prompt: Arc<dyn UserPrompt>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                client,
                store,
                prompt,
                state: Mutex::new(SessionState::Anonymous),
                username: Mutex::new(None),
                blocked: Mutex::new(FxHashSet::default()),
                watcher: Mutex::new(None),
            }),
        }
    }

    /// Connects and, when credentials are stored, authenticates.
    ///
    /// Also spawns the background watcher that handles connection loss,
    /// relationship pushes, and the server's pre-auth syntax cue.
    ///
    /// On an auth failure the session stays `Anonymous` with credentials
    /// intact; the caller decides whether to retry or fall back to an
    /// interactive login.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the initial connect fails
    /// - Any [`Client::send`] error from the startup auth call
    pub async fn start(&self) -> Result<()> {
        self.spawn_watcher();
        self.inner.client.connect().await?;

        if let Some((username, token)) = self.inner.stored_credentials() {
            debug!(%username, "authenticating with stored credentials");
            self.inner.authenticate(&username, &token).await?;
        }

        Ok(())
    }

    /// Logs in with a username and password.
    ///
    /// On success the returned token is persisted so later resumes never
    /// need the plaintext password again.
    ///
    /// # Errors
    ///
    /// - [`Error::Status`] if the server rejects the credentials
    /// - [`Error::RequestTimeout`] if the server does not answer
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthPayload> {
        self.inner.authenticate(username, password).await
    }

    /// Forgets the identity: wipes stored credentials and local caches.
    ///
    /// The connection itself stays up.
    pub fn logout(&self) {
        self.inner.clear_credentials();
        *self.inner.username.lock() = None;
        self.inner.blocked.lock().clear();
        self.inner.set_state(SessionState::Anonymous);
        info!("logged out");
    }

    /// Returns the current session state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Returns the authenticated username, if any.
    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.inner.username.lock().clone()
    }

    /// Returns the blocked users, sorted.
    #[must_use]
    pub fn blocked_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.inner.blocked.lock().iter().cloned().collect();
        users.sort();
        users
    }

    /// Returns `true` if a user is blocked.
    #[must_use]
    pub fn is_blocked(&self, username: &str) -> bool {
        self.inner.blocked.lock().contains(username)
    }

    /// Stops the background watcher.
    pub fn stop(&self) {
        if let Some(task) = self.inner.watcher.lock().take() {
            task.abort();
        }
    }
}

// ============================================================================
// Session - Watcher
// ============================================================================

impl Session {
    /// Spawns the background watcher once.
    fn spawn_watcher(&self) {
        let mut guard = self.inner.watcher.lock();
        if guard.is_some() {
            return;
        }

        // Register before spawning so no early event slips past.
        let lost = self.inner.client.on_connection_lost();
        let relationships = self.inner.client.subscribe(RelationshipPush::shape());
        let statuses = self.inner.client.subscribe(Shape::status_any());

        let inner = Arc::clone(&self.inner);
        *guard = Some(tokio::spawn(run_watcher(
            inner,
            lost,
            relationships,
            statuses,
        )));
    }
}

/// Reacts to connection loss, relationship pushes, and status cues.
async fn run_watcher(
    inner: Arc<SessionInner>,
    mut lost: ConnectionLost,
    mut relationships: Subscription<RelationshipPush>,
    mut statuses: Subscription<StatusCode>,
) {
    loop {
        tokio::select! {
            alive = lost.recv() => {
                if !alive {
                    break;
                }
                inner.handle_connection_lost().await;
            }

            push = relationships.next() => {
                let Some(push) = push else { break };
                inner.apply_relationship(&push.payload);
            }

            status = statuses.next() => {
                let Some(status) = status else { break };
                inner.handle_status(status).await;
            }
        }
    }

    debug!("session watcher terminated");
}

// ============================================================================
// SessionInner - Authentication
// ============================================================================

impl SessionInner {
    /// Performs one auth call and installs its result.
    async fn authenticate(&self, username: &str, pswd: &str) -> Result<AuthPayload> {
        self.set_state(SessionState::Authenticating);

        let request = AuthRequest::new(username, pswd);
        let packet = Packet::direct(request.to_packet())?;

        match self.client.send(packet, AuthResponse::shape()).await {
            Ok(response) => {
                let payload = response.payload;
                self.store.set(USERNAME_KEY, &payload.username);
                self.store.set(TOKEN_KEY, &payload.token);
                *self.username.lock() = Some(payload.username.clone());
                self.reset_blocked(&payload.relationships);
                self.set_state(SessionState::Authenticated);
                info!(username = %payload.username, "authenticated");
                Ok(payload)
            }

            Err(e) => {
                self.set_state(SessionState::Anonymous);
                warn!(error = %e, "authentication failed");
                Err(e)
            }
        }
    }

    /// Reads the persisted `(username, token)` pair.
    fn stored_credentials(&self) -> Option<(String, String)> {
        let username = self.store.get(USERNAME_KEY)?;
        let token = self.store.get(TOKEN_KEY)?;
        Some((username, token))
    }

    /// Wipes the persisted credentials.
    fn clear_credentials(&self) {
        self.store.remove(USERNAME_KEY);
        self.store.remove(TOKEN_KEY);
        debug!("stored credentials cleared");
    }
}

// ============================================================================
// SessionInner - Resume Flow
// ============================================================================

impl SessionInner {
    /// Handles one connection-loss notification.
    async fn handle_connection_lost(&self) {
        if self.client.is_sendable() {
            trace!("stale loss signal, connection already restored");
            return;
        }

        match self.state() {
            SessionState::Authenticated => {}

            SessionState::Anonymous => {
                // No session to resume; just bring the socket back.
                if let Err(e) = self.client.connect().await {
                    warn!(error = %e, "reconnect failed");
                }
                return;
            }

            SessionState::Authenticating | SessionState::Reconnecting => return,
        }

        self.set_state(SessionState::Reconnecting);
        info!("connection lost, resuming session");

        loop {
            self.prompt.set_reconnecting(true);
            let result = self.resume_once().await;
            self.prompt.set_reconnecting(false);

            match result {
                Ok(()) => break,

                Err(e) => {
                    warn!(error = %e, "session resume failed");
                    if self.prompt.confirm_retry_auth(&e).await {
                        self.set_state(SessionState::Reconnecting);
                        continue;
                    }

                    // Declining wipes the credentials so a stale token can
                    // never loop the user through failing re-auth forever.
                    self.clear_credentials();
                    self.set_state(SessionState::Anonymous);
                    self.prompt.request_reload();
                    break;
                }
            }
        }
    }

    /// One resume attempt: reconnect, wait for readiness, replay the
    /// stored token.
    async fn resume_once(&self) -> Result<()> {
        let (username, token) = self
            .stored_credentials()
            .ok_or_else(|| Error::protocol("no stored credentials"))?;

        self.client.connect().await?;
        self.client.wait_until_sendable().await;
        self.authenticate(&username, &token).await?;
        Ok(())
    }

    /// Reacts to a `statuscode` push.
    async fn handle_status(&self, status: StatusCode) {
        if !status.is_syntax_error() || self.state() != SessionState::Anonymous {
            return;
        }

        // The server never prompts for auth; a syntax complaint before
        // login is its way of saying a handshake is expected.
        let Some((username, token)) = self.stored_credentials() else {
            return;
        };

        debug!("syntax complaint while anonymous, replaying credentials");
        if let Err(e) = self.authenticate(&username, &token).await {
            warn!(error = %e, "credential replay failed");
        }
    }
}

// ============================================================================
// SessionInner - Caches
// ============================================================================

impl SessionInner {
    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = ?*state, to = ?next, "session state changed");
            *state = next;
        }
    }

    /// Rebuilds the blocked-user cache from an auth payload.
    fn reset_blocked(&self, relationships: &[Relationship]) {
        let mut blocked = self.blocked.lock();
        blocked.clear();
        for relationship in relationships {
            if relationship.state == RelationshipState::Blocked {
                blocked.insert(relationship.username.clone());
            }
        }
        debug!(count = blocked.len(), "blocked-user cache rebuilt");
    }

    /// Applies one pushed relationship change.
    fn apply_relationship(&self, relationship: &Relationship) {
        let mut blocked = self.blocked.lock();
        match relationship.state {
            RelationshipState::Blocked => {
                blocked.insert(relationship.username.clone());
            }
            RelationshipState::Removed => {
                blocked.remove(&relationship.username);
            }
        }
        debug!(
            username = %relationship.username,
            state = ?relationship.state,
            "relationship updated"
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
