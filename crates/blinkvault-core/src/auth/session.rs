//! Session lifecycle: who is signed in, and the only writer of the
//! persisted token.
//!
//! State lives in a single `watch` value so the token and the current user
//! are always replaced together; readers never see one without the other
//! changing in step. Every mutation publishes before the mutating call
//! returns.
//!
//! ```text
//!  new() ──→ [bootstrapping] ──bootstrap()──→ [signed in] ⇄ [signed out]
//!                                               login() / logout()
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::api::{ApiError, ApiRequest, RequestPipeline, Transport};
use crate::models::user::MeResponse;
use crate::models::UserSummary;

use super::TokenStore;

/// Identity endpoint used to restore a session from a persisted token
pub const IDENTITY_PATH: &str = "/users/me";

/// Buffered session events per subscriber
const EVENT_CAPACITY: usize = 16;

#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub token: Option<String>,
    pub current_user: Option<UserSummary>,
    pub is_bootstrapping: bool,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.current_user.is_some()
    }
}

impl fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("current_user", &self.current_user.as_ref().map(|u| &u.id))
            .field("is_bootstrapping", &self.is_bootstrapping)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    /// Explicit sign-out.
    UserRequested,
    /// The persisted token could not be turned into a session at startup.
    BootstrapFailed,
    /// Refresh-and-retry was exhausted; consumers should route to sign-in.
    SessionExpired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Restored,
    SignedIn,
    TokenRefreshed,
    SignedOut { reason: SignOutReason },
}

pub struct SessionManager {
    state: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    store: Arc<dyn TokenStore>,
    bootstrap_started: AtomicBool,
    /// Set while bootstrap's identity request is in flight.
    restoring: AtomicBool,
}

impl SessionManager {
    /// Create the session with whatever token the store holds.
    /// A store that cannot be read counts as holding no token.
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        let token = match store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted token");
                None
            }
        };
        debug!(has_token = token.is_some(), "Session created");

        let (state, _) = watch::channel(SessionSnapshot {
            token,
            current_user: None,
            is_bootstrapping: true,
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            state,
            events,
            store,
            bootstrap_started: AtomicBool::new(false),
            restoring: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Restore the session from the persisted token. Runs once; later calls
    /// return immediately.
    ///
    /// Never fails: any problem resolves to the signed-out state.
    pub async fn bootstrap<T: Transport>(&self, pipeline: &RequestPipeline<T>) {
        if self.bootstrap_started.swap(true, Ordering::SeqCst) {
            debug!("Bootstrap already ran");
            return;
        }

        if self.token().is_none() {
            debug!("No persisted token, starting signed out");
            self.state.send_modify(|s| s.is_bootstrapping = false);
            return;
        }

        self.restoring.store(true, Ordering::SeqCst);
        let identity = Self::fetch_identity(pipeline).await;
        self.restoring.store(false, Ordering::SeqCst);

        match identity {
            Ok(user) => {
                info!(user_id = %user.id, "Session restored");
                self.state.send_modify(|s| {
                    s.current_user = Some(user);
                    s.is_bootstrapping = false;
                });
                self.emit(SessionEvent::Restored);
            }
            Err(e) => {
                // A rejected refresh has already signed out (as a failed
                // restore); otherwise the stored token is dropped here.
                warn!(error = %e, "Auto-login failed, signing out");
                self.sign_out(SignOutReason::BootstrapFailed);
                self.state.send_modify(|s| s.is_bootstrapping = false);
            }
        }
    }

    async fn fetch_identity<T: Transport>(
        pipeline: &RequestPipeline<T>,
    ) -> Result<UserSummary, ApiError> {
        let response = pipeline.send(ApiRequest::get(IDENTITY_PATH)).await?;
        let me: MeResponse = response.json()?;
        match me.user {
            Some(user) if user.has_identity() => Ok(user),
            _ => Err(ApiError::InvalidResponse("User data incomplete".to_string())),
        }
    }

    /// Record the result of a successful authentication exchange.
    pub fn login(&self, user: UserSummary, token: String) {
        info!(user_id = %user.id, "Signed in");
        self.state.send_modify(|s| {
            self.persist(&token);
            s.token = Some(token);
            s.current_user = Some(user);
        });
        self.emit(SessionEvent::SignedIn);
    }

    /// Sign out. Calling this while signed out changes nothing.
    pub fn logout(&self) {
        self.sign_out(SignOutReason::UserRequested);
    }

    /// Sign out after the request pipeline gave up on the credential.
    /// During bootstrap's identity request this is a failed restore, not an
    /// expiry.
    pub(crate) fn expire(&self) {
        let reason = if self.restoring.load(Ordering::SeqCst) {
            SignOutReason::BootstrapFailed
        } else {
            SignOutReason::SessionExpired
        };
        self.sign_out(reason);
    }

    fn sign_out(&self, reason: SignOutReason) {
        // Store writes happen under the state lock so they stay ordered
        // with the in-memory state.
        let changed = self.state.send_if_modified(|s| {
            self.clear_store();
            if s.token.is_none() && s.current_user.is_none() {
                return false;
            }
            s.token = None;
            s.current_user = None;
            true
        });
        if changed {
            info!(?reason, "Signed out");
            self.emit(SessionEvent::SignedOut { reason });
        }
    }

    /// Swap in a refreshed token, but only while the session still holds
    /// the token the server rejected. Returns false (and persists nothing)
    /// when the session was signed out or already moved on to another token.
    /// The current user is untouched.
    pub(crate) fn replace_token(&self, rejected: &str, token: String) -> bool {
        let replaced = self.state.send_if_modified(|s| {
            if s.token.as_deref() != Some(rejected) {
                return false;
            }
            self.persist(&token);
            s.token = Some(token);
            true
        });
        if replaced {
            self.emit(SessionEvent::TokenRefreshed);
        } else {
            debug!("Session changed during refresh, discarding refreshed token");
        }
        replaced
    }

    /// Apply a local edit to the signed-in user (e.g. after a follow toggle).
    /// Returns false when nobody is signed in.
    pub fn update_user(&self, edit: impl FnOnce(&mut UserSummary)) -> bool {
        self.state.send_if_modified(|s| match s.current_user.as_mut() {
            Some(user) => {
                edit(user);
                true
            }
            None => false,
        })
    }

    fn persist(&self, token: &str) {
        if let Err(e) = self.store.save(token) {
            warn!(error = %e, "Failed to persist token");
        }
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to remove persisted token");
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // =========================================================================
    // Observers
    // =========================================================================

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    pub fn current_user(&self) -> Option<UserSummary> {
        self.state.borrow().current_user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_bootstrapping(&self) -> bool {
        self.state.borrow().is_bootstrapping
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Receiver for discrete lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Wait until the initial restore attempt has resolved.
    pub async fn ready(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as self, so this only ends when ready
        let _ = rx.wait_for(|s| !s.is_bootstrapping).await;
    }
}
