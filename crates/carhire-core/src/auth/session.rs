//! Session state and its resolution from the credential store.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

use super::credentials::{CredentialStore, StorageError};

/// Whether the user is logged in.
///
/// The bearer token lives inside `Authenticated`, so a token exists exactly
/// when the session is authenticated.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Session {
    /// Resolution from storage has not finished yet.
    #[default]
    Unknown,
    Unauthenticated,
    Authenticated { token: String },
}

/// The state of a [`Session`] without its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unknown,
    Unauthenticated,
    Authenticated,
}

impl Session {
    pub fn state(&self) -> SessionState {
        match self {
            Session::Unknown => SessionState::Unknown,
            Session::Unauthenticated => SessionState::Unauthenticated,
            Session::Authenticated { .. } => SessionState::Authenticated,
        }
    }

    /// Get the bearer token if authenticated
    pub fn token(&self) -> Option<&str> {
        match self {
            Session::Authenticated { token } => Some(token),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }
}

// Tokens never end up in logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.state(), f)
    }
}

/// A session together with the number of transitions that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub session: Session,
    /// Incremented on every state change; used to drop results that belong
    /// to an earlier session.
    pub epoch: u64,
}

/// Owns the in-memory session and the one path that mutates it.
///
/// Storage is read once per process by [`resolve`](Self::resolve). Afterwards
/// only `login`, `logout` and `invalidate` change the state, and each applies
/// its change before returning.
pub struct SessionResolver {
    store: Arc<dyn CredentialStore>,
    state: watch::Sender<SessionSnapshot>,
    resolved: OnceCell<()>,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            store,
            state,
            resolved: OnceCell::new(),
        }
    }

    /// Resolve the session from storage on first call; later calls return the
    /// in-memory state. Concurrent first callers share a single store read.
    pub async fn resolve(&self) -> Session {
        self.resolved
            .get_or_init(|| async {
                let next = match self.store.load().await {
                    Ok(Some(token)) => {
                        debug!("Stored token found");
                        Session::Authenticated { token }
                    }
                    Ok(None) => {
                        debug!("No stored token");
                        Session::Unauthenticated
                    }
                    Err(e) => {
                        warn!(error = %e, "Credential store unreadable, treating as logged out");
                        Session::Unauthenticated
                    }
                };

                // A login/logout that raced ahead of the load wins
                self.state.send_if_modified(|snap| {
                    if snap.session != Session::Unknown {
                        return false;
                    }
                    snap.session = next;
                    snap.epoch += 1;
                    true
                });
            })
            .await;

        self.current()
    }

    /// Current session without touching storage.
    pub fn current(&self) -> Session {
        self.state.borrow().session.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    /// Receiver notified on every session transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Persist a freshly issued token and mark the session authenticated.
    ///
    /// If the token cannot be persisted the session is left unauthenticated.
    pub async fn login(&self, token: String) -> Result<(), StorageError> {
        self.apply_login(token, None).await.map(|_| ())
    }

    /// Like [`login`](Self::login), for a token whose request was sent while
    /// the session was at `seen_epoch`.
    ///
    /// If the session changed in the meantime (a logout landed while the
    /// request was in flight), the token is discarded and `Ok(false)` is
    /// returned.
    pub async fn login_since(
        &self,
        token: String,
        seen_epoch: u64,
    ) -> Result<bool, StorageError> {
        self.apply_login(token, Some(seen_epoch)).await
    }

    async fn apply_login(
        &self,
        token: String,
        seen_epoch: Option<u64>,
    ) -> Result<bool, StorageError> {
        if seen_epoch.is_some_and(|seen| seen != self.epoch()) {
            debug!("Session changed before login completed, token discarded");
            return Ok(false);
        }

        let saved = self.store.save(&token).await;
        self.mark_resolved();

        match saved {
            Ok(()) => {
                if self.transition_since(seen_epoch, Session::Authenticated { token }) {
                    info!("Session authenticated");
                    return Ok(true);
                }
                // Lost a race with logout during the save
                debug!("Session changed while saving token, token discarded");
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "Failed to clear discarded token");
                }
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist token, staying logged out");
                self.transition_since(seen_epoch, Session::Unauthenticated);
                Err(e)
            }
        }
    }

    /// Drop the session in memory, then clear it from storage.
    ///
    /// The in-memory state is unauthenticated even when clearing fails.
    /// Always starts a new epoch, so logins still in flight are discarded.
    pub async fn logout(&self) -> Result<(), StorageError> {
        self.mark_resolved();
        self.state.send_modify(|snap| {
            snap.session = Session::Unauthenticated;
            snap.epoch += 1;
        });
        info!("Logged out");
        self.store.clear().await.map_err(|e| {
            warn!(error = %e, "Failed to clear stored token");
            e
        })
    }

    /// End the session after the backend rejected its token.
    ///
    /// `seen_epoch` is the epoch the failing request was issued under; if the
    /// session changed since (for example a fresh login), nothing happens.
    /// Returns whether the session was invalidated.
    pub async fn invalidate(&self, seen_epoch: u64) -> bool {
        let ended = self.state.send_if_modified(|snap| {
            if snap.epoch != seen_epoch || !snap.session.is_authenticated() {
                return false;
            }
            snap.session = Session::Unauthenticated;
            snap.epoch += 1;
            true
        });
        if !ended {
            debug!(seen_epoch, "Stale auth failure ignored");
            return false;
        }

        warn!("Backend rejected token, session ended");
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear rejected token");
        }
        true
    }

    fn mark_resolved(&self) {
        // Err only means resolution already happened
        let _ = self.resolved.set(());
    }

    /// Apply `next` unless the epoch moved past `seen_epoch`. Returns false
    /// only when the transition was refused as stale.
    fn transition_since(&self, seen_epoch: Option<u64>, next: Session) -> bool {
        let mut current = true;
        self.state.send_if_modified(|snap| {
            if seen_epoch.is_some_and(|seen| seen != snap.epoch) {
                current = false;
                return false;
            }
            if snap.session == next {
                return false;
            }
            debug!(from = ?snap.session, to = ?next, "Session transition");
            snap.session = next;
            snap.epoch += 1;
            true
        });
        current
    }
}
