//! Admin role lookup against `/admin/check`.
//!
//! The answer only decides what the UI shows; the backend enforces access on
//! its own. Every failure therefore reads as "not an admin".

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::api::Backend;

use super::session::{SessionResolver, SessionSnapshot};

pub struct AdminCheck {
    backend: Arc<dyn Backend>,
    resolver: Arc<SessionResolver>,
    /// `(epoch, is_admin)` of the last successful lookup
    last: Mutex<Option<(u64, bool)>>,
    caching: bool,
}

impl AdminCheck {
    pub fn new(backend: Arc<dyn Backend>, resolver: Arc<SessionResolver>, caching: bool) -> Self {
        Self {
            backend,
            resolver,
            last: Mutex::new(None),
            caching,
        }
    }

    /// Whether the session belongs to an admin.
    ///
    /// Answers from the cache when the session has not changed since the last
    /// lookup and caching is enabled.
    pub async fn check(&self, snapshot: &SessionSnapshot) -> bool {
        if !snapshot.session.is_authenticated() {
            return false;
        }
        if let Some(is_admin) = self.cached(snapshot.epoch) {
            debug!(is_admin, "Admin status from cache");
            return is_admin;
        }
        self.fetch(snapshot).await
    }

    /// Bypass the cache and ask the backend again.
    pub async fn refresh(&self, snapshot: &SessionSnapshot) -> bool {
        if !snapshot.session.is_authenticated() {
            return false;
        }
        self.fetch(snapshot).await
    }

    /// Forget the cached answer.
    pub fn invalidate(&self) {
        if let Ok(mut cached) = self.last.lock() {
            *cached = None;
        }
    }

    /// Cached answer for the session at `epoch`, if caching is enabled.
    pub fn cached(&self, epoch: u64) -> Option<bool> {
        if !self.caching {
            return None;
        }
        match *self.last.lock().ok()? {
            Some((cached_epoch, is_admin)) if cached_epoch == epoch => Some(is_admin),
            _ => None,
        }
    }

    async fn fetch(&self, snapshot: &SessionSnapshot) -> bool {
        let Some(token) = snapshot.session.token() else {
            return false;
        };

        match self.backend.admin_check(token).await {
            Ok(status) => {
                // The session may have ended while the request was out
                if self.resolver.epoch() != snapshot.epoch {
                    debug!("Session changed during admin check, discarding result");
                    return false;
                }
                if let Ok(mut cached) = self.last.lock() {
                    *cached = Some((snapshot.epoch, status.is_admin));
                }
                status.is_admin
            }
            Err(e) => {
                warn!(error = %e, "Admin check failed, treating as non-admin");
                if e.is_auth_failure() {
                    self.resolver.invalidate(snapshot.epoch).await;
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{FakeBackend, Reply};
    use crate::auth::credentials::memory::MemoryTokenStore;
    use crate::auth::Session;

    async fn setup(caching: bool) -> (Arc<FakeBackend>, Arc<SessionResolver>, AdminCheck) {
        let store = Arc::new(MemoryTokenStore::with_token("abc"));
        let resolver = Arc::new(SessionResolver::new(store));
        resolver.resolve().await;
        let backend = Arc::new(FakeBackend::new());
        let check = AdminCheck::new(backend.clone(), resolver.clone(), caching);
        (backend, resolver, check)
    }

    #[tokio::test]
    async fn test_unauthenticated_skips_network() {
        let store = Arc::new(MemoryTokenStore::new());
        let resolver = Arc::new(SessionResolver::new(store));
        resolver.resolve().await;
        let backend = Arc::new(FakeBackend::new());
        *backend.is_admin.lock().unwrap() = true;
        let check = AdminCheck::new(backend.clone(), resolver.clone(), true);

        assert!(!check.check(&resolver.snapshot()).await);
        assert_eq!(backend.admin_checks(), 0);
    }

    #[tokio::test]
    async fn test_admin_and_regular() {
        let (backend, resolver, check) = setup(false).await;
        assert!(!check.check(&resolver.snapshot()).await);

        *backend.is_admin.lock().unwrap() = true;
        assert!(check.check(&resolver.snapshot()).await);
        assert_eq!(backend.last_token("admin_check").as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_failure_fails_closed_without_ending_session() {
        let (backend, resolver, check) = setup(true).await;
        *backend.is_admin.lock().unwrap() = true;
        backend.reply("admin_check", Reply::Status(500, "boom"));

        assert!(!check.check(&resolver.snapshot()).await);
        assert!(resolver.current().is_authenticated());

        // Failures are not cached
        assert!(check.check(&resolver.snapshot()).await);
    }

    #[tokio::test]
    async fn test_auth_failure_ends_session() {
        let (backend, resolver, check) = setup(true).await;
        backend.reply("admin_check", Reply::Status(401, ""));

        assert!(!check.check(&resolver.snapshot()).await);
        assert_eq!(resolver.current(), Session::Unauthenticated);
    }

    #[tokio::test]
    async fn test_cached_per_epoch() {
        let (backend, resolver, check) = setup(true).await;
        *backend.is_admin.lock().unwrap() = true;

        assert!(check.check(&resolver.snapshot()).await);
        assert!(check.check(&resolver.snapshot()).await);
        assert_eq!(backend.admin_checks(), 1);

        // A new session means a new lookup
        resolver.logout().await.unwrap();
        resolver.login("def".to_string()).await.unwrap();
        assert!(check.check(&resolver.snapshot()).await);
        assert_eq!(backend.admin_checks(), 2);

        // Explicit refresh always asks
        assert!(check.refresh(&resolver.snapshot()).await);
        assert_eq!(backend.admin_checks(), 3);

        check.invalidate();
        assert!(check.check(&resolver.snapshot()).await);
        assert_eq!(backend.admin_checks(), 4);
    }

    #[tokio::test]
    async fn test_caching_disabled_asks_every_time() {
        let (backend, resolver, check) = setup(false).await;
        check.check(&resolver.snapshot()).await;
        check.check(&resolver.snapshot()).await;
        assert_eq!(backend.admin_checks(), 2);
    }

    #[tokio::test]
    async fn test_result_after_logout_is_discarded() {
        let (backend, resolver, check) = setup(true).await;
        let check = Arc::new(check);
        *backend.is_admin.lock().unwrap() = true;
        let gate = backend.gate();

        let snapshot = resolver.snapshot();
        let pending = {
            let check = check.clone();
            tokio::spawn(async move { check.check(&snapshot).await })
        };

        backend.entered.notified().await;
        resolver.logout().await.unwrap();
        gate.notify_one();

        assert!(!pending.await.unwrap());
        *backend.gate.lock().unwrap() = None;

        // Nothing was cached for the old session either
        resolver.login("abc".to_string()).await.unwrap();
        *backend.is_admin.lock().unwrap() = false;
        assert!(!check.check(&resolver.snapshot()).await);
        assert_eq!(backend.admin_checks(), 2);
    }
}
