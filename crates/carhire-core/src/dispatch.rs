//! Action dispatcher: guarded, single-flight backend calls with one outcome type.
//!
//! Every call site handles the same four [`ActionOutcome`]s. A call that never
//! reaches the backend (already in flight, or refused by the guard) comes back
//! as a [`Refusal`] instead.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::api::ApiError;
use crate::auth::{SessionResolver, StorageError};
use crate::guard::{GuardDecision, Requirement, ScreenGuard};
use crate::models::ValidationError;

/// User-visible result of a dispatched action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome<T> {
    Success(T),
    /// Bad input; shown inline, the session is untouched.
    ValidationFailure(String),
    /// The token was missing or rejected, or the session ended mid-call; the
    /// session is over either way.
    AuthFailure,
    /// Backend unreachable or misbehaving; shown as an alert, no retry.
    NetworkFailure(String),
}

impl<T> ActionOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ActionOutcome<U> {
        match self {
            ActionOutcome::Success(v) => ActionOutcome::Success(f(v)),
            ActionOutcome::ValidationFailure(m) => ActionOutcome::ValidationFailure(m),
            ActionOutcome::AuthFailure => ActionOutcome::AuthFailure,
            ActionOutcome::NetworkFailure(m) => ActionOutcome::NetworkFailure(m),
        }
    }
}

/// Why an action was not dispatched at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// The same control already has a call in flight.
    InFlight,
    /// The guard did not allow the action.
    Guard(GuardDecision),
}

pub type Dispatched<T> = Result<ActionOutcome<T>, Refusal>;

/// Failure reported by an action body.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The session changed (logout) while the call was in flight.
    #[error("Session changed while the request was in flight")]
    SessionChanged,
}

impl From<ValidationError> for ActionError {
    fn from(e: ValidationError) -> Self {
        ActionError::Invalid(e.to_string())
    }
}

/// In-flight marker for one control (a button).
#[derive(Debug, Default)]
pub struct PendingAction {
    in_flight: AtomicBool,
}

impl PendingAction {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether the control should currently be disabled.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Mark the action in flight, unless it already is.
    pub fn try_begin(self: &Arc<Self>) -> Option<InFlight> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight {
                pending: Arc::clone(self),
            })
    }
}

/// Clears the in-flight flag when dropped: on success, failure, panic, or
/// when the dispatching future is cancelled.
#[derive(Debug)]
pub struct InFlight {
    pending: Arc<PendingAction>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.pending.in_flight.store(false, Ordering::Release);
    }
}

pub struct Dispatcher {
    resolver: Arc<SessionResolver>,
    guard: Arc<ScreenGuard>,
}

impl Dispatcher {
    pub fn new(resolver: Arc<SessionResolver>, guard: Arc<ScreenGuard>) -> Self {
        Self { resolver, guard }
    }

    /// Run a mutating action guarded by `requirement` and `pending`.
    ///
    /// The action receives the bearer token of the session it runs under.
    pub async fn run<T, F, Fut>(
        &self,
        requirement: Requirement,
        pending: &Arc<PendingAction>,
        action: F,
    ) -> Dispatched<T>
    where
        F: FnOnce(Option<String>) -> Fut,
        Fut: Future<Output = Result<T, ActionError>>,
    {
        let Some(flight) = pending.try_begin() else {
            debug!(?requirement, "Action already in flight, ignoring");
            return Err(Refusal::InFlight);
        };
        let result = self.fetch(requirement, action).await;
        drop(flight);
        result
    }

    /// Run a read-only call: guarded and translated, without a pending flag.
    pub async fn fetch<T, F, Fut>(&self, requirement: Requirement, action: F) -> Dispatched<T>
    where
        F: FnOnce(Option<String>) -> Fut,
        Fut: Future<Output = Result<T, ActionError>>,
    {
        let decision = self.guard.guard(requirement).await;
        if !decision.is_allowed() {
            debug!(?requirement, ?decision, "Action refused by guard");
            return Err(Refusal::Guard(decision));
        }

        let snapshot = self.resolver.snapshot();
        let token = snapshot.session.token().map(str::to_string);
        let result = action(token).await;
        Ok(self.translate(result, snapshot.epoch).await)
    }

    /// Run an action on its own task and deliver the result over a channel.
    ///
    /// The pending flag is taken before this returns, so a second tap is
    /// refused immediately. If the receiver has been dropped by the time the
    /// action finishes, the result is discarded.
    pub fn spawn<T, F, Fut>(
        self: &Arc<Self>,
        requirement: Requirement,
        pending: &Arc<PendingAction>,
        action: F,
    ) -> oneshot::Receiver<Dispatched<T>>
    where
        T: Send + 'static,
        F: FnOnce(Option<String>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ActionError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let Some(flight) = pending.try_begin() else {
            debug!(?requirement, "Action already in flight, ignoring");
            let _ = tx.send(Err(Refusal::InFlight));
            return rx;
        };

        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let result = dispatcher.fetch(requirement, action).await;
            drop(flight);
            if tx.send(result).is_err() {
                debug!("Action finished after its screen went away, result dropped");
            }
        });
        rx
    }

    async fn translate<T>(&self, result: Result<T, ActionError>, epoch: u64) -> ActionOutcome<T> {
        match result {
            Ok(value) => ActionOutcome::Success(value),
            Err(ActionError::Invalid(message)) => ActionOutcome::ValidationFailure(message),
            Err(ActionError::SessionChanged) => {
                debug!("Session changed during action, result discarded");
                ActionOutcome::AuthFailure
            }
            Err(ActionError::Storage(e)) => {
                error!(error = %e, "Credential store failed during action");
                self.resolver.invalidate(epoch).await;
                ActionOutcome::AuthFailure
            }
            Err(ActionError::Api(e)) if e.is_auth_failure() => {
                warn!(error = %e, "Backend rejected credentials");
                self.resolver.invalidate(epoch).await;
                ActionOutcome::AuthFailure
            }
            Err(ActionError::Api(ApiError::Rejected { message, .. }))
            | Err(ActionError::Api(ApiError::NotFound(message))) => {
                debug!(%message, "Backend rejected request");
                ActionOutcome::ValidationFailure(message)
            }
            Err(ActionError::Api(e)) => {
                warn!(error = %e, "Backend call failed");
                ActionOutcome::NetworkFailure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::fake::{FakeBackend, Reply};
    use crate::api::{ApiClient, Backend};
    use crate::auth::credentials::memory::MemoryTokenStore;
    use crate::auth::{AdminCheck, Session};
    use crate::guard::Route;

    struct Fixture {
        store: Arc<MemoryTokenStore>,
        backend: Arc<FakeBackend>,
        resolver: Arc<SessionResolver>,
        dispatcher: Arc<Dispatcher>,
    }

    async fn fixture(token: Option<&str>) -> Fixture {
        let store = Arc::new(match token {
            Some(t) => MemoryTokenStore::with_token(t),
            None => MemoryTokenStore::new(),
        });
        let resolver = Arc::new(SessionResolver::new(store.clone()));
        resolver.resolve().await;
        let backend = Arc::new(FakeBackend::new());
        let admin = Arc::new(AdminCheck::new(backend.clone(), resolver.clone(), true));
        let guard = Arc::new(ScreenGuard::new(resolver.clone(), admin));
        let dispatcher = Arc::new(Dispatcher::new(resolver.clone(), guard));
        Fixture {
            store,
            backend,
            resolver,
            dispatcher,
        }
    }

    async fn list_cars(f: &Fixture) -> Dispatched<usize> {
        let backend = f.backend.clone();
        f.dispatcher
            .fetch(Requirement::RequireAuth, |token| async move {
                let cars = backend.list_cars(&token.unwrap_or_default()).await?;
                Ok(cars.len())
            })
            .await
    }

    #[tokio::test]
    async fn test_success_passes_token() {
        let f = fixture(Some("abc")).await;
        assert_eq!(list_cars(&f).await, Ok(ActionOutcome::Success(0)));
        assert_eq!(f.backend.last_token("cars").as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_guard_refusal_makes_no_call() {
        let f = fixture(None).await;
        assert_eq!(
            list_cars(&f).await,
            Err(Refusal::Guard(GuardDecision::Redirect(Route::Login)))
        );
        assert_eq!(f.backend.calls("cars"), 0);
    }

    #[tokio::test]
    async fn test_forbidden_ends_session() {
        let f = fixture(Some("abc")).await;
        f.backend.reply("cars", Reply::Status(403, r#"{"msg": "Token expired"}"#));

        assert_eq!(list_cars(&f).await, Ok(ActionOutcome::AuthFailure));
        assert_eq!(f.resolver.current(), Session::Unauthenticated);
        assert_eq!(f.store.stored(), None);

        // Next mount redirects
        assert_eq!(
            list_cars(&f).await,
            Err(Refusal::Guard(GuardDecision::Redirect(Route::Login)))
        );
    }

    #[tokio::test]
    async fn test_outcome_translation() {
        let f = fixture(Some("abc")).await;

        f.backend.reply("cars", Reply::Status(400, r#"{"message": "Bad filter"}"#));
        assert_eq!(
            list_cars(&f).await,
            Ok(ActionOutcome::ValidationFailure("Bad filter".to_string()))
        );

        f.backend.reply("cars", Reply::Unavailable);
        assert!(matches!(
            list_cars(&f).await,
            Ok(ActionOutcome::NetworkFailure(_))
        ));

        f.backend.reply("cars", Reply::Status(429, ""));
        assert!(matches!(
            list_cars(&f).await,
            Ok(ActionOutcome::NetworkFailure(_))
        ));

        // None of these touched the session
        assert!(f.resolver.current().is_authenticated());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_failure() {
        let f = fixture(Some("abc")).await;
        // Nothing listens on port 1
        let client = ApiClient::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap();

        let outcome = f
            .dispatcher
            .fetch(Requirement::RequireAuth, |token| async move {
                Ok(client.list_cars(&token.unwrap_or_default()).await?)
            })
            .await;
        assert!(matches!(outcome, Ok(ActionOutcome::NetworkFailure(_))));
        assert!(f.resolver.current().is_authenticated());
    }

    #[tokio::test]
    async fn test_storage_failure_is_auth_failure() {
        let f = fixture(Some("abc")).await;
        let outcome = f
            .dispatcher
            .fetch(Requirement::RequireAuth, |_| async {
                Err::<(), _>(ActionError::Storage(StorageError::Task("gone".to_string())))
            })
            .await;
        assert_eq!(outcome, Ok(ActionOutcome::AuthFailure));
        assert_eq!(f.resolver.current(), Session::Unauthenticated);
    }

    #[tokio::test]
    async fn test_pending_released_after_failure() {
        let f = fixture(Some("abc")).await;
        let pending = PendingAction::new();
        let backend = f.backend.clone();
        f.backend.reply("rentals", Reply::Status(500, ""));

        let outcome = f
            .dispatcher
            .run(Requirement::RequireAuth, &pending, |token| async move {
                Ok(backend
                    .create_rental(
                        &token.unwrap_or_default(),
                        &crate::models::RentalRequest::new(
                            "c1",
                            crate::models::RentalMode::Pickup,
                            None,
                        )
                        .unwrap(),
                    )
                    .await?)
            })
            .await;
        assert!(matches!(outcome, Ok(ActionOutcome::NetworkFailure(_))));
        assert!(!pending.is_in_flight());
    }

    #[tokio::test]
    async fn test_pending_released_after_cancellation() {
        let f = fixture(Some("abc")).await;
        let pending = PendingAction::new();
        let _gate = f.backend.gate();
        let backend = f.backend.clone();

        let run = f.dispatcher.run(Requirement::RequireAuth, &pending, |token| async move {
            backend.list_cars(&token.unwrap_or_default()).await?;
            Ok(())
        });
        tokio::select! {
            _ = run => panic!("gated call should not finish"),
            _ = f.backend.entered.notified() => {}
        }

        // The run future was dropped by select!
        assert!(!pending.is_in_flight());
    }

    #[tokio::test]
    async fn test_double_tap_makes_one_call() {
        let f = fixture(Some("abc")).await;
        let pending = PendingAction::new();
        let gate = f.backend.gate();

        let first = {
            let backend = f.backend.clone();
            f.dispatcher.spawn(Requirement::RequireAuth, &pending, |token| async move {
                backend.list_cars(&token.unwrap_or_default()).await?;
                Ok(())
            })
        };
        assert!(pending.is_in_flight());

        let second = {
            let backend = f.backend.clone();
            f.dispatcher.spawn(Requirement::RequireAuth, &pending, |token| async move {
                backend.list_cars(&token.unwrap_or_default()).await?;
                Ok(())
            })
        };
        assert_eq!(second.await.unwrap(), Err(Refusal::InFlight));

        f.backend.entered.notified().await;
        gate.notify_one();
        assert_eq!(first.await.unwrap(), Ok(ActionOutcome::Success(())));
        assert_eq!(f.backend.calls("cars"), 1);
        assert!(!pending.is_in_flight());
    }

    #[tokio::test]
    async fn test_result_after_screen_gone_is_dropped() {
        let f = fixture(Some("abc")).await;
        let pending = PendingAction::new();
        let gate = f.backend.gate();
        let backend = f.backend.clone();

        let rx = f.dispatcher.spawn(Requirement::RequireAuth, &pending, |token| async move {
            backend.list_cars(&token.unwrap_or_default()).await?;
            Ok(())
        });
        drop(rx);

        f.backend.entered.notified().await;
        gate.notify_one();

        // Wait for the task to release the flag
        while pending.is_in_flight() {
            tokio::task::yield_now().await;
        }
        assert_eq!(f.backend.calls("cars"), 1);
    }

    #[test]
    fn test_outcome_map() {
        let outcome: ActionOutcome<u8> = ActionOutcome::Success(2);
        assert_eq!(outcome.map(|v| v * 2), ActionOutcome::Success(4));
        let failed: ActionOutcome<u8> = ActionOutcome::AuthFailure;
        assert!(!failed.map(|v| v * 2).is_success());
    }
}
