//! Application service for the car rental client.
//!
//! `CarRental` wires the credential store, session resolver, admin check,
//! screen guard and action dispatcher around one [`Backend`]. Screens call it
//! on mount and when a control is pressed; it is the only place they need.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{oneshot, watch};
use tracing::info;

use crate::api::{ApiClient, ApiError, Backend};
use crate::auth::{
    AdminCheck, CredentialStore, Session, SessionResolver, SessionSnapshot, StorageError,
};
use crate::config::Config;
use crate::dispatch::{ActionError, ActionOutcome, Dispatched, Dispatcher, PendingAction};
use crate::guard::{GuardDecision, Requirement, Route, ScreenGuard};
use crate::models::{Car, NewCar, NewUser, Profile, RentalMode, RentalRequest};

/// Controls that trigger a mutating call and are disabled while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Login,
    SignUp,
    AddUser,
    AddCar,
    Rent,
}

/// What the login screen shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginScreen {
    Form,
    /// "You are already logged in", with a way on to the profile.
    AlreadyLoggedIn { continue_to: Route },
}

#[derive(Debug, Default)]
struct Controls {
    login: Arc<PendingAction>,
    sign_up: Arc<PendingAction>,
    add_user: Arc<PendingAction>,
    add_car: Arc<PendingAction>,
    rent: Arc<PendingAction>,
}

impl Controls {
    fn get(&self, control: Control) -> &Arc<PendingAction> {
        match control {
            Control::Login => &self.login,
            Control::SignUp => &self.sign_up,
            Control::AddUser => &self.add_user,
            Control::AddCar => &self.add_car,
            Control::Rent => &self.rent,
        }
    }
}

pub struct CarRental {
    backend: Arc<dyn Backend>,
    resolver: Arc<SessionResolver>,
    admin: Arc<AdminCheck>,
    guard: Arc<ScreenGuard>,
    dispatcher: Arc<Dispatcher>,
    controls: Controls,
}

impl CarRental {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<dyn CredentialStore>,
        cache_admin_role: bool,
    ) -> Self {
        let resolver = Arc::new(SessionResolver::new(store));
        let admin = Arc::new(AdminCheck::new(
            backend.clone(),
            resolver.clone(),
            cache_admin_role,
        ));
        let guard = Arc::new(ScreenGuard::new(resolver.clone(), admin.clone()));
        let dispatcher = Arc::new(Dispatcher::new(resolver.clone(), guard.clone()));

        Self {
            backend,
            resolver,
            admin,
            guard,
            dispatcher,
            controls: Controls::default(),
        }
    }

    /// Build the HTTP client and token store described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = ApiClient::new(&config.api_base_url, config.request_timeout())?;
        let store = config.credential_store()?;
        info!(api = %backend.base_url(), store = ?config.token_store, "Client configured");
        Ok(Self::new(Arc::new(backend), store, config.cache_admin_role))
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Cold start: resolve the session from storage.
    pub async fn start(&self) -> Session {
        self.resolver.resolve().await
    }

    pub fn session(&self) -> Session {
        self.resolver.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.resolver.subscribe()
    }

    /// Guard decision for mounting `route`.
    pub async fn mount(&self, route: Route) -> GuardDecision {
        self.guard.mount(route).await
    }

    /// Decision without waiting; `Pending` while anything is unresolved.
    pub fn mount_now(&self, route: Route) -> GuardDecision {
        self.guard.evaluate_now(route.requirement())
    }

    pub async fn login_screen(&self) -> LoginScreen {
        if self.start().await.is_authenticated() {
            LoginScreen::AlreadyLoggedIn {
                continue_to: Route::Profile,
            }
        } else {
            LoginScreen::Form
        }
    }

    /// Whether admin-only features should be shown.
    pub async fn is_admin(&self) -> bool {
        self.start().await;
        self.admin.check(&self.resolver.snapshot()).await
    }

    /// Whether `control` should be disabled because its call is in flight.
    pub fn is_pending(&self, control: Control) -> bool {
        self.controls.get(control).is_in_flight()
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Log in and persist the token. The session is authenticated before this
    /// returns `Success`, so the screen navigated to next sees it.
    pub async fn login(&self, username: &str, password: &str) -> Dispatched<()> {
        let credentials = NewUser::new(username.trim(), password);
        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Ok(ActionOutcome::ValidationFailure(
                "Username and password required".to_string(),
            ));
        }

        let outcome = self
            .dispatcher
            .run(Requirement::None, &self.controls.login, |_| async move {
                let sent_at = self.resolver.epoch();
                let response = self.backend.login(&credentials).await.map_err(|e| {
                    if e.is_auth_failure() {
                        ActionError::Invalid("Invalid username or password".to_string())
                    } else {
                        e.into()
                    }
                })?;
                if !self.resolver.login_since(response.access_token, sent_at).await? {
                    return Err(ActionError::SessionChanged);
                }
                Ok(())
            })
            .await;

        if matches!(outcome, Ok(ActionOutcome::Success(()))) {
            info!(username, "Login successful");
        }
        outcome
    }

    pub async fn logout(&self) -> Result<(), StorageError> {
        let result = self.resolver.logout().await;
        self.admin.invalidate();
        result
    }

    /// "Create New User" on the login screen; no session needed.
    pub async fn sign_up(&self, user: NewUser) -> Dispatched<()> {
        if let Err(e) = user.validate() {
            return Ok(ActionOutcome::ValidationFailure(e.to_string()));
        }
        self.dispatcher
            .run(Requirement::None, &self.controls.sign_up, |_| async move {
                Ok(self.backend.create_user(None, &user).await?)
            })
            .await
    }

    /// Dashboard "Add User".
    pub async fn add_user(&self, user: NewUser) -> Dispatched<()> {
        if let Err(e) = user.validate() {
            return Ok(ActionOutcome::ValidationFailure(e.to_string()));
        }
        self.dispatcher
            .run(Requirement::RequireAdmin, &self.controls.add_user, |token| async move {
                Ok(self.backend.create_user(token.as_deref(), &user).await?)
            })
            .await
    }

    /// Dashboard "Add Car".
    pub async fn add_car(&self, car: NewCar) -> Dispatched<()> {
        if let Err(e) = car.validate() {
            return Ok(ActionOutcome::ValidationFailure(e.to_string()));
        }
        let car = car.trimmed();
        self.dispatcher
            .run(Requirement::RequireAdmin, &self.controls.add_car, |token| async move {
                let token = token.ok_or(ApiError::Unauthorized)?;
                self.backend.create_car(&token, &car).await?;
                info!(car = %format!("{} {}", car.brand, car.model), "Car added");
                Ok(())
            })
            .await
    }

    /// "Add Car" without waiting: the result arrives on the returned channel,
    /// and is dropped if the screen has gone away.
    pub fn add_car_detached(&self, car: NewCar) -> oneshot::Receiver<Dispatched<()>> {
        if let Err(e) = car.validate() {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(Ok(ActionOutcome::ValidationFailure(e.to_string())));
            return rx;
        }
        let car = car.trimmed();
        let backend = self.backend.clone();
        self.dispatcher
            .spawn(Requirement::RequireAdmin, &self.controls.add_car, |token| async move {
                let token = token.ok_or(ApiError::Unauthorized)?;
                Ok(backend.create_car(&token, &car).await?)
            })
    }

    /// "Confirm Rental" from raw form input.
    pub async fn rent(
        &self,
        car_id: &str,
        mode: RentalMode,
        address: Option<&str>,
    ) -> Dispatched<()> {
        let request = match RentalRequest::new(car_id, mode, address) {
            Ok(request) => request,
            Err(e) => return Ok(ActionOutcome::ValidationFailure(e.to_string())),
        };
        self.dispatcher
            .run(Requirement::RequireAuth, &self.controls.rent, |token| async move {
                let token = token.ok_or(ApiError::Unauthorized)?;
                self.backend.create_rental(&token, &request).await?;
                info!(car_id = request.car_id(), mode = %request.mode(), "Rental requested");
                Ok(())
            })
            .await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn list_cars(&self) -> Dispatched<Vec<Car>> {
        self.dispatcher
            .fetch(Requirement::RequireAuth, |token| async move {
                let token = token.ok_or(ApiError::Unauthorized)?;
                Ok(self.backend.list_cars(&token).await?)
            })
            .await
    }

    pub async fn profile(&self) -> Dispatched<Profile> {
        self.dispatcher
            .fetch(Requirement::RequireAuth, |token| async move {
                let token = token.ok_or(ApiError::Unauthorized)?;
                Ok(self.backend.profile(&token).await?)
            })
            .await
    }
}
