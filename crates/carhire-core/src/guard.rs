//! Screen guard: the single access-control decision point.
//!
//! Each screen declares a [`Requirement`] through its [`Route`]; the guard is
//! evaluated on every mount and before every protected action, because the
//! session can change between two mounts.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::auth::{AdminCheck, Session, SessionResolver, SessionSnapshot};

/// What a screen or action needs from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    None,
    RequireAuth,
    RequireAdmin,
}

/// Outcome of a guard evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Send the user elsewhere (the login screen).
    Redirect(Route),
    /// Hide the feature; the user is logged in but lacks the role.
    Block,
    /// The session is still resolving; show a neutral loading state and
    /// evaluate again.
    Pending,
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

/// Screens of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Explore,
    Cars,
    Profile,
    Dashboard,
    Login,
}

impl Route {
    pub const ALL: [Route; 6] = [
        Route::Home,
        Route::Explore,
        Route::Cars,
        Route::Profile,
        Route::Dashboard,
        Route::Login,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Explore => "/explore",
            Route::Cars => "/cars",
            Route::Profile => "/profile",
            Route::Dashboard => "/dashboard",
            Route::Login => "/login",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Home => "Home",
            Route::Explore => "Explore",
            Route::Cars => "Available Cars",
            Route::Profile => "Profile",
            Route::Dashboard => "Dashboard",
            Route::Login => "Login",
        }
    }

    /// Access requirement declared by the screen.
    pub fn requirement(&self) -> Requirement {
        match self {
            Route::Home | Route::Explore | Route::Login => Requirement::None,
            Route::Cars | Route::Profile => Requirement::RequireAuth,
            Route::Dashboard => Requirement::RequireAdmin,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('/').to_lowercase();
        match name.as_str() {
            "" | "home" | "index" => Ok(Route::Home),
            "explore" => Ok(Route::Explore),
            "cars" => Ok(Route::Cars),
            "profile" => Ok(Route::Profile),
            "dashboard" => Ok(Route::Dashboard),
            "login" => Ok(Route::Login),
            _ => Err(format!("unknown screen: {}", s)),
        }
    }
}

pub struct ScreenGuard {
    resolver: Arc<SessionResolver>,
    admin: Arc<AdminCheck>,
}

impl ScreenGuard {
    pub fn new(resolver: Arc<SessionResolver>, admin: Arc<AdminCheck>) -> Self {
        Self { resolver, admin }
    }

    /// Evaluate a requirement, waiting for session resolution if needed.
    ///
    /// Never returns [`GuardDecision::Pending`].
    pub async fn guard(&self, requirement: Requirement) -> GuardDecision {
        self.resolver.resolve().await;
        let snapshot = self.resolver.snapshot();
        let decision = self.decide(requirement, &snapshot).await;
        debug!(?requirement, ?decision, "Guard evaluated");
        decision
    }

    /// Evaluate the requirement a route declares.
    pub async fn mount(&self, route: Route) -> GuardDecision {
        let decision = self.guard(route.requirement()).await;
        debug!(%route, ?decision, "Screen mount");
        decision
    }

    /// Evaluate without waiting.
    ///
    /// Returns `Pending` while the session is unresolved, or for an admin
    /// requirement whose role has not been looked up for this session yet.
    pub fn evaluate_now(&self, requirement: Requirement) -> GuardDecision {
        let snapshot = self.resolver.snapshot();
        match auth_decision(requirement, &snapshot.session) {
            Some(decision) => decision,
            None => match self.admin.cached(snapshot.epoch) {
                Some(true) => GuardDecision::Allow,
                Some(false) => GuardDecision::Block,
                None => GuardDecision::Pending,
            },
        }
    }

    async fn decide(&self, requirement: Requirement, snapshot: &SessionSnapshot) -> GuardDecision {
        match auth_decision(requirement, &snapshot.session) {
            Some(decision) => decision,
            None => {
                if self.admin.check(snapshot).await {
                    GuardDecision::Allow
                } else {
                    GuardDecision::Block
                }
            }
        }
    }
}

/// Decide everything that does not need the admin lookup; `None` means the
/// requirement is admin and the session is authenticated.
fn auth_decision(requirement: Requirement, session: &Session) -> Option<GuardDecision> {
    if requirement == Requirement::None {
        return Some(GuardDecision::Allow);
    }
    match session {
        Session::Unknown => Some(GuardDecision::Pending),
        Session::Unauthenticated => Some(GuardDecision::Redirect(Route::Login)),
        Session::Authenticated { .. } => match requirement {
            Requirement::RequireAdmin => None,
            _ => Some(GuardDecision::Allow),
        },
    }
}
