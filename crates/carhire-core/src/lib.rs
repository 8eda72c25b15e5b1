//! Carhire core - session and access control for the car rental client.
//!
//! This crate holds everything a front-end needs besides rendering: the
//! backend client, the persisted bearer token, session resolution, the screen
//! guard and the action dispatcher. [`CarRental`] ties them together.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod guard;
pub mod models;

pub use app::{CarRental, Control, LoginScreen};
pub use auth::{Session, SessionState};
pub use config::{Config, TokenStoreKind};
pub use dispatch::{ActionOutcome, Dispatched, Refusal};
pub use guard::{GuardDecision, Requirement, Route};
