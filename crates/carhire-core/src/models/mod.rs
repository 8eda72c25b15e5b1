//! Data models for the car rental API.
//!
//! This module contains the wire types exchanged with the backend and the
//! client-side validation applied before anything is sent:
//!
//! - `Car`, `NewCar`: fleet listing and the dashboard "add car" form
//! - `NewUser`, `LoginResponse`, `Profile`, `AdminStatus`: account payloads
//! - `RentalRequest`, `RentalMode`: the "rent car" flow

pub mod car;
pub mod rental;
pub mod user;

use thiserror::Error;

pub use car::{Car, NewCar};
pub use rental::{RentalMode, RentalRequest};
pub use user::{AdminStatus, LoginResponse, NewUser, Profile};

/// Input rejected locally, before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{0} contains invalid characters")]
    InvalidCharacters(&'static str),

    #[error("year {year} is outside {min}..={max}")]
    YearOutOfRange { year: i32, min: i32, max: i32 },

    #[error("unknown rental mode: {0}")]
    UnknownRentalMode(String),
}
