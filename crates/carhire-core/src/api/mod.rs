//! REST API module for the car rental backend.
//!
//! This module provides the [`Backend`] trait describing the endpoints the
//! client consumes, and `ApiClient`, its reqwest implementation.
//!
//! Authenticated endpoints take a JWT bearer token obtained from `/login`.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::models::{AdminStatus, Car, LoginResponse, NewCar, NewUser, Profile, RentalRequest};

pub use client::ApiClient;
pub use error::ApiError;

/// The backend endpoints this client consumes.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /login`
    async fn login(&self, credentials: &NewUser) -> Result<LoginResponse, ApiError>;

    /// `POST /users`; unauthenticated for self sign-up, bearer for admin flows
    async fn create_user(&self, token: Option<&str>, user: &NewUser) -> Result<(), ApiError>;

    /// `GET /cars`
    async fn list_cars(&self, token: &str) -> Result<Vec<Car>, ApiError>;

    /// `POST /cars`
    async fn create_car(&self, token: &str, car: &NewCar) -> Result<(), ApiError>;

    /// `GET /profile`
    async fn profile(&self, token: &str) -> Result<Profile, ApiError>;

    /// `GET /admin/check`
    async fn admin_check(&self, token: &str) -> Result<AdminStatus, ApiError>;

    /// `POST /rentals`
    async fn create_rental(&self, token: &str, rental: &RentalRequest) -> Result<(), ApiError>;
}
