//! HTTP client for the car rental backend.
//!
//! `ApiClient` implements [`Backend`] over reqwest. The client never holds a
//! token of its own; each authenticated call receives the bearer token from
//! the session layer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::models::{AdminStatus, Car, LoginResponse, NewCar, NewUser, Profile, RentalRequest};

use super::{ApiError, Backend};

// ============================================================================
// Constants
// ============================================================================

/// Default backend location used by the development server.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/login";
const USERS_PATH: &str = "/users";
const CARS_PATH: &str = "/cars";
const PROFILE_PATH: &str = "/profile";
const ADMIN_CHECK_PATH: &str = "/admin/check";
const RENTALS_PATH: &str = "/rentals";

/// API client for the rental backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<T, ApiError> {
        debug!(path, "GET");
        let response = Self::authorized(self.client.get(self.url(path)), Some(token))
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Self::parse(response, path).await
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<Response, ApiError> {
        debug!(path, authenticated = token.is_some(), "POST");
        let response = Self::authorized(self.client.post(self.url(path)), token)
            .json(body)
            .send()
            .await?;
        Self::check_response(response).await
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn login(&self, credentials: &NewUser) -> Result<LoginResponse, ApiError> {
        let response = self.post(LOGIN_PATH, None, credentials).await?;
        Self::parse(response, LOGIN_PATH).await
    }

    async fn create_user(&self, token: Option<&str>, user: &NewUser) -> Result<(), ApiError> {
        self.post(USERS_PATH, token, user).await?;
        Ok(())
    }

    async fn list_cars(&self, token: &str) -> Result<Vec<Car>, ApiError> {
        self.get(CARS_PATH, token).await
    }

    async fn create_car(&self, token: &str, car: &NewCar) -> Result<(), ApiError> {
        self.post(CARS_PATH, Some(token), car).await?;
        Ok(())
    }

    async fn profile(&self, token: &str) -> Result<Profile, ApiError> {
        self.get(PROFILE_PATH, token).await
    }

    async fn admin_check(&self, token: &str) -> Result<AdminStatus, ApiError> {
        self.get(ADMIN_CHECK_PATH, token).await
    }

    async fn create_rental(&self, token: &str, rental: &RentalRequest) -> Result<(), ApiError> {
        self.post(RENTALS_PATH, Some(token), rental).await?;
        Ok(())
    }
}
