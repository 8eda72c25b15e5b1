//! Account models: credentials, login and profile payloads.

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Maximum length for usernames.
const MAX_USERNAME_LENGTH: usize = 50;

/// Maximum length for passwords.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Username/password pair sent to `/login` and `/users`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
}

// Keep passwords out of logs
impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl NewUser {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_field("username", &self.username, MAX_USERNAME_LENGTH)?;
        validate_field("password", &self.password, MAX_PASSWORD_LENGTH)
    }
}

fn validate_field(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    if value.chars().count() > max_len {
        return Err(ValidationError::TooLong { field, max: max_len });
    }
    if value.chars().any(char::is_control) {
        return Err(ValidationError::InvalidCharacters(field));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Profile {
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AdminStatus {
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
}
