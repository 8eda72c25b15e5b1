//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `CredentialStore`: persistent storage of the bearer token (file or OS keychain)
//! - `SessionResolver`: the in-memory session, resolved once from storage
//! - `AdminCheck`: the backend role lookup used to gate admin features
//!
//! Tokens are opaque to the client and carry no local expiry; the session ends
//! on logout or when the backend rejects the token.

pub mod credentials;
pub mod role;
pub mod session;

pub use credentials::{CredentialStore, FileTokenStore, KeyringTokenStore, StorageError};
pub use role::AdminCheck;
pub use session::{Session, SessionResolver, SessionSnapshot, SessionState};
