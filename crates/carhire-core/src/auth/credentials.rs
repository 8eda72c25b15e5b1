//! Persistent storage for the single bearer token.
//!
//! Every store operation returns a [`StorageError`] instead of panicking, so
//! the session layer can treat an unreadable store exactly like an empty one.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Keychain service name
const SERVICE_NAME: &str = "carhire";

/// Keychain account holding the bearer token
const TOKEN_ACCOUNT: &str = "session-token";

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Whether this build links a native keychain backend. Elsewhere keyring
/// falls back to an in-process mock that forgets every token.
pub const KEYRING_AVAILABLE: bool = cfg!(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "windows",
    target_os = "linux",
    target_os = "freebsd",
    target_os = "openbsd"
));

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Keychain access failed: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Credential store task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(e: tokio::task::JoinError) -> Self {
        StorageError::Task(e.to_string())
    }
}

/// Get/set/remove of the bearer token in persistent storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the stored token. A blank token counts as absent.
    async fn load(&self) -> Result<Option<String>, StorageError>;

    async fn save(&self, token: &str) -> Result<(), StorageError>;

    /// Remove the stored token. Removing a missing token succeeds.
    async fn clear(&self) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    token: String,
    created_at: DateTime<Utc>,
}

/// Token persisted as JSON in the cache directory.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    cache_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }

    fn read(path: &Path) -> Result<Option<String>, StorageError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let stored: StoredToken = serde_json::from_str(&contents)?;
        Ok(Some(stored.token).filter(|t| !t.trim().is_empty()))
    }

    fn write(path: &Path, token: &str) -> Result<(), StorageError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let stored = StoredToken {
            token: token.to_string(),
            created_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&stored)?;

        // The temp file is created owner-only (0600 on unix) and renamed over
        // the session file, so readers never see a partial or shared token
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(path: &Path) -> Result<(), StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CredentialStore for FileTokenStore {
    async fn load(&self) -> Result<Option<String>, StorageError> {
        let path = self.session_path();
        tokio::task::spawn_blocking(move || Self::read(&path)).await?
    }

    async fn save(&self, token: &str) -> Result<(), StorageError> {
        let path = self.session_path();
        let token = token.to_string();
        tokio::task::spawn_blocking(move || Self::write(&path, &token)).await??;
        debug!(path = ?self.session_path(), "Token saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let path = self.session_path();
        tokio::task::spawn_blocking(move || Self::remove(&path)).await?
    }
}

/// Token kept in the OS keychain.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    account: String,
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_account(TOKEN_ACCOUNT)
    }

    /// Store under a different keychain account.
    pub fn with_account(account: &str) -> Self {
        Self {
            account: account.to_string(),
        }
    }

    fn entry(account: &str) -> Result<Entry, StorageError> {
        Ok(Entry::new(SERVICE_NAME, account)?)
    }
}

#[async_trait]
impl CredentialStore for KeyringTokenStore {
    async fn load(&self) -> Result<Option<String>, StorageError> {
        let account = self.account.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<String>, StorageError> {
            match Self::entry(&account)?.get_password() {
                Ok(token) => Ok(Some(token).filter(|t| !t.trim().is_empty())),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }

    async fn save(&self, token: &str) -> Result<(), StorageError> {
        let account = self.account.clone();
        let token = token.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            Self::entry(&account)?.set_password(&token)?;
            Ok(())
        })
        .await?
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let account = self.account.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            match Self::entry(&account)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested"));

        assert_eq!(store.load().await.unwrap(), None);

        store.save("abc").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("abc"));
        // Only the session file is left behind
        let entries = std::fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(entries, 1);

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);

        // Clearing twice is not an error
        store.clear().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        store.save("abc").await.unwrap();
        // Overwriting keeps the restricted mode
        store.save("def").await.unwrap();

        let mode = std::fs::metadata(store.session_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o077, 0, "session file mode {:o}", mode & 0o777);
    }

    #[tokio::test]
    async fn test_keyring_token_visible_to_fresh_store() {
        let account = format!("test-session-{}", std::process::id());
        let store = KeyringTokenStore::with_account(&account);
        if let Err(e) = store.save("abc").await {
            // No keychain service running (headless CI)
            eprintln!("keychain unavailable, skipping: {}", e);
            return;
        }

        let fresh = KeyringTokenStore::with_account(&account);
        let loaded = fresh.load().await;
        fresh.clear().await.unwrap();
        assert_eq!(loaded.unwrap().as_deref(), Some("abc"));
        assert_eq!(fresh.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        FileTokenStore::new(dir.path().to_path_buf())
            .save("persisted")
            .await
            .unwrap();

        let reopened = FileTokenStore::new(dir.path().to_path_buf());
        assert_eq!(reopened.load().await.unwrap().as_deref(), Some("persisted"));
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        std::fs::write(store.session_path(), "not json").unwrap();

        assert!(matches!(store.load().await, Err(StorageError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_file_store_blank_token_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        store.save("  ").await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }
}
