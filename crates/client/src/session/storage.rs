//! Persistence for session tokens.
//!
//! Tokens live in an opaque key-value style store: one record holding the
//! access and refresh token. The file store writes JSON next to the CLI's
//! other state; the memory store backs tests and embedders that keep tokens
//! elsewhere.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::token::SessionTokens;

/// Errors raised by a [`SessionStorage`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt session file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("session storage lock poisoned")]
    Poisoned,
}

/// Where session tokens are persisted between runs.
pub trait SessionStorage: Send + Sync {
    /// Read the stored tokens, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn load(&self) -> Result<Option<SessionTokens>, StorageError>;

    /// Replace the stored tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn save(&self, tokens: &SessionTokens) -> Result<(), StorageError>;

    /// Delete the stored tokens. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn clear(&self) -> Result<(), StorageError>;
}

/// On-disk representation.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl From<&SessionTokens> for StoredSession {
    fn from(tokens: &SessionTokens) -> Self {
        Self {
            access_token: tokens.access_token.expose_secret().to_owned(),
            refresh_token: tokens
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_owned()),
        }
    }
}

impl From<StoredSession> for SessionTokens {
    fn from(stored: StoredSession) -> Self {
        Self::new(stored.access_token, stored.refresh_token)
    }
}

// =============================================================================
// MemorySessionStorage
// =============================================================================

/// Keeps tokens in process memory only.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    tokens: Mutex<Option<SessionTokens>>,
}

impl MemorySessionStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `tokens`.
    #[must_use]
    pub fn with_tokens(tokens: SessionTokens) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
        }
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self) -> Result<Option<SessionTokens>, StorageError> {
        Ok(self.tokens.lock().map_err(|_| StorageError::Poisoned)?.clone())
    }

    fn save(&self, tokens: &SessionTokens) -> Result<(), StorageError> {
        *self.tokens.lock().map_err(|_| StorageError::Poisoned)? = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.tokens.lock().map_err(|_| StorageError::Poisoned)? = None;
        Ok(())
    }
}

// =============================================================================
// FileSessionStorage
// =============================================================================

/// Stores tokens as a small JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    /// Use `path` as the session file. Nothing is touched until first use.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the session file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SessionStorage for FileSessionStorage {
    fn load(&self) -> Result<Option<SessionTokens>, StorageError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let stored: StoredSession =
            serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        Ok(Some(stored.into()))
    }

    fn save(&self, tokens: &SessionTokens) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_vec_pretty(&StoredSession::from(tokens)).map_err(|source| {
            StorageError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        // Write then rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let storage = MemorySessionStorage::new();
        assert!(storage.load().unwrap().is_none());

        storage
            .save(&SessionTokens::new("access", Some("refresh".into())))
            .unwrap();
        let loaded = storage.load().unwrap().unwrap();
        assert_eq!(loaded.access_token.expose_secret(), "access");

        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_file_storage_persists_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/session.json");
        let storage = FileSessionStorage::new(&path);

        assert!(storage.load().unwrap().is_none());

        storage
            .save(&SessionTokens::new("access-1", Some("refresh-1".into())))
            .unwrap();
        assert!(path.exists());

        // A second instance sees the same tokens
        let reopened = FileSessionStorage::new(&path).load().unwrap().unwrap();
        assert_eq!(reopened.access_token.expose_secret(), "access-1");
        assert_eq!(
            reopened.refresh_token.unwrap().expose_secret(),
            "refresh-1"
        );

        storage.clear().unwrap();
        assert!(!path.exists());
        // Clearing twice is fine
        storage.clear().unwrap();
    }

    #[test]
    fn test_file_storage_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path().join("session.json"));
        storage.save(&SessionTokens::new("only-access", None)).unwrap();

        let loaded = storage.load().unwrap().unwrap();
        assert!(loaded.refresh_token.is_none());
    }

    #[test]
    fn test_file_storage_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = FileSessionStorage::new(&path).load().unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }
}
