//! Credential storage.
//!
//! The [`CredentialStore`] is the single owner of the current access/refresh
//! token pair and the last known identity snapshot. All mutation goes
//! through the store's write lock, and persistence happens while that lock
//! is held, so a completed rotation can never be overwritten by a stale
//! pair.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ClientError;

/// Last known identity of the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
}

/// The current access/refresh credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Short-lived token attached to every call.
    pub access_token: String,
    /// Long-lived token used once to rotate the pair.
    pub refresh_token: String,
    /// Identity issued with the pair, if known.
    pub identity: Option<IdentitySnapshot>,
}

/// Persistence hook so credentials survive process restarts.
pub trait CredentialPersistence: Send + Sync {
    fn load(&self) -> Result<Option<Credential>, ClientError>;

    /// Stores the credential; `None` clears persisted state.
    fn store(&self, credential: Option<&Credential>) -> Result<(), ClientError>;
}

/// JSON-file-backed [`CredentialPersistence`].
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialPersistence for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>, ClientError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| ClientError::Storage(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Storage(e.to_string())),
        }
    }

    fn store(&self, credential: Option<&Credential>) -> Result<(), ClientError> {
        match credential {
            Some(credential) => {
                let contents = serde_json::to_string_pretty(credential)
                    .map_err(|e| ClientError::Storage(e.to_string()))?;
                std::fs::write(&self.path, contents)
                    .map_err(|e| ClientError::Storage(e.to_string()))
            }
            None => match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(ClientError::Storage(e.to_string())),
            },
        }
    }
}

/// Holds the current credential pair behind a write-serialized lock.
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
    persistence: Option<Box<dyn CredentialPersistence>>,
}

impl CredentialStore {
    /// A store without persistence, starting unauthenticated.
    pub fn in_memory() -> Self {
        Self {
            current: RwLock::new(None),
            persistence: None,
        }
    }

    /// A store backed by the given persistence hook; any previously
    /// persisted credential is loaded immediately.
    pub fn with_persistence(
        persistence: Box<dyn CredentialPersistence>,
    ) -> Result<Self, ClientError> {
        let current = persistence.load()?;
        Ok(Self {
            current: RwLock::new(current),
            persistence: Some(persistence),
        })
    }

    pub async fn access_token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|c| c.refresh_token.clone())
    }

    pub async fn identity(&self) -> Option<IdentitySnapshot> {
        self.current
            .read()
            .await
            .as_ref()
            .and_then(|c| c.identity.clone())
    }

    /// No access token means unauthenticated, regardless of any refresh
    /// token still held.
    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Replaces the credential pair. Persisting under the write lock
    /// serializes rotations.
    pub async fn set(&self, credential: Credential) -> Result<(), ClientError> {
        let mut current = self.current.write().await;
        if let Some(persistence) = &self.persistence {
            persistence.store(Some(&credential))?;
        }
        *current = Some(credential);
        Ok(())
    }

    /// Clears the session (logout or failed refresh).
    pub async fn clear(&self) -> Result<(), ClientError> {
        let mut current = self.current.write().await;
        if let Some(persistence) = &self.persistence {
            persistence.store(None)?;
        }
        *current = None;
        Ok(())
    }
}
