//! Authentication types for Taskpay.
//!
//! This module provides user accounts with Argon2 password hashing and the
//! server side of the session token lifecycle: opaque access/refresh token
//! pairs with expiry and single-use refresh rotation. The API layer maps a
//! failed access-token validation to 401 so clients can run their refresh
//! flow.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default lifetime of an access token.
pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 15;

/// Default lifetime of a refresh token.
pub const DEFAULT_REFRESH_TTL_HOURS: i64 = 24 * 7;

/// User roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular platform member: performs tasks, submits proof, requests
    /// bank-info changes and withdrawals.
    Member,
    /// Back-office administrator: resolves requests and runs reconciliation.
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bank account details held on a user profile.
///
/// These fields are authoritative state: they are only ever written by the
/// approval engine applying an approved bank-info change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub account_holder: String,
    pub account_number: String,
    pub bank_name: String,
    pub bank_branch: String,
}

/// A platform user.
///
/// The user record doubles as the subject of bank-info and withdrawal change
/// requests: its bank account and balance are mutated only through the
/// approval engine and the reconciliation processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier.
    pub id: Uuid,
    /// Email address (unique).
    pub email: String,
    /// Username for login (unique).
    pub username: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// User role.
    pub role: Role,
    /// Current balance in VND. Credited by submission completion, debited
    /// by withdrawal approval.
    pub balance: i64,
    /// Approved bank account details, if any.
    pub bank_account: Option<BankAccount>,
    /// Member-editable referral code.
    pub referral_code: Option<String>,
    /// Whether the account is enabled.
    pub enabled: bool,
    /// Account creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Creates a new enabled user with a zero balance.
    pub fn new(
        email: impl Into<String>,
        username: impl Into<String>,
        password_hash: impl Into<String>,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            username: username.into(),
            password_hash: password_hash.into(),
            role,
            balance: 0,
            bank_account: None,
            referral_code: None,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the identity snapshot used in tokens and audit fields.
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id,
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// Identity attached to a validated access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

/// Authentication errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account disabled")]
    AccountDisabled,

    /// The refresh token is unknown, expired, or already rotated away.
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Hashes a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Verifies a password against a stored Argon2 hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// An issued access/refresh token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Issues and validates opaque session tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Issues a fresh token pair for the user.
    async fn issue(&self, identity: Identity) -> TokenPair;

    /// Validates an access token, returning the identity it was issued for.
    /// Expired and unknown tokens return `None`.
    async fn validate_access(&self, token: &str) -> Option<Identity>;

    /// Rotates a refresh token into a new pair. The presented refresh token
    /// is consumed: a second use fails even if it has not expired.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;

    /// Revokes all tokens issued to a user.
    async fn revoke_user(&self, user_id: Uuid);
}

#[derive(Debug, Clone)]
struct TokenEntry {
    identity: Identity,
    expires_at: DateTime<Utc>,
}

/// In-memory [`TokenStore`].
pub struct MemoryTokenStore {
    access: RwLock<HashMap<String, TokenEntry>>,
    refresh: RwLock<HashMap<String, TokenEntry>>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::with_ttls(
            Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            Duration::hours(DEFAULT_REFRESH_TTL_HOURS),
        )
    }

    pub fn with_ttls(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            access: RwLock::new(HashMap::new()),
            refresh: RwLock::new(HashMap::new()),
            access_ttl,
            refresh_ttl,
        }
    }
}

/// Generates an opaque token using the OS random number generator.
fn generate_token() -> String {
    use rand::rngs::OsRng;
    use rand::Rng;

    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..48)
        .map(|_| CHARSET[OsRng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn issue(&self, identity: Identity) -> TokenPair {
        let now = Utc::now();
        let pair = TokenPair {
            access_token: generate_token(),
            refresh_token: generate_token(),
            access_expires_at: now + self.access_ttl,
            refresh_expires_at: now + self.refresh_ttl,
        };

        self.access.write().await.insert(
            pair.access_token.clone(),
            TokenEntry {
                identity: identity.clone(),
                expires_at: pair.access_expires_at,
            },
        );
        self.refresh.write().await.insert(
            pair.refresh_token.clone(),
            TokenEntry {
                identity,
                expires_at: pair.refresh_expires_at,
            },
        );

        pair
    }

    async fn validate_access(&self, token: &str) -> Option<Identity> {
        let access = self.access.read().await;
        access.get(token).and_then(|entry| {
            if entry.expires_at > Utc::now() {
                Some(entry.identity.clone())
            } else {
                None
            }
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        // Remove-then-reissue under the write lock so a concurrently replayed
        // refresh token cannot be rotated twice.
        let entry = {
            let mut refresh = self.refresh.write().await;
            refresh
                .remove(refresh_token)
                .ok_or(AuthError::InvalidRefreshToken)?
        };

        if entry.expires_at <= Utc::now() {
            return Err(AuthError::InvalidRefreshToken);
        }

        Ok(self.issue(entry.identity).await)
    }

    async fn revoke_user(&self, user_id: Uuid) {
        self.access
            .write()
            .await
            .retain(|_, entry| entry.identity.user_id != user_id);
        self.refresh
            .write()
            .await
            .retain(|_, entry| entry.identity.user_id != user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            role: Role::Member,
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("s3cret-password").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("s3cret-password", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let store = MemoryTokenStore::new();
        let id = identity();
        let pair = store.issue(id.clone()).await;

        let validated = store.validate_access(&pair.access_token).await.unwrap();
        assert_eq!(validated, id);
        assert!(store.validate_access("unknown-token").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_access_token_rejected() {
        let store =
            MemoryTokenStore::with_ttls(Duration::minutes(-1), Duration::hours(1));
        let pair = store.issue(identity()).await;
        assert!(store.validate_access(&pair.access_token).await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_consumes() {
        let store = MemoryTokenStore::new();
        let pair = store.issue(identity()).await;

        let rotated = store.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);
        assert!(store.validate_access(&rotated.access_token).await.is_some());

        // The old refresh token was consumed by the rotation.
        let replay = store.refresh(&pair.refresh_token).await;
        assert!(matches!(replay, Err(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_revoke_user_clears_tokens() {
        let store = MemoryTokenStore::new();
        let id = identity();
        let pair = store.issue(id.clone()).await;

        store.revoke_user(id.user_id).await;
        assert!(store.validate_access(&pair.access_token).await.is_none());
        assert!(store.refresh(&pair.refresh_token).await.is_err());
    }
}
