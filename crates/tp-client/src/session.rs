//! Session manager.
//!
//! Wraps every outbound call with credential attachment and transparent
//! refresh. The refresh is single-flight: the first call to observe an
//! authorization failure starts exactly one refresh, every concurrently
//! failing call awaits that same outcome on a shared `watch` channel, and
//! the refresh itself runs in a detached task so that cancelling any one
//! waiting caller cannot kill it. Each original call is retried at most
//! once; a second authorization failure after a successful refresh is
//! surfaced unmodified.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::credentials::{Credential, CredentialStore, IdentitySnapshot};
use crate::error::{ClientError, TransportError};

/// Default deadline for the refresh call itself; exceeding it counts as a
/// refresh failure.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

/// An outbound API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Patch,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }
}

/// A successful API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ApiResponse {
    /// Deserializes the response body.
    pub fn json<D: DeserializeOwned>(&self) -> Result<D, ClientError> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

/// Token pair granted by login or refresh.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Identity issued with the grant; refresh responses may omit it.
    pub identity: Option<IdentitySnapshot>,
}

/// The wire the session manager talks through. Implemented by the reqwest
/// transport and by test doubles.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn execute(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse, TransportError>;

    async fn login(&self, username: &str, password: &str) -> Result<TokenGrant, TransportError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, TransportError>;
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Authenticated,
    RefreshInFlight,
    /// Terminal until an explicit new [`SessionManager::login`].
    Unauthenticated,
}

/// Shared outcome of one in-flight refresh.
#[derive(Debug, Clone)]
enum RefreshResult {
    Pending,
    Succeeded(String),
    Failed,
}

struct SessionInner<T> {
    transport: T,
    credentials: Arc<CredentialStore>,
    refresh_timeout: Duration,
    /// Receiver for the refresh currently in flight, if any. A stored
    /// receiver whose value is no longer `Pending` belongs to a finished
    /// refresh and is replaced on the next failure.
    inflight: Mutex<Option<watch::Receiver<RefreshResult>>>,
}

impl<T: Transport> SessionInner<T> {
    async fn run_refresh(inner: Arc<Self>, tx: watch::Sender<RefreshResult>) {
        match inner.do_refresh().await {
            Ok(access) => {
                info!("session refresh succeeded");
                let _ = tx.send(RefreshResult::Succeeded(access));
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed, invalidating session");
                if let Err(e) = inner.credentials.clear().await {
                    warn!(error = %e, "failed to clear credentials");
                }
                let _ = tx.send(RefreshResult::Failed);
            }
        }
    }

    async fn do_refresh(&self) -> Result<String, ClientError> {
        let refresh_token = self
            .credentials
            .refresh_token()
            .await
            .ok_or(ClientError::SessionExpired)?;

        let grant = timeout(self.refresh_timeout, self.transport.refresh(&refresh_token))
            .await
            .map_err(|_| ClientError::Timeout("refresh call timed out".to_string()))?
            .map_err(ClientError::from)?;

        let identity = match grant.identity {
            Some(identity) => Some(identity),
            None => self.credentials.identity().await,
        };
        let access = grant.access_token.clone();
        self.credentials
            .set(Credential {
                access_token: grant.access_token,
                refresh_token: grant.refresh_token,
                identity,
            })
            .await?;
        Ok(access)
    }
}

/// Wraps outbound calls with bearer attachment and single-flight refresh.
pub struct SessionManager<T: Transport> {
    inner: Arc<SessionInner<T>>,
}

impl<T: Transport> Clone for SessionManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: T, credentials: Arc<CredentialStore>) -> Self {
        Self::with_refresh_timeout(transport, credentials, DEFAULT_REFRESH_TIMEOUT)
    }

    pub fn with_refresh_timeout(
        transport: T,
        credentials: Arc<CredentialStore>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                transport,
                credentials,
                refresh_timeout,
                inflight: Mutex::new(None),
            }),
        }
    }

    /// Logs in and seeds the credential store. A failed login clears any
    /// stale credentials.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<IdentitySnapshot>, ClientError> {
        let grant = match self.inner.transport.login(username, password).await {
            Ok(grant) => grant,
            Err(e) => {
                let _ = self.inner.credentials.clear().await;
                return Err(e.into());
            }
        };

        let identity = grant.identity.clone();
        self.inner
            .credentials
            .set(Credential {
                access_token: grant.access_token,
                refresh_token: grant.refresh_token,
                identity: grant.identity,
            })
            .await?;
        info!(username = %username, "logged in");
        Ok(identity)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.inner.credentials.clear().await
    }

    pub async fn state(&self) -> SessionState {
        {
            let inflight = self.inner.inflight.lock().await;
            if let Some(rx) = inflight.as_ref() {
                if matches!(*rx.borrow(), RefreshResult::Pending) {
                    return SessionState::RefreshInFlight;
                }
            }
        }
        if self.inner.credentials.is_authenticated().await {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    /// Sends a request with the current access token; on an authorization
    /// failure, joins the single-flight refresh and retries exactly once.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let access = self
            .inner
            .credentials
            .access_token()
            .await
            .ok_or(ClientError::SessionExpired)?;

        match self.inner.transport.execute(&request, Some(&access)).await {
            Ok(response) => Ok(response),
            Err(TransportError::Unauthorized) => {
                debug!(path = %request.path, "authorization failed, joining refresh");
                let fresh = self.join_refresh(&access).await?;
                self.inner
                    .transport
                    .execute(&request, Some(&fresh))
                    .await
                    .map_err(ClientError::from)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns a usable access token after at most one refresh.
    ///
    /// If the pair has already rotated since `stale_access` was read, the
    /// rotated token is returned without touching the refresh endpoint.
    /// Otherwise the caller joins the in-flight refresh, starting one only
    /// if none exists.
    async fn join_refresh(&self, stale_access: &str) -> Result<String, ClientError> {
        if let Some(current) = self.inner.credentials.access_token().await {
            if current != stale_access {
                return Ok(current);
            }
        }

        let mut rx = {
            let mut inflight = self.inner.inflight.lock().await;
            match inflight.as_ref() {
                Some(rx) if matches!(*rx.borrow(), RefreshResult::Pending) => rx.clone(),
                _ => {
                    // Re-check under the lock: a refresh may have finished
                    // between the fast-path check and lock acquisition.
                    if let Some(current) = self.inner.credentials.access_token().await {
                        if current != stale_access {
                            return Ok(current);
                        }
                    }
                    let (tx, rx) = watch::channel(RefreshResult::Pending);
                    // Detached: a waiter's cancellation must not cancel the
                    // shared refresh.
                    tokio::spawn(SessionInner::run_refresh(self.inner.clone(), tx));
                    *inflight = Some(rx.clone());
                    rx
                }
            }
        };

        loop {
            let current = rx.borrow().clone();
            match current {
                RefreshResult::Pending => {
                    if rx.changed().await.is_err() {
                        return Err(ClientError::SessionExpired);
                    }
                }
                RefreshResult::Succeeded(access) => return Ok(access),
                RefreshResult::Failed => return Err(ClientError::SessionExpired),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;
    use uuid::Uuid;

    /// Test double: accepts exactly one valid access token, rotating it on
    /// each refresh.
    struct MockTransport {
        execute_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        valid_access: RwLock<String>,
        refresh_succeeds: bool,
        /// When false, a refresh grants a token the server still rejects.
        refresh_grants_valid: bool,
        refresh_delay: Duration,
    }

    impl MockTransport {
        fn new(valid_access: &str) -> Self {
            Self {
                execute_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                valid_access: RwLock::new(valid_access.to_string()),
                refresh_succeeds: true,
                refresh_grants_valid: true,
                refresh_delay: Duration::from_millis(50),
            }
        }

        fn failing_refresh(valid_access: &str) -> Self {
            Self {
                refresh_succeeds: false,
                ..Self::new(valid_access)
            }
        }

        fn revoked_after_refresh(valid_access: &str) -> Self {
            Self {
                refresh_grants_valid: false,
                ..Self::new(valid_access)
            }
        }
    }

    #[async_trait]
    impl Transport for Arc<MockTransport> {
        async fn execute(
            &self,
            _request: &ApiRequest,
            access_token: Option<&str>,
        ) -> Result<ApiResponse, TransportError> {
            self.execute_calls.fetch_add(1, Ordering::SeqCst);
            let valid = self.valid_access.read().await;
            if access_token == Some(valid.as_str()) {
                Ok(ApiResponse {
                    status: 200,
                    body: serde_json::json!({"ok": true}),
                })
            } else {
                Err(TransportError::Unauthorized)
            }
        }

        async fn login(
            &self,
            username: &str,
            _password: &str,
        ) -> Result<TokenGrant, TransportError> {
            if username == "locked" {
                return Err(TransportError::Api {
                    status: 401,
                    message: "invalid username or password".to_string(),
                });
            }
            let valid = self.valid_access.read().await.clone();
            Ok(TokenGrant {
                access_token: valid,
                refresh_token: "refresh-0".to_string(),
                identity: Some(IdentitySnapshot {
                    user_id: Uuid::new_v4(),
                    username: username.to_string(),
                    role: "member".to_string(),
                }),
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, TransportError> {
            let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.refresh_delay).await;
            if !self.refresh_succeeds {
                return Err(TransportError::Api {
                    status: 401,
                    message: "invalid refresh token".to_string(),
                });
            }
            let access = format!("access-{n}");
            if self.refresh_grants_valid {
                *self.valid_access.write().await = access.clone();
            }
            Ok(TokenGrant {
                access_token: access,
                refresh_token: format!("refresh-{n}"),
                identity: None,
            })
        }
    }

    async fn session_with(
        transport: Arc<MockTransport>,
        access: &str,
    ) -> SessionManager<Arc<MockTransport>> {
        let credentials = Arc::new(CredentialStore::in_memory());
        credentials
            .set(Credential {
                access_token: access.to_string(),
                refresh_token: "refresh-0".to_string(),
                identity: None,
            })
            .await
            .unwrap();
        SessionManager::new(transport, credentials)
    }

    #[tokio::test]
    async fn test_valid_token_passes_through() {
        let transport = Arc::new(MockTransport::new("good"));
        let session = session_with(transport.clone(), "good").await;

        let response = session.send(ApiRequest::get("/api/tasks")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_five_concurrent_failures_share_one_refresh() {
        let transport = Arc::new(MockTransport::new("fresh"));
        let session = session_with(transport.clone(), "stale").await;

        let mut handles = Vec::new();
        for _ in 0..5 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                session.send(ApiRequest::get("/api/tasks")).await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.is_ok(), "expected success, got {result:?}");
        }
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.state().await, SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_refresh_failure_expires_all_waiters() {
        let transport = Arc::new(MockTransport::failing_refresh("fresh"));
        let session = session_with(transport.clone(), "stale").await;

        let mut handles = Vec::new();
        for _ in 0..5 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                session.send(ApiRequest::get("/api/tasks")).await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(
                matches!(result, Err(ClientError::SessionExpired)),
                "expected SessionExpired, got {result:?}"
            );
        }
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
        // The session was invalidated; no credentials remain.
        assert_eq!(session.state().await, SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_retry_happens_at_most_once() {
        // The refresh succeeds, but the server still rejects the granted
        // token: the retried call fails and is surfaced as-is.
        let transport = Arc::new(MockTransport::revoked_after_refresh("unreachable"));
        let session = session_with(transport.clone(), "stale").await;

        let result = session.send(ApiRequest::get("/api/tasks")).await;
        assert!(matches!(result, Err(ClientError::Unauthorized)));
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
        // Original attempt plus exactly one retry.
        assert_eq!(transport.execute_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_access_token_fails_without_network() {
        let transport = Arc::new(MockTransport::new("good"));
        let credentials = Arc::new(CredentialStore::in_memory());
        let session = SessionManager::new(transport.clone(), credentials);

        let result = session.send(ApiRequest::get("/api/tasks")).await;
        assert!(matches!(result, Err(ClientError::SessionExpired)));
        assert_eq!(transport.execute_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_cancel_refresh() {
        let transport = Arc::new(MockTransport::new("fresh"));
        let session = session_with(transport.clone(), "stale").await;

        let handle = {
            let session = session.clone();
            tokio::spawn(async move { session.send(ApiRequest::get("/api/tasks")).await })
        };
        // Let the call hit the 401 and start the refresh, then cancel it.
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();
        let _ = handle.await;

        // The detached refresh still completes and rotates the pair.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
        let response = session.send(ApiRequest::get("/api/tasks")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_expiry_starts_a_new_refresh() {
        let transport = Arc::new(MockTransport::new("fresh"));
        let session = session_with(transport.clone(), "stale").await;

        session.send(ApiRequest::get("/api/tasks")).await.unwrap();
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);

        // Server-side the token expires again.
        *transport.valid_access.write().await = "rotated-away".to_string();

        session.send(ApiRequest::get("/api/tasks")).await.unwrap();
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_login_seeds_credentials_and_failure_clears_them() {
        let transport = Arc::new(MockTransport::new("good"));
        let credentials = Arc::new(CredentialStore::in_memory());
        let session = SessionManager::new(transport.clone(), credentials.clone());

        let identity = session.login("alice", "pw").await.unwrap().unwrap();
        assert_eq!(identity.username, "alice");
        assert!(credentials.is_authenticated().await);
        assert_eq!(session.state().await, SessionState::Authenticated);

        let failed = session.login("locked", "pw").await;
        assert!(matches!(failed, Err(ClientError::Api { status: 401, .. })));
        assert!(!credentials.is_authenticated().await);
        assert_eq!(session.state().await, SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_refresh_timeout_counts_as_failure() {
        let transport = Arc::new(MockTransport {
            refresh_delay: Duration::from_secs(5),
            ..MockTransport::new("fresh")
        });
        let credentials = Arc::new(CredentialStore::in_memory());
        credentials
            .set(Credential {
                access_token: "stale".to_string(),
                refresh_token: "refresh-0".to_string(),
                identity: None,
            })
            .await
            .unwrap();
        let session = SessionManager::with_refresh_timeout(
            transport.clone(),
            credentials,
            Duration::from_millis(20),
        );

        let result = session.send(ApiRequest::get("/api/tasks")).await;
        assert!(matches!(result, Err(ClientError::SessionExpired)));
        assert_eq!(session.state().await, SessionState::Unauthenticated);
    }
}
