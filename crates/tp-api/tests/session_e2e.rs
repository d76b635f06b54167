//! End-to-end session lifecycle: a real server on a loopback port, driven
//! through the client's session manager, exercising the 401 -> refresh ->
//! retry path against the actual token store.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tp_api::{build_router, AppState};
use tp_client::{ApiRequest, CredentialStore, HttpTransport, SessionManager, SessionState};
use tp_core::store::{MemoryStore, UserStore};
use tp_core::{hash_password, MemoryTokenStore, Role, User};

/// Serves an app whose access tokens expire almost immediately, so a second
/// call is guaranteed to need the refresh flow.
async fn spawn_server(access_ttl: chrono::Duration) -> SocketAddr {
    let store = Arc::new(MemoryStore::new());
    let user = User::new(
        "alice@example.com",
        "alice",
        hash_password("alice-password").unwrap(),
        Role::Member,
    );
    UserStore::insert(store.as_ref(), &user).await.unwrap();

    let tokens = Arc::new(MemoryTokenStore::with_ttls(
        access_ttl,
        chrono::Duration::hours(1),
    ));
    let state = AppState::new(store, tokens);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_transparent_refresh_against_real_server() {
    let addr = spawn_server(chrono::Duration::milliseconds(300)).await;

    let credentials = Arc::new(CredentialStore::in_memory());
    let transport = HttpTransport::new(format!("http://{addr}")).unwrap();
    let session = SessionManager::new(transport, credentials.clone());

    let identity = session.login("alice", "alice-password").await.unwrap().unwrap();
    assert_eq!(identity.username, "alice");
    assert_eq!(session.state().await, SessionState::Authenticated);
    let original_refresh = credentials.refresh_token().await.unwrap();

    // Works while the access token is fresh.
    let response = session.send(ApiRequest::get("/api/auth/me")).await.unwrap();
    assert_eq!(response.body["username"], "alice");

    // Let the access token expire; the next call must refresh and retry
    // without surfacing the 401.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let response = session.send(ApiRequest::get("/api/auth/me")).await.unwrap();
    assert_eq!(response.body["username"], "alice");

    // The pair rotated in the credential store.
    let rotated_refresh = credentials.refresh_token().await.unwrap();
    assert_ne!(rotated_refresh, original_refresh);
    assert_eq!(session.state().await, SessionState::Authenticated);
}

#[tokio::test]
async fn test_failed_login_and_expired_session() {
    let addr = spawn_server(chrono::Duration::minutes(5)).await;

    let credentials = Arc::new(CredentialStore::in_memory());
    let transport = HttpTransport::new(format!("http://{addr}")).unwrap();
    let session = SessionManager::new(transport, credentials.clone());

    let failed = session.login("alice", "wrong-password").await;
    assert!(failed.is_err());
    assert_eq!(session.state().await, SessionState::Unauthenticated);

    // Without credentials every call short-circuits.
    let result = session.send(ApiRequest::get("/api/auth/me")).await;
    assert!(matches!(result, Err(tp_client::ClientError::SessionExpired)));
}
