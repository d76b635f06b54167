//! # tp-client
//!
//! Client-side session lifecycle for the Taskpay API: a credential store
//! with persistence hooks and a session manager that attaches the bearer
//! token to every call and transparently refreshes it, single-flight, when
//! the server rejects it.

pub mod credentials;
pub mod error;
pub mod http;
pub mod session;

pub use credentials::{
    Credential, CredentialPersistence, CredentialStore, FileCredentialStore, IdentitySnapshot,
};
pub use error::{ClientError, TransportError};
pub use http::HttpTransport;
pub use session::{
    ApiRequest, ApiResponse, Method, SessionManager, SessionState, TokenGrant, Transport,
};
