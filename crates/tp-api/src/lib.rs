//! # tp-api
//!
//! REST surface for Taskpay: auth and token refresh, member request and
//! submission endpoints, admin review queues and decisions, and the CSV
//! reconciliation upload/export.

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
