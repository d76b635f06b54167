//! API error types and response mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use tp_core::{AuthError, ReconcileError, StoreError, WorkflowError};

/// API error type.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing, expired, or invalid access token. Clients react by running
    /// their refresh flow.
    #[error("Session expired")]
    SessionExpired,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Workflow state conflicts: duplicate pending request, resolution of a
    /// non-pending request, transition guard violations.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::SessionExpired | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::AccountDisabled | ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "internal error");
        }
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::AlreadyPending { .. }
            | WorkflowError::NotPending(_)
            | WorkflowError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            WorkflowError::EmptyReason
            | WorkflowError::Validation(_)
            | WorkflowError::InsufficientBalance { .. } => {
                ApiError::UnprocessableEntity(err.to_string())
            }
            WorkflowError::Forbidden(msg) => ApiError::Forbidden(msg),
            WorkflowError::UserNotFound(_)
            | WorkflowError::RequestNotFound(_)
            | WorkflowError::SubmissionNotFound(_)
            | WorkflowError::TaskNotFound(_) => ApiError::NotFound(err.to_string()),
            WorkflowError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Constraint(msg) => ApiError::Conflict(msg),
            StoreError::Serialization(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::AccountDisabled => ApiError::AccountDisabled,
            AuthError::InvalidRefreshToken => ApiError::SessionExpired,
            AuthError::Hash(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::MalformedBatch(msg) => ApiError::BadRequest(format!(
                "malformed batch: {msg}"
            )),
            ReconcileError::Workflow(e) => e.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::UnprocessableEntity(err.to_string())
    }
}
