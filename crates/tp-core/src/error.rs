//! Error types for the Taskpay core workflows.

use thiserror::Error;
use uuid::Uuid;

use crate::request::RequestKind;

/// Errors that can occur in the request/approval/submission workflows.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// A pending request of the same kind already exists for the subject.
    #[error("a {kind} request is already pending for user {subject}")]
    AlreadyPending { subject: Uuid, kind: RequestKind },

    /// Resolution was attempted on a request that is not pending.
    /// Also covers double-resolution of an already-resolved request.
    #[error("request {0} is not pending")]
    NotPending(Uuid),

    /// A state machine guard rejected the transition.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Rejection requires a non-empty reason.
    #[error("rejection reason must not be empty")]
    EmptyReason,

    /// The subject's balance cannot cover the requested amount.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    /// Submitted fields failed completeness validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The actor is not allowed to perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("user {0} not found")]
    UserNotFound(Uuid),

    #[error("request {0} not found")]
    RequestNotFound(Uuid),

    #[error("submission {0} not found")]
    SubmissionNotFound(Uuid),

    #[error("task {0} not found")]
    TaskNotFound(Uuid),

    /// Entity store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by entity store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Uniqueness or at-most-one-pending violation.
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
