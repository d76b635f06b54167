//! # tp-core
//!
//! Core domain and workflow engines for Taskpay: the request ledger,
//! approval engine, reconciliation processor, and submission lifecycle,
//! together with the entity-store traits they run against and the server
//! side of the session token lifecycle.

pub mod approval;
pub mod auth;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod reconcile;
pub mod request;
pub mod store;
pub mod submission;

pub use approval::ApprovalEngine;
pub use error::{StoreError, WorkflowError};
pub use ledger::RequestLedger;
pub use lifecycle::SubmissionService;
pub use reconcile::{
    parse_batch, BatchRecord, BatchReport, ParsedBatch, ReconcileError, ReconciliationProcessor,
};
pub use request::{ChangeRequest, Proposed, RequestKind, RequestStatus};
pub use submission::{SubmissionRecord, SubmissionStatus, Task};

// Auth exports
pub use auth::{
    hash_password, verify_password, AuthError, BankAccount, Identity, MemoryTokenStore, Role,
    TokenPair, TokenStore, User,
};
