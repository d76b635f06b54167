//! Entity store traits for Taskpay.
//!
//! The workflow engines reach persistence through these CRUD-like traits.
//! Every method is assumed transactional per call; combined methods such as
//! [`RequestStore::insert_pending`] and the `*_with_subject` updates exist
//! precisely where a workflow needs check-and-mutate or a two-entity write
//! to happen inside one store transaction.

mod memory;
mod pagination;

pub use memory::MemoryStore;
pub use pagination::{PaginatedResult, Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::User;
use crate::error::StoreError;
use crate::request::{ChangeRequest, RequestKind};
use crate::submission::{SubmissionRecord, SubmissionStatus, Task};

/// Repository for user accounts (the subjects of change requests).
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Inserts a new user. Fails with `Constraint` on a duplicate username
    /// or email.
    async fn insert(&self, user: &User) -> Result<User, StoreError>;

    /// Replaces the stored user record.
    async fn update(&self, user: &User) -> Result<User, StoreError>;
}

/// Repository for change requests.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<ChangeRequest>, StoreError>;

    /// Inserts a new pending request, enforcing at-most-one-pending per
    /// (subject, kind) atomically with the insert. A violation fails with
    /// `Constraint` and inserts nothing.
    async fn insert_pending(&self, request: &ChangeRequest) -> Result<ChangeRequest, StoreError>;

    /// Replaces the stored request record.
    async fn update(&self, request: &ChangeRequest) -> Result<ChangeRequest, StoreError>;

    /// Persists a resolved request together with its mutated subject as one
    /// transaction.
    async fn update_with_subject(
        &self,
        request: &ChangeRequest,
        subject: &User,
    ) -> Result<(ChangeRequest, User), StoreError>;

    /// Returns the open request for (subject, kind), if any.
    async fn find_pending(
        &self,
        subject: Uuid,
        kind: RequestKind,
    ) -> Result<Option<ChangeRequest>, StoreError>;

    /// All requests for a subject, newest first.
    async fn history_for(&self, subject: Uuid) -> Result<Vec<ChangeRequest>, StoreError>;

    /// Pending requests across subjects, oldest first, optionally filtered
    /// by kind.
    async fn list_pending(
        &self,
        kind: Option<RequestKind>,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<ChangeRequest>, StoreError>;
}

/// Repository for task submissions.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<SubmissionRecord>, StoreError>;

    async fn insert(&self, submission: &SubmissionRecord)
        -> Result<SubmissionRecord, StoreError>;

    async fn update(&self, submission: &SubmissionRecord)
        -> Result<SubmissionRecord, StoreError>;

    /// Persists a settled submission together with its credited owner as one
    /// transaction.
    async fn update_with_subject(
        &self,
        submission: &SubmissionRecord,
        subject: &User,
    ) -> Result<(SubmissionRecord, User), StoreError>;

    /// Looks up a submission by its tracking code (the reconciliation
    /// correlation key). If several submissions share a code, the most
    /// recently submitted one wins.
    async fn find_by_tracking_code(
        &self,
        code: &str,
    ) -> Result<Option<SubmissionRecord>, StoreError>;

    /// All submissions for a subject, newest first.
    async fn history_for(&self, subject: Uuid) -> Result<Vec<SubmissionRecord>, StoreError>;

    /// Submissions in the given status, oldest first.
    async fn list_by_status(
        &self,
        status: SubmissionStatus,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<SubmissionRecord>, StoreError>;
}

/// Repository for tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    async fn insert(&self, task: &Task) -> Result<Task, StoreError>;

    async fn update(&self, task: &Task) -> Result<Task, StoreError>;

    /// Active tasks, newest first.
    async fn list_active(&self) -> Result<Vec<Task>, StoreError>;
}
