//! In-memory entity store.
//!
//! A single [`MemoryStore`] implements all store traits over one
//! `tokio::sync::RwLock`. Holding the write guard across check-and-mutate is
//! what makes `insert_pending` and the `*_with_subject` updates transactional
//! here; a database-backed implementation would use its own transactions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::User;
use crate::error::StoreError;
use crate::request::{ChangeRequest, RequestKind, RequestStatus};
use crate::submission::{SubmissionRecord, SubmissionStatus, Task};

use super::{
    PaginatedResult, Pagination, RequestStore, SubmissionStore, TaskStore, UserStore,
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    requests: HashMap<Uuid, ChangeRequest>,
    submissions: HashMap<Uuid, SubmissionRecord>,
    tasks: HashMap<Uuid, Task>,
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(entity: &'static str, id: &Uuid) -> StoreError {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn insert(&self, user: &User) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(StoreError::Constraint(format!(
                "username or email already taken: {}",
                user.username
            )));
        }
        inner.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&user.id) {
            return Err(Self::not_found("user", &user.id));
        }
        inner.users.insert(user.id, user.clone());
        Ok(user.clone())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<ChangeRequest>, StoreError> {
        Ok(self.inner.read().await.requests.get(&id).cloned())
    }

    async fn insert_pending(&self, request: &ChangeRequest) -> Result<ChangeRequest, StoreError> {
        let mut inner = self.inner.write().await;
        let open = inner.requests.values().any(|r| {
            r.subject == request.subject
                && r.kind == request.kind
                && r.status == RequestStatus::Pending
        });
        if open {
            return Err(StoreError::Constraint(format!(
                "a pending {} request already exists for subject {}",
                request.kind, request.subject
            )));
        }
        inner.requests.insert(request.id, request.clone());
        Ok(request.clone())
    }

    async fn update(&self, request: &ChangeRequest) -> Result<ChangeRequest, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.requests.contains_key(&request.id) {
            return Err(Self::not_found("request", &request.id));
        }
        inner.requests.insert(request.id, request.clone());
        Ok(request.clone())
    }

    async fn update_with_subject(
        &self,
        request: &ChangeRequest,
        subject: &User,
    ) -> Result<(ChangeRequest, User), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.requests.contains_key(&request.id) {
            return Err(Self::not_found("request", &request.id));
        }
        if !inner.users.contains_key(&subject.id) {
            return Err(Self::not_found("user", &subject.id));
        }
        inner.requests.insert(request.id, request.clone());
        inner.users.insert(subject.id, subject.clone());
        Ok((request.clone(), subject.clone()))
    }

    async fn find_pending(
        &self,
        subject: Uuid,
        kind: RequestKind,
    ) -> Result<Option<ChangeRequest>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .requests
            .values()
            .find(|r| r.subject == subject && r.kind == kind && r.is_pending())
            .cloned())
    }

    async fn history_for(&self, subject: Uuid) -> Result<Vec<ChangeRequest>, StoreError> {
        let inner = self.inner.read().await;
        let mut result: Vec<ChangeRequest> = inner
            .requests
            .values()
            .filter(|r| r.subject == subject)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(result)
    }

    async fn list_pending(
        &self,
        kind: Option<RequestKind>,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<ChangeRequest>, StoreError> {
        let inner = self.inner.read().await;
        let mut matching: Vec<ChangeRequest> = inner
            .requests
            .values()
            .filter(|r| r.is_pending() && kind.map_or(true, |k| r.kind == k))
            .cloned()
            .collect();
        // Review queues are worked oldest first.
        matching.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));

        let total = matching.len() as u64;
        let items: Vec<ChangeRequest> = matching
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.limit())
            .collect();
        Ok(PaginatedResult::new(items, total, pagination))
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<SubmissionRecord>, StoreError> {
        Ok(self.inner.read().await.submissions.get(&id).cloned())
    }

    async fn insert(
        &self,
        submission: &SubmissionRecord,
    ) -> Result<SubmissionRecord, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.submissions.contains_key(&submission.id) {
            return Err(StoreError::Constraint(format!(
                "submission {} already exists",
                submission.id
            )));
        }
        inner.submissions.insert(submission.id, submission.clone());
        Ok(submission.clone())
    }

    async fn update(
        &self,
        submission: &SubmissionRecord,
    ) -> Result<SubmissionRecord, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.submissions.contains_key(&submission.id) {
            return Err(Self::not_found("submission", &submission.id));
        }
        inner.submissions.insert(submission.id, submission.clone());
        Ok(submission.clone())
    }

    async fn update_with_subject(
        &self,
        submission: &SubmissionRecord,
        subject: &User,
    ) -> Result<(SubmissionRecord, User), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.submissions.contains_key(&submission.id) {
            return Err(Self::not_found("submission", &submission.id));
        }
        if !inner.users.contains_key(&subject.id) {
            return Err(Self::not_found("user", &subject.id));
        }
        inner.submissions.insert(submission.id, submission.clone());
        inner.users.insert(subject.id, subject.clone());
        Ok((submission.clone(), subject.clone()))
    }

    async fn find_by_tracking_code(
        &self,
        code: &str,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .submissions
            .values()
            .filter(|s| s.tracking_code.as_deref() == Some(code))
            .max_by_key(|s| s.submitted_at)
            .cloned())
    }

    async fn history_for(&self, subject: Uuid) -> Result<Vec<SubmissionRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut result: Vec<SubmissionRecord> = inner
            .submissions
            .values()
            .filter(|s| s.subject == subject)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(result)
    }

    async fn list_by_status(
        &self,
        status: SubmissionStatus,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<SubmissionRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut matching: Vec<SubmissionRecord> = inner
            .submissions
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));

        let total = matching.len() as u64;
        let items: Vec<SubmissionRecord> = matching
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.limit())
            .collect();
        Ok(PaginatedResult::new(items, total, pagination))
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.inner.read().await.tasks.get(&id).cloned())
    }

    async fn insert(&self, task: &Task) -> Result<Task, StoreError> {
        let mut inner = self.inner.write().await;
        inner.tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn update(&self, task: &Task) -> Result<Task, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.tasks.contains_key(&task.id) {
            return Err(Self::not_found("task", &task.id));
        }
        inner.tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn list_active(&self) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.read().await;
        let mut result: Vec<Task> = inner.tasks.values().filter(|t| t.active).cloned().collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }
}
