//! Submission lifecycle.
//!
//! Drives a submission through
//! `pending -> admin_approved -> exported_for_review -> completed`, with
//! rejection possible until the owner confirms delivery. Completion is not
//! reachable from here: it belongs to the reconciliation processor.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::WorkflowError;
use crate::store::{PaginatedResult, Pagination, SubmissionStore, TaskStore};
use crate::submission::{SubmissionRecord, SubmissionStatus, Task};

pub struct SubmissionService {
    submissions: Arc<dyn SubmissionStore>,
    tasks: Arc<dyn TaskStore>,
}

impl SubmissionService {
    pub fn new(submissions: Arc<dyn SubmissionStore>, tasks: Arc<dyn TaskStore>) -> Self {
        Self { submissions, tasks }
    }

    fn require_admin(actor: &Identity) -> Result<(), WorkflowError> {
        if actor.role.is_admin() {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden(format!(
                "{} is not an administrator",
                actor.username
            )))
        }
    }

    fn require_owner(record: &SubmissionRecord, owner: Uuid) -> Result<(), WorkflowError> {
        if record.subject == owner {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden(
                "submission belongs to another user".to_string(),
            ))
        }
    }

    fn invalid_transition(from: SubmissionStatus, to: SubmissionStatus) -> WorkflowError {
        WorkflowError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Submits proof of task completion. The task's current target price is
    /// snapshotted into the record; earnings are fixed from this moment.
    pub async fn submit(
        &self,
        subject: Uuid,
        task_id: Uuid,
        purchase_price: i64,
        tracking_code: Option<String>,
    ) -> Result<SubmissionRecord, WorkflowError> {
        if purchase_price <= 0 {
            return Err(WorkflowError::Validation(
                "purchase price must be positive".to_string(),
            ));
        }
        if let Some(code) = &tracking_code {
            if code.trim().is_empty() {
                return Err(WorkflowError::Validation(
                    "tracking code must not be blank".to_string(),
                ));
            }
        }

        let task: Task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(WorkflowError::TaskNotFound(task_id))?;
        if !task.active {
            return Err(WorkflowError::Validation(format!(
                "task {} is no longer active",
                task.title
            )));
        }

        let record = SubmissionRecord::new(subject, &task, purchase_price, tracking_code);
        let record = self.submissions.insert(&record).await?;
        info!(
            submission_id = %record.id,
            subject = %subject,
            task = %task.id,
            earnings = record.earnings(),
            "submission created"
        );
        Ok(record)
    }

    /// Updates the tracking code. Owner-only, and only while the submission
    /// is still awaiting admin review.
    pub async fn update_tracking(
        &self,
        owner: Uuid,
        submission_id: Uuid,
        code: &str,
    ) -> Result<SubmissionRecord, WorkflowError> {
        if code.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "tracking code must not be blank".to_string(),
            ));
        }

        let mut record = self
            .submissions
            .get(submission_id)
            .await?
            .ok_or(WorkflowError::SubmissionNotFound(submission_id))?;
        Self::require_owner(&record, owner)?;

        if record.status != SubmissionStatus::Pending {
            return Err(WorkflowError::InvalidTransition {
                from: record.status.to_string(),
                to: "pending (tracking update)".to_string(),
            });
        }

        record.tracking_code = Some(code.trim().to_string());
        Ok(self.submissions.update(&record).await?)
    }

    /// Admin approval: `pending -> admin_approved`.
    pub async fn approve(
        &self,
        submission_id: Uuid,
        approver: &Identity,
    ) -> Result<SubmissionRecord, WorkflowError> {
        Self::require_admin(approver)?;

        let mut record = self
            .submissions
            .get(submission_id)
            .await?
            .ok_or(WorkflowError::SubmissionNotFound(submission_id))?;

        if record.status != SubmissionStatus::Pending {
            return Err(Self::invalid_transition(
                record.status,
                SubmissionStatus::AdminApproved,
            ));
        }

        record.status = SubmissionStatus::AdminApproved;
        record.approved_at = Some(Utc::now());
        record.approved_by = Some(approver.username.clone());

        let record = self.submissions.update(&record).await?;
        info!(submission_id = %record.id, approver = %approver.username, "submission approved");
        Ok(record)
    }

    /// Admin rejection with a mandatory reason. Allowed from `pending` and
    /// from `admin_approved` up to the point delivery is confirmed.
    pub async fn reject(
        &self,
        submission_id: Uuid,
        approver: &Identity,
        reason: &str,
    ) -> Result<SubmissionRecord, WorkflowError> {
        Self::require_admin(approver)?;

        if reason.trim().is_empty() {
            return Err(WorkflowError::EmptyReason);
        }

        let mut record = self
            .submissions
            .get(submission_id)
            .await?
            .ok_or(WorkflowError::SubmissionNotFound(submission_id))?;

        if !matches!(
            record.status,
            SubmissionStatus::Pending | SubmissionStatus::AdminApproved
        ) {
            return Err(Self::invalid_transition(
                record.status,
                SubmissionStatus::Rejected,
            ));
        }

        record.status = SubmissionStatus::Rejected;
        record.resolved_at = Some(Utc::now());
        record.resolved_by = Some(approver.username.clone());
        record.resolution_reason = Some(reason.trim().to_string());

        let record = self.submissions.update(&record).await?;
        info!(submission_id = %record.id, approver = %approver.username, "submission rejected");
        Ok(record)
    }

    /// Owner confirms the order was delivered:
    /// `admin_approved -> exported_for_review`. Any other starting state is
    /// rejected without side effect; the submission then waits for a
    /// reconciliation batch to settle it.
    pub async fn confirm_delivery(
        &self,
        owner: Uuid,
        submission_id: Uuid,
    ) -> Result<SubmissionRecord, WorkflowError> {
        let mut record = self
            .submissions
            .get(submission_id)
            .await?
            .ok_or(WorkflowError::SubmissionNotFound(submission_id))?;
        Self::require_owner(&record, owner)?;

        if record.status != SubmissionStatus::AdminApproved {
            return Err(Self::invalid_transition(
                record.status,
                SubmissionStatus::ExportedForReview,
            ));
        }

        record.status = SubmissionStatus::ExportedForReview;
        let record = self.submissions.update(&record).await?;
        info!(submission_id = %record.id, "delivery confirmed, awaiting reconciliation");
        Ok(record)
    }

    /// Full submission history for a member, newest first.
    pub async fn history_for(
        &self,
        subject: Uuid,
    ) -> Result<Vec<SubmissionRecord>, WorkflowError> {
        Ok(self.submissions.history_for(subject).await?)
    }

    /// Admin review queue, oldest first.
    pub async fn list_by_status(
        &self,
        status: SubmissionStatus,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<SubmissionRecord>, WorkflowError> {
        Ok(self.submissions.list_by_status(status, pagination).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::store::MemoryStore;

    fn admin() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            username: "admin".to_string(),
            role: Role::Admin,
        }
    }

    struct Fixture {
        service: SubmissionService,
        store: Arc<MemoryStore>,
        task: Task,
        owner: Uuid,
    }

    async fn setup() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let task = Task::new("Buy item X", "desc", 150_000);
        TaskStore::insert(store.as_ref(), &task).await.unwrap();
        Fixture {
            service: SubmissionService::new(store.clone(), store.clone()),
            store,
            task,
            owner: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_submit_snapshots_target_price() {
        let fx = setup().await;
        let record = fx
            .service
            .submit(fx.owner, fx.task.id, 100_000, Some("VN123".into()))
            .await
            .unwrap();
        assert_eq!(record.earnings(), 50_000);

        // Raising the task price afterwards does not change the snapshot.
        let mut task = fx.task.clone();
        task.target_price = 400_000;
        TaskStore::update(fx.store.as_ref(), &task).await.unwrap();

        let stored = SubmissionStore::get(fx.store.as_ref(), record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.earnings(), 50_000);
    }

    #[tokio::test]
    async fn test_submit_rejects_inactive_task() {
        let fx = setup().await;
        let mut task = fx.task.clone();
        task.active = false;
        TaskStore::update(fx.store.as_ref(), &task).await.unwrap();

        let result = fx.service.submit(fx.owner, task.id, 1_000, None).await;
        assert!(matches!(result, Err(WorkflowError::Validation(_))));
    }

    #[tokio::test]
    async fn test_confirm_delivery_requires_admin_approved() {
        let fx = setup().await;
        let record = fx
            .service
            .submit(fx.owner, fx.task.id, 100_000, Some("VN1".into()))
            .await
            .unwrap();

        // Still pending: guard rejects, state unchanged.
        let early = fx.service.confirm_delivery(fx.owner, record.id).await;
        assert!(matches!(early, Err(WorkflowError::InvalidTransition { .. })));
        let stored = SubmissionStore::get(fx.store.as_ref(), record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SubmissionStatus::Pending);

        fx.service.approve(record.id, &admin()).await.unwrap();
        let confirmed = fx.service.confirm_delivery(fx.owner, record.id).await.unwrap();
        assert_eq!(confirmed.status, SubmissionStatus::ExportedForReview);

        // Confirming twice is a guard violation as well.
        let twice = fx.service.confirm_delivery(fx.owner, record.id).await;
        assert!(matches!(twice, Err(WorkflowError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_confirm_delivery_owner_only() {
        let fx = setup().await;
        let record = fx
            .service
            .submit(fx.owner, fx.task.id, 100_000, None)
            .await
            .unwrap();
        fx.service.approve(record.id, &admin()).await.unwrap();

        let stranger = Uuid::new_v4();
        let result = fx.service.confirm_delivery(stranger, record.id).await;
        assert!(matches!(result, Err(WorkflowError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_reject_allowed_until_delivery_confirmed() {
        let fx = setup().await;
        let record = fx
            .service
            .submit(fx.owner, fx.task.id, 100_000, None)
            .await
            .unwrap();
        fx.service.approve(record.id, &admin()).await.unwrap();

        // Rejectable while admin_approved.
        let rejected = fx
            .service
            .reject(record.id, &admin(), "proof unreadable")
            .await
            .unwrap();
        assert_eq!(rejected.status, SubmissionStatus::Rejected);

        // But not after delivery confirmation.
        let second = fx
            .service
            .submit(fx.owner, fx.task.id, 90_000, Some("VN2".into()))
            .await
            .unwrap();
        fx.service.approve(second.id, &admin()).await.unwrap();
        fx.service.confirm_delivery(fx.owner, second.id).await.unwrap();
        let late = fx.service.reject(second.id, &admin(), "too late").await;
        assert!(matches!(late, Err(WorkflowError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_update_tracking_only_while_pending() {
        let fx = setup().await;
        let record = fx
            .service
            .submit(fx.owner, fx.task.id, 100_000, None)
            .await
            .unwrap();

        let updated = fx
            .service
            .update_tracking(fx.owner, record.id, "VN999")
            .await
            .unwrap();
        assert_eq!(updated.tracking_code.as_deref(), Some("VN999"));

        fx.service.approve(record.id, &admin()).await.unwrap();
        let late = fx.service.update_tracking(fx.owner, record.id, "VN000").await;
        assert!(matches!(late, Err(WorkflowError::InvalidTransition { .. })));

        let blank = fx.service.update_tracking(fx.owner, record.id, "  ").await;
        assert!(matches!(blank, Err(WorkflowError::Validation(_))));
    }
}
