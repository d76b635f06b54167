//! Approval engine.
//!
//! Applies administrator decisions to pending change requests. Approval
//! copies the proposed change onto the subject's authoritative state and
//! marks the request resolved in one store transaction; rejection records a
//! mandatory reason and never touches the subject. Both are idempotent in
//! the sense that a second resolution attempt fails with `NotPending` and
//! mutates nothing.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{BankAccount, Identity, User};
use crate::error::WorkflowError;
use crate::request::{ChangeRequest, Proposed, RequestKind, RequestStatus};
use crate::store::{RequestStore, UserStore};

pub struct ApprovalEngine {
    requests: Arc<dyn RequestStore>,
    users: Arc<dyn UserStore>,
}

impl ApprovalEngine {
    pub fn new(requests: Arc<dyn RequestStore>, users: Arc<dyn UserStore>) -> Self {
        Self { requests, users }
    }

    fn require_admin(approver: &Identity) -> Result<(), WorkflowError> {
        if approver.role.is_admin() {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden(format!(
                "{} is not an administrator",
                approver.username
            )))
        }
    }

    /// Approves a pending request and applies its proposal to the subject.
    ///
    /// The subject mutation is selected by the proposal variant: bank-info
    /// requests overwrite the subject's bank account, withdrawal requests
    /// debit the amount from the balance. The mutated subject and the
    /// resolved request are persisted as one store transaction; on any
    /// failure before that write nothing has changed.
    pub async fn approve(
        &self,
        request_id: Uuid,
        approver: &Identity,
    ) -> Result<User, WorkflowError> {
        Self::require_admin(approver)?;

        let mut request = self
            .requests
            .get(request_id)
            .await?
            .ok_or(WorkflowError::RequestNotFound(request_id))?;
        if !request.is_pending() {
            return Err(WorkflowError::NotPending(request_id));
        }

        let mut subject = self
            .users
            .get(request.subject)
            .await?
            .ok_or(WorkflowError::UserNotFound(request.subject))?;

        match &request.proposed {
            Proposed::BankInfo {
                account_holder,
                account_number,
                bank_name,
                bank_branch,
            } => {
                subject.bank_account = Some(BankAccount {
                    account_holder: account_holder.clone(),
                    account_number: account_number.clone(),
                    bank_name: bank_name.clone(),
                    bank_branch: bank_branch.clone(),
                });
            }
            Proposed::Withdrawal { amount } => {
                // The balance may have dropped since submission; the debit
                // happens here, so the check must too.
                if subject.balance < *amount {
                    return Err(WorkflowError::InsufficientBalance {
                        requested: *amount,
                        available: subject.balance,
                    });
                }
                subject.balance -= amount;
            }
        }

        let now = Utc::now();
        subject.updated_at = now;
        request.status = RequestStatus::Approved;
        request.resolved_at = Some(now);
        request.resolved_by = Some(approver.username.clone());

        let (request, subject) = self
            .requests
            .update_with_subject(&request, &subject)
            .await?;

        info!(
            request_id = %request.id,
            subject = %subject.id,
            kind = %request.kind,
            approver = %approver.username,
            "change request approved"
        );
        Ok(subject)
    }

    /// Rejects a pending request with a mandatory reason.
    ///
    /// Subject fields are never touched by rejection.
    pub async fn reject(
        &self,
        request_id: Uuid,
        approver: &Identity,
        reason: &str,
    ) -> Result<ChangeRequest, WorkflowError> {
        Self::require_admin(approver)?;

        if reason.trim().is_empty() {
            return Err(WorkflowError::EmptyReason);
        }

        let mut request = self
            .requests
            .get(request_id)
            .await?
            .ok_or(WorkflowError::RequestNotFound(request_id))?;
        if !request.is_pending() {
            return Err(WorkflowError::NotPending(request_id));
        }

        request.status = RequestStatus::Rejected;
        request.resolved_at = Some(Utc::now());
        request.resolved_by = Some(approver.username.clone());
        request.resolution_reason = Some(reason.trim().to_string());

        let request = self.requests.update(&request).await?;
        info!(
            request_id = %request.id,
            approver = %approver.username,
            "change request rejected"
        );
        Ok(request)
    }

    /// Marks an approved withdrawal as completed (transfer confirmed).
    ///
    /// Valid only for withdrawal requests in `Approved`; any other request
    /// or status fails with `InvalidTransition` and has no side effect. The
    /// bulk path for this transition is the reconciliation processor.
    pub async fn complete_withdrawal(
        &self,
        request_id: Uuid,
        actor: &Identity,
    ) -> Result<ChangeRequest, WorkflowError> {
        Self::require_admin(actor)?;

        let mut request = self
            .requests
            .get(request_id)
            .await?
            .ok_or(WorkflowError::RequestNotFound(request_id))?;

        if request.kind != RequestKind::Withdrawal
            || request.status != RequestStatus::Approved
        {
            return Err(WorkflowError::InvalidTransition {
                from: format!("{} {}", request.kind, request.status),
                to: RequestStatus::Completed.to_string(),
            });
        }

        request.status = RequestStatus::Completed;
        request.resolved_at = Some(Utc::now());
        request.resolved_by = Some(actor.username.clone());

        let request = self.requests.update(&request).await?;
        info!(request_id = %request.id, actor = %actor.username, "withdrawal completed");
        Ok(request)
    }
}
