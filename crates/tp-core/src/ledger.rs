//! Request ledger.
//!
//! Records change proposals against user state, enforcing the
//! at-most-one-pending invariant per (subject, kind) at the submission
//! boundary. Resolution belongs to the approval engine; the ledger only
//! creates and reads.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{StoreError, WorkflowError};
use crate::request::{ChangeRequest, Proposed, RequestKind};
use crate::store::{PaginatedResult, Pagination, RequestStore, UserStore};

pub struct RequestLedger {
    requests: Arc<dyn RequestStore>,
    users: Arc<dyn UserStore>,
}

impl RequestLedger {
    pub fn new(requests: Arc<dyn RequestStore>, users: Arc<dyn UserStore>) -> Self {
        Self { requests, users }
    }

    /// Submits a new change proposal.
    ///
    /// Field completeness is validated here and not re-checked at approval.
    /// Withdrawals additionally require the amount to be covered by the
    /// subject's current balance. The at-most-one-pending check is atomic
    /// with the insert: a concurrent duplicate loses inside the store and
    /// surfaces as `AlreadyPending`.
    pub async fn submit(
        &self,
        subject: Uuid,
        proposed: Proposed,
    ) -> Result<ChangeRequest, WorkflowError> {
        proposed.validate()?;

        let user = self
            .users
            .get(subject)
            .await?
            .ok_or(WorkflowError::UserNotFound(subject))?;

        if let Proposed::Withdrawal { amount } = &proposed {
            if *amount > user.balance {
                return Err(WorkflowError::InsufficientBalance {
                    requested: *amount,
                    available: user.balance,
                });
            }
        }

        let kind = proposed.kind();
        let request = ChangeRequest::new(subject, proposed);
        match self.requests.insert_pending(&request).await {
            Ok(request) => {
                info!(
                    request_id = %request.id,
                    subject = %subject,
                    kind = %kind,
                    "change request submitted"
                );
                Ok(request)
            }
            Err(StoreError::Constraint(_)) => {
                warn!(subject = %subject, kind = %kind, "submission blocked by open request");
                Err(WorkflowError::AlreadyPending { subject, kind })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Full request history for a subject, newest first.
    pub async fn history_for(&self, subject: Uuid) -> Result<Vec<ChangeRequest>, WorkflowError> {
        Ok(self.requests.history_for(subject).await?)
    }

    /// Pending requests for the admin review queue, oldest first.
    pub async fn list_pending(
        &self,
        kind: Option<RequestKind>,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<ChangeRequest>, WorkflowError> {
        Ok(self.requests.list_pending(kind, pagination).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{hash_password, Role, User};
    use crate::store::MemoryStore;

    fn bank_proposal() -> Proposed {
        Proposed::BankInfo {
            account_holder: "Nguyen Van A".into(),
            account_number: "0123456789".into(),
            bank_name: "ACB".into(),
            bank_branch: "Ho Chi Minh".into(),
        }
    }

    async fn setup() -> (RequestLedger, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let mut user = User::new("a@x.com", "alice", hash_password("pw").unwrap(), Role::Member);
        user.balance = 200_000;
        let subject = user.id;
        UserStore::insert(store.as_ref(), &user).await.unwrap();

        let ledger = RequestLedger::new(store.clone(), store);
        (ledger, subject)
    }

    #[tokio::test]
    async fn test_second_submission_fails_already_pending() {
        let (ledger, subject) = setup().await;

        ledger.submit(subject, bank_proposal()).await.unwrap();
        let second = ledger.submit(subject, bank_proposal()).await;
        assert!(matches!(
            second,
            Err(WorkflowError::AlreadyPending { kind: RequestKind::BankInfo, .. })
        ));
    }

    #[tokio::test]
    async fn test_different_kinds_do_not_block_each_other() {
        let (ledger, subject) = setup().await;

        ledger.submit(subject, bank_proposal()).await.unwrap();
        ledger
            .submit(subject, Proposed::Withdrawal { amount: 50_000 })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_withdrawal_over_balance_rejected() {
        let (ledger, subject) = setup().await;

        let result = ledger
            .submit(subject, Proposed::Withdrawal { amount: 500_000 })
            .await;
        assert!(matches!(
            result,
            Err(WorkflowError::InsufficientBalance {
                requested: 500_000,
                available: 200_000,
            })
        ));
    }

    #[tokio::test]
    async fn test_unknown_subject_rejected() {
        let (ledger, _) = setup().await;
        let ghost = Uuid::new_v4();
        assert!(matches!(
            ledger.submit(ghost, bank_proposal()).await,
            Err(WorkflowError::UserNotFound(id)) if id == ghost
        ));
    }

    #[tokio::test]
    async fn test_concurrent_submissions_produce_one_pending() {
        let (ledger, subject) = setup().await;
        let ledger = Arc::new(ledger);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.submit(subject, bank_proposal()).await
            }));
        }

        let mut ok = 0;
        let mut already_pending = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(WorkflowError::AlreadyPending { .. }) => already_pending += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(already_pending, 7);
    }
}
