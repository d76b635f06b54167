//! Change request data models.
//!
//! A [`ChangeRequest`] is a pending proposal to mutate a user's authoritative
//! state: either their bank account details or their balance (a withdrawal).
//! Requests are append-only history; they are created by the request ledger
//! and resolved only by the approval engine or the reconciliation processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::WorkflowError;

/// The kind of change a request proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Change the user's bank account details.
    BankInfo,
    /// Withdraw an amount from the user's balance.
    Withdrawal,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::BankInfo => "bank_info",
            RequestKind::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a change request.
///
/// `Completed` applies to withdrawal requests only: an approved withdrawal
/// becomes completed once the transfer is confirmed, either singly by an
/// admin or in bulk by a reconciliation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The proposed change, tagged by kind.
///
/// Proposed fields are stored verbatim and are never partially applied; the
/// subject-mutation step on approval is selected by this variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Proposed {
    BankInfo {
        account_holder: String,
        account_number: String,
        bank_name: String,
        bank_branch: String,
    },
    Withdrawal {
        amount: i64,
    },
}

impl Proposed {
    pub fn kind(&self) -> RequestKind {
        match self {
            Proposed::BankInfo { .. } => RequestKind::BankInfo,
            Proposed::Withdrawal { .. } => RequestKind::Withdrawal,
        }
    }

    /// Validates field completeness. Runs at submission time; approval does
    /// not re-validate content.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        match self {
            Proposed::BankInfo {
                account_holder,
                account_number,
                bank_name,
                bank_branch,
            } => {
                for (field, value) in [
                    ("account_holder", account_holder),
                    ("account_number", account_number),
                    ("bank_name", bank_name),
                    ("bank_branch", bank_branch),
                ] {
                    if value.trim().is_empty() {
                        return Err(WorkflowError::Validation(format!(
                            "{field} must not be empty"
                        )));
                    }
                }
                Ok(())
            }
            Proposed::Withdrawal { amount } => {
                if *amount <= 0 {
                    return Err(WorkflowError::Validation(
                        "withdrawal amount must be positive".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// A proposal to change a user's authoritative state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Unique identifier.
    pub id: Uuid,
    /// The user whose state the request proposes to change.
    pub subject: Uuid,
    /// Request kind, denormalized from the proposal for filtering.
    pub kind: RequestKind,
    /// The proposed change, stored verbatim.
    pub proposed: Proposed,
    /// Current status.
    pub status: RequestStatus,
    /// When the request was submitted.
    pub submitted_at: DateTime<Utc>,
    /// When the request was resolved (approved/rejected/completed).
    pub resolved_at: Option<DateTime<Utc>>,
    /// Username of the resolving actor.
    pub resolved_by: Option<String>,
    /// Reason recorded on rejection.
    pub resolution_reason: Option<String>,
}

impl ChangeRequest {
    /// Creates a new pending request.
    pub fn new(subject: Uuid, proposed: Proposed) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            kind: proposed.kind(),
            proposed,
            status: RequestStatus::Pending,
            submitted_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
            resolution_reason: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}
