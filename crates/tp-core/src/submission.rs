//! Task and submission data models.
//!
//! A [`SubmissionRecord`] tracks one member's proof of a completed purchase
//! task through the five-state lifecycle: pending review, admin approval,
//! delivery confirmation, and final settlement through reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A purchase task members can perform for a reward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Current target price in VND. Snapshotted into each submission; later
    /// edits never affect already-submitted earnings.
    pub target_price: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>, description: impl Into<String>, target_price: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            target_price,
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// Status of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Waiting for admin review.
    Pending,
    /// Approved by an admin; waiting for the owner to confirm delivery.
    AdminApproved,
    /// Delivery confirmed; waiting for a reconciliation batch.
    ExportedForReview,
    /// Settled by reconciliation. Terminal.
    Completed,
    /// Rejected by an admin. Terminal.
    Rejected,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Completed | SubmissionStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::AdminApproved => "admin_approved",
            SubmissionStatus::ExportedForReview => "exported_for_review",
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One member's proof of task completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Unique identifier.
    pub id: Uuid,
    /// The submitting member.
    pub subject: Uuid,
    /// The task the submission is for.
    pub task_id: Uuid,
    /// Task title at submission time, for display.
    pub task_title: String,
    /// What the member paid, in VND.
    pub purchase_price: i64,
    /// The task's target price at submission time. Earnings are computed
    /// from this snapshot, never from the live task.
    pub effective_target_price: i64,
    /// Shipping tracking code; the correlation key for reconciliation.
    pub tracking_code: Option<String>,
    /// Current status.
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    /// When and by whom the submission was admin-approved.
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    /// When the submission reached a terminal state.
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    /// Reason recorded on rejection.
    pub resolution_reason: Option<String>,
}

impl SubmissionRecord {
    /// Creates a new pending submission, snapshotting the task's current
    /// target price.
    pub fn new(
        subject: Uuid,
        task: &Task,
        purchase_price: i64,
        tracking_code: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            task_id: task.id,
            task_title: task.title.clone(),
            purchase_price,
            effective_target_price: task.target_price,
            tracking_code,
            status: SubmissionStatus::Pending,
            submitted_at: Utc::now(),
            approved_at: None,
            approved_by: None,
            resolved_at: None,
            resolved_by: None,
            resolution_reason: None,
        }
    }

    /// Earnings fixed at submission time: the snapshotted target price minus
    /// the purchase price.
    pub fn earnings(&self) -> i64 {
        self.effective_target_price - self.purchase_price
    }
}
