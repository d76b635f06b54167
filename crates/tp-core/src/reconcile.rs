//! Reconciliation processor.
//!
//! Consumes an uploaded batch of (correlation key, outcome) records and
//! applies bulk state transitions: tracking codes settle submissions in
//! `exported_for_review`, request ids complete approved withdrawals. One bad
//! record never aborts a batch; every failure is recorded in the report and
//! processing continues in file order. Only a structurally unreadable file
//! is fatal, before any record is applied.

use chrono::Utc;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::request::{RequestKind, RequestStatus};
use crate::store::{RequestStore, SubmissionStore, UserStore};
use crate::submission::SubmissionStatus;

/// The outcome value a batch record carries. Only settlement is accepted;
/// anything else in the outcome column is a per-record error.
pub const OUTCOME_COMPLETED: &str = "completed";

/// Fatal reconciliation errors. Per-record failures are never errors; they
/// accumulate in the [`BatchReport`].
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The batch file is structurally unreadable (bad header or encoding).
    /// Nothing has been applied.
    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// One parsed batch record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRecord {
    /// Correlation key: a tracking code for submissions, a request id for
    /// withdrawals.
    pub key: String,
    /// Outcome value, lower-cased. Defaults to [`OUTCOME_COMPLETED`] when
    /// the file has no outcome column.
    pub outcome: String,
}

/// A parsed batch: records in file order plus per-row parse errors.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub records: Vec<BatchRecord>,
    pub row_errors: Vec<String>,
}

/// Result of applying one batch. Ephemeral; exists only for the caller's
/// report.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    /// Correlation keys applied, in file order.
    pub applied: Vec<String>,
    /// Descriptive per-record errors, in file order.
    pub errors: Vec<String>,
}

impl BatchReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// Parses a CSV batch. The first column is the correlation key; an optional
/// `outcome` column overrides the default outcome. A missing header is
/// fatal; unreadable or empty rows are per-record errors.
pub fn parse_batch<R: io::Read>(reader: R) -> Result<ParsedBatch, ReconcileError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| ReconcileError::MalformedBatch(e.to_string()))?
        .clone();
    if headers.is_empty() {
        return Err(ReconcileError::MalformedBatch(
            "batch file has no header row".to_string(),
        ));
    }
    let outcome_column = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("outcome"));

    let mut batch = ParsedBatch::default();
    for (index, row) in csv_reader.records().enumerate() {
        let line = index + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                batch.row_errors.push(format!("line {line}: unreadable row: {e}"));
                continue;
            }
        };

        let key = row.get(0).unwrap_or("").trim();
        if key.is_empty() {
            batch.row_errors.push(format!("line {line}: missing correlation key"));
            continue;
        }

        let outcome = outcome_column
            .and_then(|i| row.get(i))
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(OUTCOME_COMPLETED)
            .trim()
            .to_lowercase();

        batch.records.push(BatchRecord {
            key: key.to_string(),
            outcome,
        });
    }

    Ok(batch)
}

pub struct ReconciliationProcessor {
    submissions: Arc<dyn SubmissionStore>,
    requests: Arc<dyn RequestStore>,
    users: Arc<dyn UserStore>,
}

impl ReconciliationProcessor {
    pub fn new(
        submissions: Arc<dyn SubmissionStore>,
        requests: Arc<dyn RequestStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            submissions,
            requests,
            users,
        }
    }

    /// Settles submissions by tracking code:
    /// `exported_for_review -> completed`, crediting the snapshotted
    /// earnings to the owner's balance in the same store transaction.
    ///
    /// Duplicate keys within one batch are processed independently in file
    /// order; the second occurrence finds an already-completed record and is
    /// reported as an error, exactly like a key re-uploaded from an earlier
    /// batch. No record is ever credited twice.
    pub async fn settle_submissions(&self, batch: ParsedBatch) -> BatchReport {
        let mut report = BatchReport {
            applied: Vec::new(),
            errors: batch.row_errors,
        };

        for record in batch.records {
            match self.settle_one(&record).await {
                Ok(()) => report.applied.push(record.key),
                Err(message) => report.errors.push(message),
            }
        }

        info!(
            applied = report.applied_count(),
            errors = report.error_count(),
            "submission reconciliation batch finished"
        );
        report
    }

    async fn settle_one(&self, record: &BatchRecord) -> Result<(), String> {
        if record.outcome != OUTCOME_COMPLETED {
            return Err(format!(
                "tracking code {}: unsupported outcome \"{}\"",
                record.key, record.outcome
            ));
        }

        let mut submission = self
            .submissions
            .find_by_tracking_code(&record.key)
            .await
            .map_err(|e| format!("tracking code {}: {e}", record.key))?
            .ok_or_else(|| format!("tracking code {}: no matching submission", record.key))?;

        if submission.status != SubmissionStatus::ExportedForReview {
            return Err(format!(
                "tracking code {}: submission is {}, expected {}",
                record.key,
                submission.status,
                SubmissionStatus::ExportedForReview
            ));
        }

        let mut owner = self
            .users
            .get(submission.subject)
            .await
            .map_err(|e| format!("tracking code {}: {e}", record.key))?
            .ok_or_else(|| {
                format!(
                    "tracking code {}: owner {} not found",
                    record.key, submission.subject
                )
            })?;

        let now = Utc::now();
        submission.status = SubmissionStatus::Completed;
        submission.resolved_at = Some(now);
        submission.resolved_by = Some("reconciliation".to_string());
        owner.balance += submission.earnings();
        owner.updated_at = now;

        self.submissions
            .update_with_subject(&submission, &owner)
            .await
            .map_err(|e| format!("tracking code {}: {e}", record.key))?;

        Ok(())
    }

    /// Completes approved withdrawals by request id:
    /// `approved -> completed`. Same partial-failure rules as
    /// [`Self::settle_submissions`].
    pub async fn complete_withdrawals(&self, batch: ParsedBatch) -> BatchReport {
        let mut report = BatchReport {
            applied: Vec::new(),
            errors: batch.row_errors,
        };

        for record in batch.records {
            match self.complete_one(&record).await {
                Ok(()) => report.applied.push(record.key),
                Err(message) => {
                    warn!(key = %record.key, error = %message, "batch record skipped");
                    report.errors.push(message);
                }
            }
        }

        info!(
            applied = report.applied_count(),
            errors = report.error_count(),
            "withdrawal reconciliation batch finished"
        );
        report
    }

    async fn complete_one(&self, record: &BatchRecord) -> Result<(), String> {
        if record.outcome != OUTCOME_COMPLETED {
            return Err(format!(
                "request {}: unsupported outcome \"{}\"",
                record.key, record.outcome
            ));
        }

        let request_id: Uuid = record
            .key
            .parse()
            .map_err(|_| format!("request {}: not a valid request id", record.key))?;

        let mut request = self
            .requests
            .get(request_id)
            .await
            .map_err(|e| format!("request {}: {e}", record.key))?
            .ok_or_else(|| format!("request {}: no matching withdrawal", record.key))?;

        if request.kind != RequestKind::Withdrawal {
            return Err(format!("request {}: not a withdrawal request", record.key));
        }
        if request.status != RequestStatus::Approved {
            return Err(format!(
                "request {}: withdrawal is {}, expected {}",
                record.key,
                request.status,
                RequestStatus::Approved
            ));
        }

        request.status = RequestStatus::Completed;
        request.resolved_at = Some(Utc::now());
        request.resolved_by = Some("reconciliation".to_string());

        self.requests
            .update(&request)
            .await
            .map_err(|e| format!("request {}: {e}", record.key))?;
        Ok(())
    }

    /// Writes the review export: one CSV row per submission awaiting
    /// reconciliation, for the back office to check against the carrier.
    pub async fn export_for_review<W: io::Write>(
        &self,
        writer: W,
    ) -> Result<usize, ReconcileError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer
            .write_record([
                "submission_id",
                "tracking_code",
                "task",
                "purchase_price",
                "earnings",
            ])
            .map_err(|e| ReconcileError::MalformedBatch(e.to_string()))?;

        let mut written = 0;
        let mut page_number = 1;
        loop {
            let pagination = crate::store::Pagination::new(page_number, crate::store::MAX_PAGE_SIZE);
            let page = self
                .submissions
                .list_by_status(SubmissionStatus::ExportedForReview, &pagination)
                .await
                .map_err(WorkflowError::from)?;

            for submission in &page.items {
                csv_writer
                    .write_record([
                        submission.id.to_string(),
                        submission.tracking_code.clone().unwrap_or_default(),
                        submission.task_title.clone(),
                        submission.purchase_price.to_string(),
                        submission.earnings().to_string(),
                    ])
                    .map_err(|e| ReconcileError::MalformedBatch(e.to_string()))?;
            }
            written += page.items.len();

            if page_number >= page.total_pages {
                break;
            }
            page_number += 1;
        }

        csv_writer
            .flush()
            .map_err(|e| ReconcileError::MalformedBatch(e.to_string()))?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{hash_password, Identity, Role, User};
    use crate::ledger::RequestLedger;
    use crate::lifecycle::SubmissionService;
    use crate::request::Proposed;
    use crate::store::{MemoryStore, RequestStore, SubmissionStore, TaskStore, UserStore};
    use crate::submission::Task;

    fn admin() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            username: "admin".to_string(),
            role: Role::Admin,
        }
    }

    fn batch_of(keys: &[&str]) -> ParsedBatch {
        ParsedBatch {
            records: keys
                .iter()
                .map(|k| BatchRecord {
                    key: k.to_string(),
                    outcome: OUTCOME_COMPLETED.to_string(),
                })
                .collect(),
            row_errors: Vec::new(),
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        service: SubmissionService,
        processor: ReconciliationProcessor,
        owner: Uuid,
        task: Task,
    }

    async fn setup() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let user = User::new("a@x.com", "alice", hash_password("pw").unwrap(), Role::Member);
        let owner = user.id;
        UserStore::insert(store.as_ref(), &user).await.unwrap();

        let task = Task::new("Buy item", "desc", 150_000);
        crate::store::TaskStore::insert(store.as_ref(), &task)
            .await
            .unwrap();

        Fixture {
            service: SubmissionService::new(store.clone(), store.clone()),
            processor: ReconciliationProcessor::new(store.clone(), store.clone(), store.clone()),
            store,
            owner,
            task,
        }
    }

    /// Drives a submission to `exported_for_review` with the given code.
    async fn exported_submission(fx: &Fixture, code: &str) -> Uuid {
        let record = fx
            .service
            .submit(fx.owner, fx.task.id, 100_000, Some(code.to_string()))
            .await
            .unwrap();
        fx.service.approve(record.id, &admin()).await.unwrap();
        fx.service.confirm_delivery(fx.owner, record.id).await.unwrap();
        record.id
    }

    #[test]
    fn test_parse_batch_key_only_file() {
        let input = "tracking_code\nVN001\nVN002\n\n";
        let batch = parse_batch(input.as_bytes()).unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].key, "VN001");
        assert_eq!(batch.records[0].outcome, OUTCOME_COMPLETED);
        assert!(batch.row_errors.is_empty());
    }

    #[test]
    fn test_parse_batch_with_outcome_column() {
        let input = "tracking_code,outcome\nVN001,completed\nVN002,Refused\nVN003,\n";
        let batch = parse_batch(input.as_bytes()).unwrap();
        assert_eq!(batch.records.len(), 3);
        assert_eq!(batch.records[1].outcome, "refused");
        assert_eq!(batch.records[2].outcome, OUTCOME_COMPLETED);
    }

    #[test]
    fn test_parse_batch_reports_blank_keys_per_row() {
        let input = "tracking_code,outcome\n,completed\nVN002,completed\n";
        let batch = parse_batch(input.as_bytes()).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.row_errors.len(), 1);
        assert!(batch.row_errors[0].contains("line 2"));
    }

    #[test]
    fn test_parse_batch_rejects_unreadable_input() {
        // Invalid UTF-8 in the header is a structural failure.
        let input: &[u8] = b"\xff\xfe\x00broken";
        assert!(matches!(
            parse_batch(input),
            Err(ReconcileError::MalformedBatch(_))
        ));
    }

    #[tokio::test]
    async fn test_settle_credits_earnings_and_completes() {
        let fx = setup().await;
        let id = exported_submission(&fx, "VN001").await;

        let report = fx.processor.settle_submissions(batch_of(&["VN001"])).await;
        assert_eq!(report.applied_count(), 1);
        assert_eq!(report.error_count(), 0);

        let submission = SubmissionStore::get(fx.store.as_ref(), id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(submission.status, SubmissionStatus::Completed);

        let owner = UserStore::get(fx.store.as_ref(), fx.owner)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owner.balance, 50_000);
    }

    #[tokio::test]
    async fn test_partial_failure_applies_valid_records() {
        let fx = setup().await;
        exported_submission(&fx, "VN001").await;
        exported_submission(&fx, "VN003").await;

        // Bad key in the middle must not stop the batch.
        let report = fx
            .processor
            .settle_submissions(batch_of(&["VN001", "MISSING", "VN003"]))
            .await;
        assert_eq!(report.applied, vec!["VN001", "VN003"]);
        assert_eq!(report.error_count(), 1);
        assert!(report.errors[0].contains("MISSING"));
    }

    #[tokio::test]
    async fn test_duplicate_key_in_batch_applies_once() {
        let fx = setup().await;
        exported_submission(&fx, "VN001").await;

        let report = fx
            .processor
            .settle_submissions(batch_of(&["VN001", "VN001"]))
            .await;
        assert_eq!(report.applied_count(), 1);
        assert_eq!(report.error_count(), 1);

        // The balance was credited exactly once.
        let owner = UserStore::get(fx.store.as_ref(), fx.owner)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owner.balance, 50_000);
    }

    #[tokio::test]
    async fn test_reupload_of_completed_key_is_an_error() {
        let fx = setup().await;
        exported_submission(&fx, "VN001").await;

        let first = fx.processor.settle_submissions(batch_of(&["VN001"])).await;
        assert_eq!(first.applied_count(), 1);

        let second = fx.processor.settle_submissions(batch_of(&["VN001"])).await;
        assert_eq!(second.applied_count(), 0);
        assert_eq!(second.error_count(), 1);
        assert!(second.errors[0].contains("completed"));
    }

    #[tokio::test]
    async fn test_pending_submission_not_eligible() {
        let fx = setup().await;
        fx.service
            .submit(fx.owner, fx.task.id, 100_000, Some("VN010".into()))
            .await
            .unwrap();

        let report = fx.processor.settle_submissions(batch_of(&["VN010"])).await;
        assert_eq!(report.applied_count(), 0);
        assert!(report.errors[0].contains("pending"));
    }

    #[tokio::test]
    async fn test_complete_withdrawals_by_request_id() {
        let fx = setup().await;

        let mut user = UserStore::get(fx.store.as_ref(), fx.owner)
            .await
            .unwrap()
            .unwrap();
        user.balance = 100_000;
        UserStore::update(fx.store.as_ref(), &user).await.unwrap();

        let ledger = RequestLedger::new(fx.store.clone(), fx.store.clone());
        let engine = crate::approval::ApprovalEngine::new(fx.store.clone(), fx.store.clone());
        let request = ledger
            .submit(fx.owner, Proposed::Withdrawal { amount: 60_000 })
            .await
            .unwrap();
        engine.approve(request.id, &admin()).await.unwrap();

        let report = fx
            .processor
            .complete_withdrawals(batch_of(&[
                &request.id.to_string(),
                "not-a-uuid",
                &Uuid::new_v4().to_string(),
            ]))
            .await;
        assert_eq!(report.applied_count(), 1);
        assert_eq!(report.error_count(), 2);

        let stored = RequestStore::get(fx.store.as_ref(), request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, RequestStatus::Completed);
    }

    #[tokio::test]
    async fn test_export_for_review_lists_awaiting_submissions() {
        let fx = setup().await;
        exported_submission(&fx, "VN001").await;
        exported_submission(&fx, "VN002").await;

        let mut buffer = Vec::new();
        let count = fx.processor.export_for_review(&mut buffer).await.unwrap();
        assert_eq!(count, 2);

        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("submission_id,tracking_code,task,purchase_price,earnings"));
        assert!(text.contains("VN001"));
        assert!(text.contains("VN002"));
        assert!(text.contains("50000"));
    }
}
