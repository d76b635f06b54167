//! Back-office routes: review queues, approval decisions, reconciliation.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use tp_core::reconcile::parse_batch;
use tp_core::store::{PaginatedResult, Pagination};
use tp_core::{
    BatchReport, ChangeRequest, RequestKind, SubmissionRecord, SubmissionStatus,
};

use crate::auth::RequireAdmin;
use crate::dto::{
    parse_submission_status, PageQuery, RejectRequest, SubmissionListQuery, UserResponse,
};
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        // Bank-info change requests
        .route("/payment-requests", get(list_payment_requests))
        .route("/payment-requests/:id/approve", post(approve_request))
        .route("/payment-requests/:id/reject", post(reject_request))
        // Withdrawals
        .route("/withdrawals", get(list_withdrawals))
        .route("/withdrawals/:id/approve", post(approve_request))
        .route("/withdrawals/:id/reject", post(reject_request))
        .route("/withdrawals/:id/complete", post(complete_withdrawal))
        .route("/withdrawals/batch-complete", post(batch_complete_withdrawals))
        // Submissions
        .route("/submissions", get(list_submissions))
        .route("/submissions/:id/approve", post(approve_submission))
        .route("/submissions/:id/reject", post(reject_submission))
        .route("/submissions/reconcile", post(reconcile_submissions))
        .route("/submissions/review-export", get(review_export))
}

// ============================================================================
// Change request queues and decisions
// ============================================================================

async fn list_payment_requests(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedResult<ChangeRequest>>, ApiError> {
    let pagination = Pagination::from_query(query.page, query.per_page);
    let page = state
        .ledger
        .list_pending(Some(RequestKind::BankInfo), &pagination)
        .await?;
    Ok(Json(page))
}

async fn list_withdrawals(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedResult<ChangeRequest>>, ApiError> {
    let pagination = Pagination::from_query(query.page, query.per_page);
    let page = state
        .ledger
        .list_pending(Some(RequestKind::Withdrawal), &pagination)
        .await?;
    Ok(Json(page))
}

/// Approves a pending change request of either kind and returns the updated
/// subject.
async fn approve_request(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let subject = state.approvals.approve(id, &admin).await?;
    Ok(Json(subject.into()))
}

async fn reject_request(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<ChangeRequest>, ApiError> {
    let rejected = state.approvals.reject(id, &admin, &request.reason).await?;
    Ok(Json(rejected))
}

async fn complete_withdrawal(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<ChangeRequest>, ApiError> {
    let completed = state.approvals.complete_withdrawal(id, &admin).await?;
    Ok(Json(completed))
}

/// Bulk transfer confirmation: a CSV body of request ids.
async fn batch_complete_withdrawals(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    body: String,
) -> Result<Json<BatchReport>, ApiError> {
    let batch = parse_batch(body.as_bytes())?;
    let report = state.reconciler.complete_withdrawals(batch).await;
    Ok(Json(report))
}

// ============================================================================
// Submission review and reconciliation
// ============================================================================

async fn list_submissions(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<SubmissionListQuery>,
) -> Result<Json<PaginatedResult<SubmissionRecord>>, ApiError> {
    let status = match query.status.as_deref() {
        None => SubmissionStatus::Pending,
        Some(value) => parse_submission_status(value)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown status: {value}")))?,
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let page = state.submissions.list_by_status(status, &pagination).await?;
    Ok(Json(page))
}

async fn approve_submission(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmissionRecord>, ApiError> {
    let approved = state.submissions.approve(id, &admin).await?;
    Ok(Json(approved))
}

async fn reject_submission(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<SubmissionRecord>, ApiError> {
    let rejected = state
        .submissions
        .reject(id, &admin, &request.reason)
        .await?;
    Ok(Json(rejected))
}

/// Settles delivered submissions from an uploaded CSV of tracking codes.
async fn reconcile_submissions(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    body: String,
) -> Result<Json<BatchReport>, ApiError> {
    let batch = parse_batch(body.as_bytes())?;
    let report = state.reconciler.settle_submissions(batch).await;
    Ok(Json(report))
}

/// CSV download of submissions awaiting reconciliation.
async fn review_export(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<impl IntoResponse, ApiError> {
    let mut buffer = Vec::new();
    state.reconciler.export_for_review(&mut buffer).await?;
    let csv = String::from_utf8(buffer)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], csv))
}
