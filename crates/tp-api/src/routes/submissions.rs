//! Member-facing submission routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use uuid::Uuid;

use tp_core::SubmissionRecord;

use crate::auth::RequireUser;
use crate::dto::{CreateSubmissionRequest, TrackingCodeRequest};
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_submission))
        .route("/my-history", get(my_history))
        .route("/:id/tracking", patch(update_tracking))
        .route("/:id/confirm-delivery", post(confirm_delivery))
}

async fn create_submission(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    Json(request): Json<CreateSubmissionRequest>,
) -> Result<(StatusCode, Json<SubmissionRecord>), ApiError> {
    let created = state
        .submissions
        .submit(
            identity.user_id,
            request.task_id,
            request.purchase_price,
            request.tracking_code,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn my_history(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
) -> Result<Json<Vec<SubmissionRecord>>, ApiError> {
    Ok(Json(state.submissions.history_for(identity.user_id).await?))
}

async fn update_tracking(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    Path(id): Path<Uuid>,
    Json(request): Json<TrackingCodeRequest>,
) -> Result<Json<SubmissionRecord>, ApiError> {
    let updated = state
        .submissions
        .update_tracking(identity.user_id, id, &request.tracking_code)
        .await?;
    Ok(Json(updated))
}

async fn confirm_delivery(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmissionRecord>, ApiError> {
    let confirmed = state
        .submissions
        .confirm_delivery(identity.user_id, id)
        .await?;
    Ok(Json(confirmed))
}
