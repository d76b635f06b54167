//! Task catalogue routes.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use tp_core::Task;

use crate::auth::RequireUser;
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks))
        .route("/:id", get(get_task))
}

async fn list_tasks(
    State(state): State<AppState>,
    RequireUser(_identity): RequireUser,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.tasks.list_active().await?))
}

async fn get_task(
    State(state): State<AppState>,
    RequireUser(_identity): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .tasks
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("task {id} not found")))?;
    Ok(Json(task))
}
