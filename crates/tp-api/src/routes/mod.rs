//! Route assembly.

use axum::{routing::get, Json, Router};
use serde_json::json;

use crate::state::AppState;

mod admin;
mod auth;
mod finances;
mod submissions;
mod tasks;

/// Builds the full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/auth", auth::routes())
        .nest("/api/tasks", tasks::routes())
        .nest("/api/finances", finances::routes())
        .nest("/api/submissions", submissions::routes())
        .nest("/api/admin", admin::routes())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}
