//! Bearer-token extractors.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use tp_core::Identity;

use crate::error::ApiError;
use crate::state::AppState;

/// Extracts the authenticated user from the `Authorization: Bearer` header.
pub struct RequireUser(pub Identity);

/// Like [`RequireUser`], but additionally requires the admin role.
pub struct RequireAdmin(pub Identity);

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::SessionExpired)
}

async fn authenticate(parts: &Parts, state: &AppState) -> Result<Identity, ApiError> {
    let token = bearer_token(parts)?;
    state
        .tokens
        .validate_access(token)
        .await
        .ok_or(ApiError::SessionExpired)
}

#[async_trait]
impl FromRequestParts<AppState> for RequireUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(RequireUser(authenticate(parts, state).await?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let identity = authenticate(parts, state).await?;
        if !identity.role.is_admin() {
            return Err(ApiError::Forbidden(
                "administrator role required".to_string(),
            ));
        }
        Ok(RequireAdmin(identity))
    }
}
