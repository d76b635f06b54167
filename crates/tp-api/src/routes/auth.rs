//! Authentication routes: register, login, token refresh, profile.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use tracing::{info, warn};
use validator::Validate;

use tp_core::{hash_password, verify_password, Role, User};

use crate::auth::RequireUser;
use crate::dto::{
    LoginRequest, ReferralCodeRequest, RefreshRequest, RegisterRequest, TokenResponse,
    UserResponse,
};
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/me", get(me))
        .route("/referral-code", patch(update_referral_code))
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    request.validate()?;

    let password_hash = hash_password(&request.password)?;
    let user = User::new(request.email, request.username, password_hash, Role::Member);
    let user = state.users.insert(&user).await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state
        .users
        .get_by_username(&request.username)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(&request.password, &user.password_hash) {
        warn!(username = %request.username, "failed login attempt");
        return Err(ApiError::InvalidCredentials);
    }
    if !user.enabled {
        return Err(ApiError::AccountDisabled);
    }

    let pair = state.tokens.issue(user.identity()).await;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(TokenResponse::new(pair, Some(user))))
}

async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let pair = state.tokens.refresh(&request.refresh_token).await?;
    Ok(Json(TokenResponse::new(pair, None)))
}

async fn me(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .users
        .get(identity.user_id)
        .await?
        .ok_or(ApiError::SessionExpired)?;
    Ok(Json(user.into()))
}

async fn update_referral_code(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    Json(request): Json<ReferralCodeRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    request.validate()?;

    let mut user = state
        .users
        .get(identity.user_id)
        .await?
        .ok_or(ApiError::SessionExpired)?;
    user.referral_code = Some(request.referral_code);
    user.updated_at = Utc::now();
    let user = state.users.update(&user).await?;
    Ok(Json(user.into()))
}
