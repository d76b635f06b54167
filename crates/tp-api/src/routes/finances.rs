//! Member-facing finance routes: bank-info change requests and withdrawals.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use tp_core::{ChangeRequest, Proposed, RequestKind};

use crate::auth::RequireUser;
use crate::dto::{BankInfoRequest, WithdrawalRequest};
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/payment-info-requests",
            get(list_bank_requests).post(submit_bank_request),
        )
        .route("/withdrawals", post(submit_withdrawal))
        .route("/withdrawals", get(list_withdrawals))
}

async fn submit_bank_request(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    Json(request): Json<BankInfoRequest>,
) -> Result<(StatusCode, Json<ChangeRequest>), ApiError> {
    request.validate()?;

    let created = state
        .ledger
        .submit(
            identity.user_id,
            Proposed::BankInfo {
                account_holder: request.account_holder,
                account_number: request.account_number,
                bank_name: request.bank_name,
                bank_branch: request.bank_branch,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// The member's bank-info request history, newest first.
async fn list_bank_requests(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
) -> Result<Json<Vec<ChangeRequest>>, ApiError> {
    let history = state.ledger.history_for(identity.user_id).await?;
    Ok(Json(
        history
            .into_iter()
            .filter(|r| r.kind == RequestKind::BankInfo)
            .collect(),
    ))
}

async fn submit_withdrawal(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    Json(request): Json<WithdrawalRequest>,
) -> Result<(StatusCode, Json<ChangeRequest>), ApiError> {
    let created = state
        .ledger
        .submit(
            identity.user_id,
            Proposed::Withdrawal {
                amount: request.amount,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_withdrawals(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
) -> Result<Json<Vec<ChangeRequest>>, ApiError> {
    let history = state.ledger.history_for(identity.user_id).await?;
    Ok(Json(
        history
            .into_iter()
            .filter(|r| r.kind == RequestKind::Withdrawal)
            .collect(),
    ))
}
