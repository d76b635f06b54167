//! Request/response DTOs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use tp_core::{BankAccount, Role, SubmissionStatus, TokenPair, User};

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub balance: i64,
    pub bank_account: Option<BankAccount>,
    pub referral_code: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            role: user.role,
            balance: user.balance,
            bank_account: user.bank_account,
            referral_code: user.referral_code,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
}

impl TokenResponse {
    pub fn new(pair: TokenPair, user: Option<User>) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: user.map(UserResponse::from),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReferralCodeRequest {
    #[validate(length(min = 1, max = 32))]
    pub referral_code: String,
}

// ============================================================================
// Change requests
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct BankInfoRequest {
    #[validate(length(min = 1))]
    pub account_holder: String,
    #[validate(length(min = 1))]
    pub account_number: String,
    #[validate(length(min = 1))]
    pub bank_name: String,
    #[validate(length(min = 1))]
    pub bank_branch: String,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

// ============================================================================
// Submissions
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSubmissionRequest {
    pub task_id: Uuid,
    pub purchase_price: i64,
    pub tracking_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackingCodeRequest {
    pub tracking_code: String,
}

// ============================================================================
// Listing
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionListQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Parses a submission status query value.
pub fn parse_submission_status(value: &str) -> Option<SubmissionStatus> {
    match value {
        "pending" => Some(SubmissionStatus::Pending),
        "admin_approved" => Some(SubmissionStatus::AdminApproved),
        "exported_for_review" => Some(SubmissionStatus::ExportedForReview),
        "completed" => Some(SubmissionStatus::Completed),
        "rejected" => Some(SubmissionStatus::Rejected),
        _ => None,
    }
}
