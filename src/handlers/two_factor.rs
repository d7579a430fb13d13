// Two-factor enrollment endpoints. The login-time challenge itself is
// handled by handlers::auth::verify_login_two_factor - these endpoints only
// cover turning 2FA on and off for an already-authenticated session.

use axum::{extract::{Extension, State}, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{app::AppState, middleware::auth::AuthenticatedUser, utils::auth_errors::AppError};

#[derive(Debug, Serialize)]
pub struct TwoFactorEnrollResponse {
    pub otpauth_uri: String,
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorConfirmRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorDisableRequest {
    pub code: String,
}

fn parse_user_id(user: &AuthenticatedUser) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.user_id).map_err(|_| AppError::InvalidToken)
}

/// POST /2fa/enroll - begins TOTP enrollment, returns the otpauth URI and
/// one-time-displayed backup codes. 2FA is not active until /2fa/confirm.
pub async fn enroll(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    let user_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.two_factor_service.enable(user_id).await {
        Ok(setup) => (
            StatusCode::OK,
            Json(TwoFactorEnrollResponse {
                otpauth_uri: setup.otpauth_uri,
                backup_codes: setup.backup_codes,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /2fa/confirm - verifies one TOTP code and flips 2FA on.
pub async fn confirm(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<TwoFactorConfirmRequest>,
) -> impl IntoResponse {
    let user_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.two_factor_service.confirm_setup(user_id, &req.code).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "two-factor authentication enabled" })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /2fa/disable - requires a valid current TOTP or backup code.
pub async fn disable(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<TwoFactorDisableRequest>,
) -> impl IntoResponse {
    let user_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.two_factor_service.disable(user_id, &req.code).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "two-factor authentication disabled" })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
