// Uniform error taxonomy for the auth/authorization surface. Every service
// returns one of these kinds; the HTTP layer is the only place that knows
// about status codes or the wire envelope shape.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Stable, language-neutral error kinds. The string form (via `kind()`) is
/// part of the wire contract - do not rename variants casually.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is banned")]
    AccountBanned,

    #[error("account email is not verified")]
    AccountNotVerified,

    #[error("invalid or malformed token")]
    InvalidToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("refresh token reuse detected - token family revoked")]
    TokenReuseDetected,

    #[error("two-factor verification required")]
    TwoFactorRequired,

    #[error("two-factor code invalid")]
    TwoFactorInvalid,

    #[error("two-factor verification locked, too many failed attempts")]
    TwoFactorLocked,

    #[error("email already in use")]
    ConflictEmail,

    #[error("slug already in use")]
    ConflictSlug,

    #[error("group name already in use")]
    ConflictGroupName,

    #[error("permission already granted")]
    PermissionAlreadyGranted,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not a member of this organization")]
    NotAMember,

    #[error("insufficient role for this operation")]
    InsufficientRole,

    #[error("insufficient permission for this operation")]
    InsufficientPermission,

    #[error("rate limit exceeded")]
    RateLimited { retry_after_seconds: u64 },

    #[error("service temporarily unavailable")]
    ServiceUnavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_failed",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::AccountBanned => "account_banned",
            AppError::AccountNotVerified => "account_not_verified",
            AppError::InvalidToken => "invalid_token",
            AppError::TokenExpired => "token_expired",
            AppError::TokenReuseDetected => "token_reuse_detected",
            AppError::TwoFactorRequired => "two_factor_required",
            AppError::TwoFactorInvalid => "two_factor_invalid",
            AppError::TwoFactorLocked => "two_factor_locked",
            AppError::ConflictEmail => "conflict_email",
            AppError::ConflictSlug => "conflict_slug",
            AppError::ConflictGroupName => "conflict_group_name",
            AppError::PermissionAlreadyGranted => "permission_already_granted",
            AppError::NotFound(_) => "not_found",
            AppError::NotAMember => "not_a_member",
            AppError::InsufficientRole => "insufficient_role",
            AppError::InsufficientPermission => "insufficient_permission",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::ServiceUnavailable => "service_unavailable",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::AccountBanned => StatusCode::FORBIDDEN,
            AppError::AccountNotVerified => StatusCode::FORBIDDEN,
            AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::TokenExpired => StatusCode::UNAUTHORIZED,
            AppError::TokenReuseDetected => StatusCode::UNAUTHORIZED,
            AppError::TwoFactorRequired => StatusCode::UNAUTHORIZED,
            AppError::TwoFactorInvalid => StatusCode::UNAUTHORIZED,
            AppError::TwoFactorLocked => StatusCode::LOCKED,
            AppError::ConflictEmail => StatusCode::CONFLICT,
            AppError::ConflictSlug => StatusCode::CONFLICT,
            AppError::ConflictGroupName => StatusCode::CONFLICT,
            AppError::PermissionAlreadyGranted => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotAMember => StatusCode::FORBIDDEN,
            AppError::InsufficientRole => StatusCode::FORBIDDEN,
            AppError::InsufficientPermission => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message surfaced to the client. For credential/authz endpoints
    /// this is deliberately generic to avoid enumeration; the precise cause
    /// still reaches `tracing` and the audit log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidCredentials => "invalid email or password".to_string(),
            AppError::NotAMember | AppError::InsufficientPermission => {
                "access denied".to_string()
            },
            AppError::TwoFactorLocked => "invalid code".to_string(),
            other => other.to_string(),
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::RateLimited {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    pub fn to_envelope(&self, trace_id: &str) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorBody {
                kind: self.kind(),
                message: self.public_message(),
                trace_id: trace_id.to_string(),
                details: None,
            },
        }
    }

    pub fn into_response_with_trace(self, trace_id: &str) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(self.to_envelope(trace_id))).into_response();
        if let Some(retry_after) = self.retry_after() {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Picks up the id `trace_middleware` propagated/minted for this
        // request; only falls back to a fresh one outside that scope (e.g.
        // unit tests that build an `AppError` directly).
        let trace_id = crate::middleware::trace::CURRENT_TRACE_ID
            .try_with(|id| id.clone())
            .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());
        self.into_response_with_trace(&trace_id)
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => AppError::NotFound("resource"),
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => AppError::ConflictEmail,
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::ServiceUnavailable.log_and_keep(&e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        AppError::InvalidToken
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl AppError {
    /// Small helper so `From` impls above can log the underlying cause
    /// without losing the generic-to-the-client error kind.
    fn log_and_keep(self, cause: &str) -> Self {
        tracing::warn!(cause, kind = self.kind(), "downstream error mapped to AppError");
        self
    }
}

/// Backwards-compatible alias: older call sites (kept from the teacher's
/// password-reset service) spell this `AuthError`.
pub type AuthError = AppError;
