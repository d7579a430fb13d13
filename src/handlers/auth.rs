// Credential lifecycle endpoints: register, login (with 2FA challenge
// branch), email verification, refresh rotation, logout, password reset.

use axum::{
    extract::{ConnectInfo, Extension, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::{
    extract::cookie::{Cookie, CookieJar, SameSite},
    headers::UserAgent,
    TypedHeader,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use time::Duration as CookieDuration;
use validator::Validate;

use crate::{
    app::AppState,
    db::kvs_keys,
    middleware::auth::AuthenticatedUser,
    models::{
        password_reset::{
            ForgotPasswordRequest, ForgotPasswordResponse, ResetPasswordRequest,
            ResetPasswordResponse,
        },
        user::{NewUser, User, UserError, UserUpdate},
    },
    services::{audit, jwt::JwtError, rate_limit::RateLimitConfig},
    utils::{
        auth_errors::AppError, crypto, hash_password, trim_and_validate_field, verify_password,
    },
};

// =============================================================================
// REQUEST/RESPONSE TYPES
// =============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    /// Identifies the caller's current session so it's excluded from the
    /// blanket revocation. Falls back to the `refresh_token` cookie if
    /// omitted.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 320, message = "Email must be less than 320 characters"))]
    pub email: String,

    #[validate(length(
        min = 3,
        max = 64,
        message = "Username must be between 3 and 64 characters"
    ))]
    pub username: String,

    #[validate(custom(function = "validate_password"))]
    pub password: String,

    pub password_confirmation: String,
}

fn validate_password(password: &str) -> Result<(), validator::ValidationError> {
    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());
    let classes_satisfied =
        [has_uppercase, has_lowercase, has_digit, has_special].iter().filter(|c| **c).count();

    if password.len() < 10 {
        return Err(validator::ValidationError::new("password_too_short"));
    }
    if classes_satisfied < 3 {
        return Err(validator::ValidationError::new("password_complexity"));
    }
    Ok(())
}

fn create_delete_refresh_cookie(config: &crate::app_config::AppConfig) -> Cookie<'static> {
    Cookie::build(("refresh_token", ""))
        .path("/")
        .http_only(true)
        .secure(config.is_production())
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(-1))
        .build()
}

fn create_refresh_token_cookie(
    token: String,
    remember_me: bool,
    config: &crate::app_config::AppConfig,
) -> Cookie<'static> {
    let mut cookie_builder = Cookie::build(("refresh_token", token))
        .path("/")
        .http_only(true)
        .secure(config.is_production())
        .same_site(SameSite::Strict);

    if remember_me {
        cookie_builder = cookie_builder
            .max_age(CookieDuration::days(
                config.security.remember_me_duration_days as i64,
            ));
    }

    cookie_builder.build()
}

fn is_valid_jwt_format(token: &str) -> bool {
    token.split('.').count() == 3
}

fn extract_refresh_token(jar: &CookieJar, body: &axum::body::Bytes) -> Result<String, AppError> {
    if let Some(cookie) = jar.get("refresh_token") {
        let token = cookie.value();
        if !is_valid_jwt_format(token) {
            return Err(AppError::InvalidToken);
        }
        return Ok(token.to_string());
    }

    if body.is_empty() {
        return Err(AppError::InvalidToken);
    }

    match serde_json::from_slice::<RefreshRequest>(body) {
        Ok(req) => {
            let token = req.refresh_token.ok_or(AppError::InvalidToken)?;
            if !is_valid_jwt_format(&token) {
                return Err(AppError::InvalidToken);
            }
            Ok(token)
        },
        Err(_) => Err(AppError::Validation("invalid request body".to_string())),
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginOutcome {
    Success(LoginResponse),
    TwoFactorChallenge(TwoFactorChallengeResponse),
}

#[derive(Debug, Serialize)]
pub struct TwoFactorChallengeResponse {
    pub two_factor_required: bool,
    pub pending_token: String,
    pub expires_in_seconds: usize,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub token_type: String,
    pub user: LoginUserInfo,
}

#[derive(Debug, Serialize)]
pub struct LoginUserInfo {
    pub id: String,
    pub email: String,
    pub username: String,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub token_type: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub email: String,
    pub username: String,
    pub email_verification_required: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub user_id: String,
    pub email: String,
    pub username: String,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TwoFactorLoginVerifyRequest {
    pub pending_token: String,
    pub code: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct VerificationStatusResponse {
    pub email_verified: bool,
    pub resend_allowed: bool,
    pub resend_cooldown_seconds: u64,
}

// =============================================================================
// AUTHENTICATION HANDLERS
// =============================================================================

async fn issue_tokens(
    state: &AppState,
    user: &User,
    ip_address: &str,
    user_agent: Option<String>,
    remember_me: bool,
) -> Result<(String, String), AppError> {
    let access_token = state
        .jwt_service
        .generate_access_token(&user.id.to_string(), &user.email, vec![])
        .map_err(|e| {
            tracing::error!("failed to generate access token: {}", e);
            AppError::Internal(e.to_string())
        })?;

    let refresh_token = state
        .jwt_service
        .generate_refresh_token_with_device_and_remember(
            &user.id.to_string(),
            Some(ip_address.to_string()),
            user_agent,
            remember_me,
        )
        .await
        .map_err(|e| {
            tracing::error!("failed to generate refresh token: {}", e);
            AppError::Internal(e.to_string())
        })?;

    Ok((access_token, refresh_token))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    user_agent: Option<TypedHeader<UserAgent>>,
    jar: CookieJar,
    Json(login_req): Json<LoginRequest>,
) -> impl IntoResponse {
    let ip_address = addr.ip().to_string();
    let user_agent = user_agent.map(|TypedHeader(ua)| ua.to_string());
    let config = crate::app_config::config();

    let email = login_req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return AppError::InvalidCredentials.into_response();
    }

    if config.enable_rate_limiting {
        let ip_rate_key = format!("login:ip:{}", ip_address);
        let ip_rate_config = RateLimitConfig {
            max_requests: config.security.login_rate_limit_per_ip,
            window_seconds: 60,
            burst_limit: Some(config.security.login_rate_limit_per_ip),
            block_duration: 60,
            distributed: true,
        };

        match state
            .rate_limit_service
            .check_rate_limit_with_config(&ip_rate_key, &ip_rate_config)
            .await
        {
            Ok(status) if !status.allowed => {
                return AppError::RateLimited {
                    retry_after_seconds: status.retry_after.unwrap_or(60) as u64,
                }
                .into_response();
            },
            Err(e) => tracing::warn!("rate limit check failed for IP {}: {}", ip_address, e),
            _ => {},
        }
    }

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("failed to get database connection: {}", e);
            return AppError::ServiceUnavailable.into_response();
        },
    };

    let user = match User::find_by_email(&mut conn, &email).await {
        Ok(user) => user,
        Err(UserError::NotFound) => {
            let ip_fail_key = format!("login:failed:ip:{}", ip_address);
            let _ = state
                .redis_pool
                .incr(&ip_fail_key, config.security.failed_login_ip_expiry_seconds)
                .await;
            return AppError::InvalidCredentials.into_response();
        },
        Err(e) => {
            tracing::error!("database error during login: {}", e);
            return AppError::Internal(e.to_string()).into_response();
        },
    };

    let lockout_key = kvs_keys::attempts(&user.id.to_string(), "login");
    match state.redis_pool.get::<u64>(&lockout_key).await {
        Ok(Some(count)) if count >= config.security.login_lockout_threshold as u64 => {
            return AppError::RateLimited {
                retry_after_seconds: config.security.login_lockout_duration_seconds as u64,
            }
            .into_response();
        },
        _ => {},
    }

    if !user.is_active() {
        return AppError::AccountBanned.into_response();
    }

    if config.security.require_email_verification && !user.email_verified {
        return AppError::AccountNotVerified.into_response();
    }

    match verify_password(&login_req.password, &user.password_hash) {
        Ok(true) => {},
        Ok(false) => {
            let failures = state
                .redis_pool
                .incr(&lockout_key, config.security.login_lockout_duration_seconds as usize)
                .await
                .unwrap_or(1);

            let audit_event = audit::AuditEvent {
                user_id: Some(user.id),
                org_id: None,
                resource: "auth".to_string(),
                action: "login".to_string(),
                resource_id: None,
                granted: false,
                reason: "invalid_password".to_string(),
                matched_group_ids: vec![],
                cache_source: "n/a".to_string(),
                correlation_id: None,
                ip_address: Some(ip_address.clone()),
                details: serde_json::json!({ "failed_attempts": failures }),
            };
            if let Err(e) = audit::append(&mut conn, audit_event).await {
                tracing::error!("failed to write login-failure audit entry: {}", e);
            }

            if failures >= config.security.login_lockout_threshold as u64 {
                return AppError::RateLimited {
                    retry_after_seconds: config.security.login_lockout_duration_seconds as u64,
                }
                .into_response();
            }
            return AppError::InvalidCredentials.into_response();
        },
        Err(e) => {
            tracing::error!("password verification error: {}", e);
            return AppError::Internal(e.to_string()).into_response();
        },
    }

    let _ = state.redis_pool.del(&lockout_key).await;

    if user.two_factor_enabled {
        let pending = match state.two_factor_service.start_login_challenge(&user).await {
            Ok(pending) => pending,
            Err(e) => return e.into_response(),
        };

        let response = TwoFactorChallengeResponse {
            two_factor_required: true,
            pending_token: pending.pending_token,
            expires_in_seconds: pending.expires_in_seconds,
        };
        return (StatusCode::OK, Json(response)).into_response();
    }

    let (access_token, refresh_token) = match issue_tokens(
        &state,
        &user,
        &ip_address,
        user_agent.clone(),
        login_req.remember_me,
    )
    .await
    {
        Ok(tokens) => tokens,
        Err(e) => return e.into_response(),
    };

    let audit_event = audit::AuditEvent {
        user_id: Some(user.id),
        org_id: None,
        resource: "auth".to_string(),
        action: "login".to_string(),
        resource_id: None,
        granted: true,
        reason: "credentials_valid".to_string(),
        matched_group_ids: vec![],
        cache_source: "n/a".to_string(),
        correlation_id: None,
        ip_address: Some(ip_address.clone()),
        details: serde_json::json!({ "remember_me": login_req.remember_me }),
    };
    if let Err(e) = audit::append(&mut conn, audit_event).await {
        tracing::error!("failed to write login-success audit entry: {}", e);
    }

    let response = LoginResponse {
        access_token,
        refresh_token: refresh_token.clone(),
        expires_in: config.jwt.access_expiry,
        token_type: "Bearer".to_string(),
        user: LoginUserInfo {
            id: user.id.to_string(),
            email: user.email,
            username: user.username,
            email_verified: user.email_verified,
            two_factor_enabled: user.two_factor_enabled,
        },
    };

    let refresh_cookie =
        create_refresh_token_cookie(refresh_token, login_req.remember_me, config);
    let updated_jar = jar.add(refresh_cookie);

    (StatusCode::OK, updated_jar, Json(response)).into_response()
}

/// POST /auth/login/verify - completes a 2FA-challenged login
pub async fn verify_login_two_factor(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    user_agent: Option<TypedHeader<UserAgent>>,
    jar: CookieJar,
    Json(req): Json<TwoFactorLoginVerifyRequest>,
) -> impl IntoResponse {
    let ip_address = addr.ip().to_string();
    let user_agent = user_agent.map(|TypedHeader(ua)| ua.to_string());
    let config = crate::app_config::config();

    let user_id = match state
        .two_factor_service
        .verify_login_challenge(&req.pending_token, &req.code)
        .await
    {
        Ok(user_id) => user_id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("failed to get database connection: {}", e);
            return AppError::ServiceUnavailable.into_response();
        },
    };

    let user = match User::find_by_id(&mut conn, user_id).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!("failed to load user after 2fa verification: {}", e);
            return AppError::Internal(e.to_string()).into_response();
        },
    };

    let (access_token, refresh_token) =
        match issue_tokens(&state, &user, &ip_address, user_agent, req.remember_me).await {
            Ok(tokens) => tokens,
            Err(e) => return e.into_response(),
        };

    let audit_event = audit::AuditEvent {
        user_id: Some(user.id),
        org_id: None,
        resource: "auth".to_string(),
        action: "login_2fa".to_string(),
        resource_id: None,
        granted: true,
        reason: "two_factor_verified".to_string(),
        matched_group_ids: vec![],
        cache_source: "n/a".to_string(),
        correlation_id: None,
        ip_address: Some(ip_address.clone()),
        details: serde_json::json!({}),
    };
    if let Err(e) = audit::append(&mut conn, audit_event).await {
        tracing::error!("failed to write 2fa-login audit entry: {}", e);
    }

    let response = LoginResponse {
        access_token,
        refresh_token: refresh_token.clone(),
        expires_in: config.jwt.access_expiry,
        token_type: "Bearer".to_string(),
        user: LoginUserInfo {
            id: user.id.to_string(),
            email: user.email,
            username: user.username,
            email_verified: user.email_verified,
            two_factor_enabled: user.two_factor_enabled,
        },
    };

    let refresh_cookie = create_refresh_token_cookie(refresh_token, req.remember_me, config);
    let updated_jar = jar.add(refresh_cookie);

    (StatusCode::OK, updated_jar, Json(response)).into_response()
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    _user_agent: Option<TypedHeader<UserAgent>>,
    Json(register_req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if let Err(validation_errors) = register_req.validate() {
        return AppError::Validation(validation_errors.to_string()).into_response();
    }

    if register_req.password != register_req.password_confirmation {
        return AppError::Validation("passwords do not match".to_string()).into_response();
    }

    let config = crate::app_config::config();
    if config.enable_rate_limiting {
        let rate_limit_key = format!("register:{}", addr.ip());
        let rate_limit_config = RateLimitConfig::registration_endpoint();

        match state
            .rate_limit_service
            .check_rate_limit_with_config(&rate_limit_key, &rate_limit_config)
            .await
        {
            Ok(status) if !status.allowed => {
                return AppError::RateLimited {
                    retry_after_seconds: status.retry_after.unwrap_or(60) as u64,
                }
                .into_response();
            },
            Err(e) => tracing::warn!("rate limit check failed for registration: {}", e),
            _ => {},
        }
    }

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("failed to get database connection: {}", e);
            return AppError::ServiceUnavailable.into_response();
        },
    };

    let email = register_req.email.trim().to_lowercase();
    match User::find_by_email(&mut conn, &email).await {
        Ok(_) => return AppError::ConflictEmail.into_response(),
        Err(UserError::NotFound) => {},
        Err(e) => {
            tracing::error!("error checking email uniqueness: {}", e);
            return AppError::Internal(e.to_string()).into_response();
        },
    }

    let username = match trim_and_validate_field(&register_req.username, true) {
        Ok(name) => name,
        Err(e) => return AppError::Validation(e).into_response(),
    };
    match User::find_by_username(&mut conn, &username).await {
        Ok(_) => return AppError::Validation("username already taken".to_string()).into_response(),
        Err(UserError::NotFound) => {},
        Err(e) => {
            tracing::error!("error checking username uniqueness: {}", e);
            return AppError::Internal(e.to_string()).into_response();
        },
    }

    let password_hash = match hash_password(&register_req.password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("failed to hash password: {}", e);
            return AppError::Internal(e.to_string()).into_response();
        },
    };

    let require_verification = config.security.require_email_verification;
    let new_user = NewUser {
        email: email.clone(),
        username,
        password_hash,
        status: "active".to_string(),
        email_verified: !require_verification,
    };

    let created_user = match User::create(&mut conn, new_user).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!("failed to create user: {}", e);
            return AppError::Internal(e.to_string()).into_response();
        },
    };

    if require_verification {
        let code = crypto::random_numeric_code(6);
        if let Err(e) = state
            .verification_service
            .store_verification_code(&email, &created_user.id.to_string(), &code)
            .await
        {
            tracing::error!("failed to store verification code: {}", e);
        } else if let Err(e) = state
            .email_service
            .send_verification_code(&email, &created_user.username, &code)
            .await
        {
            tracing::error!("failed to send verification email to {}: {}", email, e);
        }
    }

    let response = RegisterResponse {
        user_id: created_user.id.to_string(),
        email: created_user.email.clone(),
        username: created_user.username.clone(),
        email_verification_required: require_verification,
        message: if require_verification {
            "Registration successful. Check your email for a verification code.".to_string()
        } else {
            "Registration successful. You can now log in.".to_string()
        },
    };

    tracing::info!("new user registered: {}", created_user.email);
    (StatusCode::CREATED, Json(response)).into_response()
}

/// POST /auth/verify-email
pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> impl IntoResponse {
    let email = req.email.trim().to_lowercase();

    let user_id = match state.verification_service.verify_code(&email, &req.code).await {
        Ok(user_id) => user_id,
        Err(e) => {
            return AppError::Validation(e.to_string()).into_response();
        },
    };

    let user_uuid = match uuid::Uuid::parse_str(&user_id) {
        Ok(id) => id,
        Err(_) => return AppError::Internal("invalid user id in verification record".to_string()).into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("failed to get database connection: {}", e);
            return AppError::ServiceUnavailable.into_response();
        },
    };

    let update = UserUpdate {
        email_verified: Some(true),
        email_verified_at: Some(Some(chrono::Utc::now())),
        ..Default::default()
    };

    match User::update(&mut conn, user_uuid, update).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "email verified successfully" })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to mark email verified: {}", e);
            AppError::Internal(e.to_string()).into_response()
        },
    }
}

/// POST /auth/resend-verification
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(req): Json<ResendVerificationRequest>,
) -> impl IntoResponse {
    let email = req.email.trim().to_lowercase();

    match state.verification_service.check_resend_allowed(&email).await {
        Ok(true) => {},
        Ok(false) => return AppError::RateLimited { retry_after_seconds: 3600 }.into_response(),
        Err(e) => return AppError::Internal(e.to_string()).into_response(),
    }

    let cooldown = match state.verification_service.get_resend_cooldown(&email).await {
        Ok(seconds) if seconds > 0 => {
            return AppError::RateLimited {
                retry_after_seconds: seconds,
            }
            .into_response();
        },
        Ok(_) => 0,
        Err(e) => return AppError::Internal(e.to_string()).into_response(),
    };
    let _ = cooldown;

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("failed to get database connection: {}", e);
            return AppError::ServiceUnavailable.into_response();
        },
    };

    let user = match User::find_by_email(&mut conn, &email).await {
        Ok(user) => user,
        Err(UserError::NotFound) => {
            return (
                StatusCode::OK,
                Json(serde_json::json!({ "message": "if that account exists, a new code has been sent" })),
            )
                .into_response();
        },
        Err(e) => return AppError::Internal(e.to_string()).into_response(),
    };

    if user.email_verified {
        return AppError::Validation("email is already verified".to_string()).into_response();
    }

    if let Err(e) = state.verification_service.increment_resend_count(&email).await {
        return AppError::Internal(e.to_string()).into_response();
    }

    let code = crypto::random_numeric_code(6);
    if let Err(e) = state
        .verification_service
        .store_verification_code(&email, &user.id.to_string(), &code)
        .await
    {
        return AppError::Internal(e.to_string()).into_response();
    }

    if let Err(e) = state
        .email_service
        .send_verification_code(&email, &user.username, &code)
        .await
    {
        tracing::error!("failed to send verification email to {}: {}", email, e);
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({ "message": "verification code sent" })),
    )
        .into_response()
}

/// GET /auth/verification-status?email=
pub async fn verification_status(
    State(state): State<AppState>,
    axum::extract::Query(params): axum::extract::Query<ResendVerificationRequest>,
) -> impl IntoResponse {
    let email = params.email.trim().to_lowercase();

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("failed to get database connection: {}", e);
            return AppError::ServiceUnavailable.into_response();
        },
    };

    let email_verified = match User::find_by_email(&mut conn, &email).await {
        Ok(user) => user.email_verified,
        Err(UserError::NotFound) => false,
        Err(e) => return AppError::Internal(e.to_string()).into_response(),
    };

    let resend_allowed = state
        .verification_service
        .check_resend_allowed(&email)
        .await
        .unwrap_or(false);
    let resend_cooldown_seconds = state
        .verification_service
        .get_resend_cooldown(&email)
        .await
        .unwrap_or(0);

    Json(VerificationStatusResponse {
        email_verified,
        resend_allowed,
        resend_cooldown_seconds,
    })
    .into_response()
}

/// POST /auth/refresh
pub async fn refresh_token(
    State(state): State<AppState>,
    user_agent: Option<TypedHeader<UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: CookieJar,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let user_agent = user_agent.map(|TypedHeader(ua)| ua.to_string());
    let ip_address = Some(addr.ip().to_string());

    let refresh_token = match extract_refresh_token(&jar, &body) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    let config = crate::app_config::config();
    if config.enable_rate_limiting {
        let rate_limit_key = format!("refresh:{}", addr.ip());
        let refresh_limit = config.get_refresh_rate_limit_config();

        match state
            .rate_limit_service
            .check_rate_limit_with_config(&rate_limit_key, &refresh_limit)
            .await
        {
            Ok(status) if !status.allowed => {
                return AppError::RateLimited {
                    retry_after_seconds: status.retry_after.unwrap_or(60) as u64,
                }
                .into_response();
            },
            Err(_) => tracing::warn!("rate limit check failed for refresh endpoint"),
            _ => {},
        }
    }

    match state
        .jwt_service
        .rotate_refresh_token(&refresh_token, ip_address, user_agent)
        .await
    {
        Ok((new_access_token, new_refresh_token)) => {
            let token_response = TokenResponse {
                access_token: new_access_token,
                refresh_token: new_refresh_token.clone(),
                expires_in: config.jwt.access_expiry,
                token_type: "Bearer".to_string(),
            };

            // Rotation always issues a session-scoped refresh token; the
            // client re-sets remember_me on its next explicit login.
            let refresh_cookie = create_refresh_token_cookie(new_refresh_token, false, config);
            let updated_jar = jar.add(refresh_cookie);

            (StatusCode::OK, updated_jar, Json(token_response)).into_response()
        },
        Err(JwtError::TokenExpired) => AppError::TokenExpired.into_response(),
        Err(JwtError::TokenRevoked) => AppError::InvalidToken.into_response(),
        Err(JwtError::InvalidToken) => AppError::InvalidToken.into_response(),
        Err(JwtError::TokenReuseDetected) => AppError::TokenReuseDetected.into_response(),
        Err(e) => {
            tracing::error!("refresh token rotation failed: {}", e);
            AppError::Internal(e.to_string()).into_response()
        },
    }
}

/// POST /auth/logout
pub async fn logout(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
    jar: CookieJar,
) -> impl IntoResponse {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let remaining_ttl = user.exp.saturating_sub(now);

    if let Err(e) = state.jwt_service.logout_token(&user.token_id, remaining_ttl).await {
        tracing::warn!("failed to blacklist access token on logout: {}", e);
    }

    let revoked_count = state
        .jwt_service
        .revoke_all_user_tokens(&user.user_id)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("failed to revoke refresh tokens on logout: {}", e);
            0
        });

    let config = crate::app_config::config();
    let delete_cookie = create_delete_refresh_cookie(config);
    let updated_jar = jar.add(delete_cookie);

    (
        StatusCode::OK,
        updated_jar,
        Json(serde_json::json!({
            "message": format!("logout successful, {} refresh tokens revoked", revoked_count)
        })),
    )
        .into_response()
}

/// POST /auth/change-password
///
/// Requires the current password. Revokes every other active session's
/// refresh tokens, leaving the caller's own session logged in.
pub async fn change_password(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let payload: ChangePasswordRequest = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return AppError::Validation("invalid request body".to_string()).into_response(),
    };

    if let Err(e) = validate_password(&payload.new_password) {
        return AppError::Validation(e.to_string()).into_response();
    }

    let user_id = match uuid::Uuid::parse_str(&user.user_id) {
        Ok(id) => id,
        Err(_) => return AppError::InvalidToken.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("failed to get database connection: {}", e);
            return AppError::ServiceUnavailable.into_response();
        },
    };

    let db_user = match User::find_by_id(&mut conn, user_id).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!("failed to load user for password change: {}", e);
            return AppError::Internal(e.to_string()).into_response();
        },
    };

    match verify_password(&payload.current_password, &db_user.password_hash) {
        Ok(true) => {},
        Ok(false) => return AppError::InvalidCredentials.into_response(),
        Err(e) => {
            tracing::error!("password verification error: {}", e);
            return AppError::Internal(e.to_string()).into_response();
        },
    }

    let new_hash = match hash_password(&payload.new_password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("failed to hash password: {}", e);
            return AppError::Internal(e.to_string()).into_response();
        },
    };

    let update = UserUpdate {
        password_hash: Some(new_hash),
        ..Default::default()
    };
    if let Err(e) = User::update(&mut conn, user_id, update).await {
        tracing::error!("failed to update password: {}", e);
        return AppError::Internal(e.to_string()).into_response();
    }

    let current_refresh_token = payload
        .refresh_token
        .or_else(|| jar.get("refresh_token").map(|c| c.value().to_string()));

    let revoked_count = match current_refresh_token {
        Some(token) => state
            .jwt_service
            .revoke_all_user_tokens_except_current(&user.user_id, &token)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("failed to revoke other sessions on password change: {}", e);
                0
            }),
        None => state
            .jwt_service
            .revoke_all_user_tokens(&user.user_id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("failed to revoke sessions on password change: {}", e);
                0
            }),
    };

    let ip = addr.ip().to_string();
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .unwrap_or("unknown");
    if let Err(e) = state
        .email_service
        .send_password_change_notification(&db_user.email, &db_user.username, &ip, user_agent)
        .await
    {
        tracing::warn!("failed to send password change notification: {}", e);
    }

    Json(serde_json::json!({
        "message": format!("password changed, {} other sessions revoked", revoked_count)
    }))
    .into_response()
}

/// GET /auth/me
pub async fn get_current_user(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("failed to get database connection: {}", e);
            return AppError::ServiceUnavailable.into_response();
        },
    };

    match User::find_by_email(&mut conn, &user.email).await {
        Ok(db_user) => Json(UserInfo {
            user_id: db_user.id.to_string(),
            email: db_user.email,
            username: db_user.username,
            email_verified: db_user.email_verified,
            two_factor_enabled: db_user.two_factor_enabled,
        })
        .into_response(),
        Err(e) => {
            tracing::error!("failed to fetch user from database: {}", e);
            AppError::Internal(e.to_string()).into_response()
        },
    }
}

/// POST /auth/validate
pub async fn validate_token(Extension(user): Extension<AuthenticatedUser>) -> impl IntoResponse {
    Json(serde_json::json!({
        "valid": true,
        "user_id": user.user_id,
    }))
}

/// POST /auth/forgot-password
pub async fn forgot_password(
    State(app_state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    user_agent: Option<TypedHeader<UserAgent>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> impl IntoResponse {
    if let Err(validation_errors) = payload.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ForgotPasswordResponse {
                success: false,
                message: format!("validation error: {}", validation_errors),
                data: None,
            }),
        )
            .into_response();
    }

    let email = match trim_and_validate_field(&payload.email, true) {
        Ok(email) => email.to_lowercase(),
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ForgotPasswordResponse {
                    success: false,
                    message: format!("validation error: {}", e),
                    data: None,
                }),
            )
                .into_response();
        },
    };
    let client_ip = addr.ip();
    let user_agent_str = user_agent.map(|ua| ua.as_str().to_string());

    let config = crate::app_config::config();
    if config.enable_rate_limiting {
        let rate_limit_key = format!("forgot_password:{}", client_ip);
        match app_state
            .rate_limit_service
            .check_rate_limit(&rate_limit_key, "forgot_password")
            .await
        {
            Ok(result) if !result.allowed => {
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ForgotPasswordResponse {
                        success: false,
                        message: "too many password reset attempts, try again later".to_string(),
                        data: None,
                    }),
                )
                    .into_response();
            },
            Err(e) => {
                tracing::error!("rate limiting service error: {}", e);
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ForgotPasswordResponse {
                        success: false,
                        message: "service temporarily unavailable".to_string(),
                        data: None,
                    }),
                )
                    .into_response();
            },
            _ => {},
        }
    }

    let password_reset_service = &app_state.password_reset_service;

    match password_reset_service.check_recent_attempts(&email, 1).await {
        Ok(count) if count >= 3 => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ForgotPasswordResponse {
                    success: false,
                    message: "too many password reset attempts for this account".to_string(),
                    data: None,
                }),
            )
                .into_response();
        },
        Ok(_) => {},
        Err(e) => {
            tracing::error!("failed to check recent attempts: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ForgotPasswordResponse {
                    success: false,
                    message: "service temporarily unavailable".to_string(),
                    data: None,
                }),
            )
                .into_response();
        },
    }

    match password_reset_service
        .create_reset_request(&email, Some(client_ip), user_agent_str)
        .await
    {
        Ok(token_info_opt) => {
            if let Some(token_info) = token_info_opt {
                let mut conn = app_state.diesel_pool.get().await.ok();
                let user_name = if let Some(conn) = conn.as_mut() {
                    User::find_by_email(conn, &email)
                        .await
                        .map(|u| u.username)
                        .unwrap_or_else(|_| "there".to_string())
                } else {
                    "there".to_string()
                };

                if let Err(e) = app_state
                    .email_service
                    .send_password_reset_email(&email, &user_name, &token_info.token)
                    .await
                {
                    tracing::error!("failed to send password reset email to {}: {}", email, e);
                } else {
                    tracing::info!("password reset email sent to {}", email);
                }
            }

            StatusCode::NO_CONTENT.into_response()
        },
        Err(e) => {
            tracing::error!("failed to create password reset request: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ForgotPasswordResponse {
                    success: false,
                    message: "service temporarily unavailable".to_string(),
                    data: None,
                }),
            )
                .into_response()
        },
    }
}

/// POST /auth/reset-password
pub async fn reset_password(
    State(app_state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<ResetPasswordRequest>,
) -> impl IntoResponse {
    if let Err(validation_errors) = payload.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ResetPasswordResponse {
                success: false,
                message: format!("validation error: {}", validation_errors),
                data: None,
            }),
        )
            .into_response();
    }

    if let Err(e) = payload.validate_passwords_match() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ResetPasswordResponse {
                success: false,
                message: format!("validation error: {}", e),
                data: None,
            }),
        )
            .into_response();
    }

    if let Err(e) = validate_password(&payload.new_password) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ResetPasswordResponse {
                success: false,
                message: format!("password validation failed: {}", e),
                data: None,
            }),
        )
            .into_response();
    }

    let client_ip = addr.ip();
    let config = crate::app_config::config();
    if config.enable_rate_limiting {
        let rate_limit_key = format!("reset_password:{}", client_ip);
        match app_state
            .rate_limit_service
            .check_rate_limit(&rate_limit_key, "reset_password")
            .await
        {
            Ok(result) if !result.allowed => {
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ResetPasswordResponse {
                        success: false,
                        message: "too many password reset attempts, try again later".to_string(),
                        data: None,
                    }),
                )
                    .into_response();
            },
            Err(e) => {
                tracing::error!("rate limiting service error: {}", e);
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ResetPasswordResponse {
                        success: false,
                        message: "service temporarily unavailable".to_string(),
                        data: None,
                    }),
                )
                    .into_response();
            },
            _ => {},
        }
    }

    let user_id = match app_state
        .password_reset_service
        .validate_and_consume_token(&payload.token)
        .await
    {
        Ok(user_id) => user_id,
        Err(AppError::InvalidToken) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ResetPasswordResponse {
                    success: false,
                    message: "invalid or expired reset token".to_string(),
                    data: None,
                }),
            )
                .into_response();
        },
        Err(e) => {
            tracing::error!("failed to validate reset token: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ResetPasswordResponse {
                    success: false,
                    message: "service temporarily unavailable".to_string(),
                    data: None,
                }),
            )
                .into_response();
        },
    };

    let password_hash = match hash_password(&payload.new_password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("failed to hash password: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ResetPasswordResponse {
                    success: false,
                    message: "service temporarily unavailable".to_string(),
                    data: None,
                }),
            )
                .into_response();
        },
    };

    let mut conn = match app_state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("failed to get database connection: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ResetPasswordResponse {
                    success: false,
                    message: "service temporarily unavailable".to_string(),
                    data: None,
                }),
            )
                .into_response();
        },
    };

    let update = UserUpdate {
        password_hash: Some(password_hash),
        ..Default::default()
    };

    match User::update(&mut conn, user_id, update).await {
        Ok(user) => {
            if let Err(e) = app_state
                .jwt_service
                .revoke_all_user_tokens(&user_id.to_string())
                .await
            {
                tracing::warn!("failed to revoke tokens for user {}: {}", user_id, e);
            }

            let ip = addr.ip().to_string();
            let user_agent = headers
                .get(axum::http::header::USER_AGENT)
                .and_then(|ua| ua.to_str().ok())
                .unwrap_or("unknown");

            if let Err(e) = app_state
                .email_service
                .send_password_change_notification(&user.email, &user.username, &ip, user_agent)
                .await
            {
                tracing::warn!("failed to send password change notification: {}", e);
            }

            (
                StatusCode::OK,
                Json(ResetPasswordResponse {
                    success: true,
                    message: "password has been reset, you can now log in".to_string(),
                    data: None,
                }),
            )
                .into_response()
        },
        Err(e) => {
            tracing::error!("failed to update user password: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ResetPasswordResponse {
                    success: false,
                    message: "service temporarily unavailable".to_string(),
                    data: None,
                }),
            )
                .into_response()
        },
    }
}
