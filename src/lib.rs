// Library exports for the authorization core.
// This file exposes modules and functions for library consumers.

pub mod app;
pub mod app_config;
pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod migrations;
pub mod models;
pub mod schema;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use app::AppState;
pub use app_config::{AppConfig, CONFIG};
pub use config::{GlobalRateLimitSettings, RateLimitingConfig};
pub use db::{DatabaseConfig, DieselPool, RedisConfig, RedisPool};
pub use middleware::auth_middleware;
pub use middleware::AuthenticatedUser;
pub use models::auth::{AccessTokenClaims, RefreshTokenClaims};
pub use models::refresh_token::{RefreshToken, RefreshTokenError};
pub use services::{
    EmailService, JwtConfig, JwtError, JwtService, PasswordResetService, RateLimitConfig,
    RateLimitError, RateLimitResult, RateLimitService, RbacService, TwoFactorService,
    VerificationService,
};

// Re-export handler route builders
pub use handlers::{
    auth_routes, authz_routes, organization_routes, protected_auth_routes, two_factor_routes,
};

// Diesel database pool type alias
use bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

pub type DbPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Decode a hex-encoded TOTP encryption key into raw bytes. Production
/// requires a 64-char (32-byte) key; non-production environments fall back
/// to an all-zero key so local development doesn't need one configured.
fn decode_totp_key(hex_key: Option<&str>) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    match hex_key {
        Some(hex) => {
            if hex.len() % 2 != 0 {
                return Err("TOTP_ENCRYPTION_KEY must have an even number of hex characters".into());
            }
            (0..hex.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.into()))
                .collect()
        },
        None => Ok(vec![0u8; 32]),
    }
}

// Library initialization function for external consumers.
// Allows downstream services to embed this crate's auth core directly.
pub async fn initialize_app_state() -> Result<AppState, Box<dyn std::error::Error>> {
    use std::sync::Arc;
    use tracing::info;

    // Load environment
    dotenv::dotenv().ok();

    // Initialize config
    let config = app_config::config();

    // Initialize database pool
    info!("Initializing database pool...");
    let db_config = db::DieselDatabaseConfig::default();
    let max_connections = db_config.max_connections;
    let diesel_pool = db::create_diesel_pool(db_config).await?;

    // Run migrations if enabled
    if migrations::should_run_migrations() {
        info!("Running embedded migrations...");
        let migration_config = migrations::MigrationConfig::default();
        migrations::run_all_migrations(&diesel_pool, migration_config)
            .await
            .map_err(|e| format!("Migration failed: {}", e))?;
    }

    // Initialize Redis pool
    info!("Initializing Redis pool...");
    let redis_config = RedisConfig::from_env();
    let redis_pool = RedisPool::new(redis_config).await?;

    // Initialize services
    let rate_limit_config = Arc::new(RateLimitingConfig::from_env());
    let rate_limit_service = Arc::new(RateLimitService::new(redis_pool.clone()));

    let jwt_service =
        Arc::new(JwtService::from_env_with_diesel(diesel_pool.clone(), redis_pool.clone())?);

    let password_reset_service = Arc::new(PasswordResetService::new(diesel_pool.clone(), redis_pool.clone()));
    let email_service = Arc::new(EmailService::new(config.email.clone())?);

    let rbac_service = Arc::new(RbacService::new(redis_pool.clone()));

    let totp_key = decode_totp_key(config.totp_encryption_key.as_deref())?;
    let two_factor_service = Arc::new(TwoFactorService::new(
        diesel_pool.clone(),
        redis_pool.clone(),
        email_service.clone(),
        totp_key,
        config.jwt.issuer.clone(),
    ));

    let verification_service = Arc::new(VerificationService::new(
        redis_pool.clone(),
        config.email.verification_code_ttl,
        config.email.verification_max_attempts,
        config.email.resend_limit,
        config.email.resend_window,
        config.email.min_resend_cooldown,
    ));

    // Create app state
    Ok(AppState {
        config: Arc::new(config.clone()),
        diesel_pool: diesel_pool.clone(),
        redis_pool: redis_pool.clone(),
        jwt_service,
        rate_limit_service,
        rate_limit_config,
        password_reset_service,
        email_service,
        rbac_service,
        two_factor_service,
        verification_service,
        max_connections,
    })
}

// Health check handler
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    use axum::http::StatusCode;
    use axum::Json;

    let mut overall_healthy = true;
    let timestamp = chrono::Utc::now().to_rfc3339();

    // Check PostgreSQL
    let postgres_health = match db::check_diesel_health(&state.diesel_pool).await {
        Ok(_) => serde_json::json!({
            "status": "healthy",
            "max_connections": state.max_connections,
            "error": null
        }),
        Err(e) => {
            overall_healthy = false;
            serde_json::json!({
                "status": "unhealthy",
                "error": format!("Database connection failed: {}", e)
            })
        },
    };

    // Check Redis
    let redis_health_result = state.redis_pool.health_check().await;
    if !redis_health_result.is_healthy {
        overall_healthy = false;
    }

    let response = serde_json::json!({
        "status": if overall_healthy { "healthy" } else { "degraded" },
        "service": "authority-core",
        "timestamp": timestamp,
        "components": {
            "postgresql": postgres_health,
            "redis": serde_json::json!({
                "status": if redis_health_result.is_healthy { "healthy" } else { "unhealthy" },
                "latency_ms": redis_health_result.latency_ms,
                "error": redis_health_result.error
            })
        }
    });

    if overall_healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}
