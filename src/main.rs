// Module declarations
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

// Re-export CONFIG for use in other modules
pub use app_config::CONFIG;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    app::AppState,
    config::RateLimitingConfig,
    db::{
        check_diesel_health, create_diesel_pool, mask_connection_string, DieselDatabaseConfig,
        RedisConfig, RedisPool,
    },
    handlers::{
        authz_routes, auth_routes, docs as docs_handlers, organization_routes,
        protected_auth_routes, two_factor_routes, user_routes,
    },
    middleware::auth_middleware,
    services::{EmailService, JwtService, PasswordResetService, RateLimitService, RbacService,
        TwoFactorService, VerificationService},
};

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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle version flag for container health checks - must be FIRST
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "--version" {
        println!("authority-core v{}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authority_core=debug,axum=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize centralized config (loads all env vars ONCE)
    let config = crate::app_config::config();
    let bind_address = config.bind_address.clone();
    info!("=== STARTING AUTHORITY CORE ===");
    info!("Starting authority-core API on {}", bind_address);

    // Initialize Diesel database pool
    info!("Initializing database pool...");
    let db_config = DieselDatabaseConfig::default();
    info!("Database URL: {}", mask_connection_string(&db_config.url));

    let max_connections = db_config.max_connections;
    let diesel_pool = match create_diesel_pool(db_config).await {
        Ok(pool) => {
            info!("database connection pool initialized");
            pool
        },
        Err(e) => {
            error!("failed to initialize database pool: {}", e);
            return Err(format!("Database initialization failed: {}", e).into());
        },
    };

    // Run embedded migrations (production/test environments)
    if crate::migrations::should_run_migrations() {
        info!("running embedded migrations...");
        let migration_config = crate::migrations::MigrationConfig::default();

        match crate::migrations::run_all_migrations(&diesel_pool, migration_config).await {
            Ok(()) => info!("all migrations completed successfully"),
            Err(e) => {
                error!("migration failed: {}", e);
                return Err(format!("Migration failed: {}", e).into());
            },
        }
    } else {
        info!("embedded migrations disabled - using external migration scripts");
    }

    // Initialize Redis pool
    info!("Initializing Redis pool...");
    let redis_config = RedisConfig::from_env();
    let redis_pool = match RedisPool::new(redis_config).await {
        Ok(pool) => {
            info!("redis connection pool initialized");
            pool
        },
        Err(e) => {
            error!("failed to initialize Redis pool: {}", e);
            return Err(format!("Redis initialization failed: {}", e).into());
        },
    };

    // Initialize rate limiting service and configuration
    info!("Initializing rate limiting service...");
    let rate_limit_config = Arc::new(RateLimitingConfig::from_env());

    if let Err(e) = rate_limit_config.validate() {
        error!("rate limiting configuration validation failed: {}", e);
        return Err(format!("Rate limiting configuration invalid: {}", e).into());
    }

    let rate_limit_service = Arc::new(RateLimitService::new(redis_pool.clone()));
    info!("rate limiting service initialized");

    // Initialize JWT service with Diesel pool
    info!("Initializing JWT service...");
    let jwt_service =
        match JwtService::from_env_with_diesel(diesel_pool.clone(), redis_pool.clone()) {
            Ok(service) => {
                info!("JWT service initialized");
                Arc::new(service)
            },
            Err(e) => {
                error!("failed to initialize JWT service: {}", e);
                return Err(format!("JWT service initialization failed: {}", e).into());
            },
        };

    // Initialize password reset service
    let password_reset_service = Arc::new(PasswordResetService::new(diesel_pool.clone(), redis_pool.clone()));
    info!("password reset service initialized");

    // Initialize email service
    info!("Initializing email service...");
    let email_service = match EmailService::new(config.email.clone()) {
        Ok(service) => {
            info!("email service initialized");
            Arc::new(service)
        },
        Err(e) => {
            error!("failed to initialize email service: {}", e);
            return Err(format!("Email service initialization failed: {}", e).into());
        },
    };

    // Initialize the RBAC policy decision point
    let rbac_service = Arc::new(RbacService::new(redis_pool.clone()));
    info!("RBAC service initialized");

    // Initialize two-factor authentication service
    let totp_key = decode_totp_key(config.totp_encryption_key.as_deref())?;
    let two_factor_service = Arc::new(TwoFactorService::new(
        diesel_pool.clone(),
        redis_pool.clone(),
        email_service.clone(),
        totp_key,
        config.jwt.issuer.clone(),
    ));
    info!("two-factor service initialized");

    // Initialize email verification service
    let verification_service = Arc::new(VerificationService::new(
        redis_pool.clone(),
        config.email.verification_code_ttl,
        config.email.verification_max_attempts,
        config.email.resend_limit,
        config.email.resend_window,
        config.email.min_resend_cooldown,
    ));
    info!("verification service initialized");

    // Create shared application state
    let app_state = AppState {
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
    };

    // Configure CORS - Environment-aware wildcard handling
    info!(
        "CORS: configuring origins for {} environment: {:?}",
        config.environment, config.cors_allowed_origins
    );

    let has_wildcard = config
        .cors_allowed_origins
        .iter()
        .any(|origin| origin == "*");

    if has_wildcard && !config.is_production() {
        info!("CORS: using dynamic origin reflection for staging/dev");
    } else if has_wildcard && config.is_production() {
        error!("CORS: wildcard '*' detected in production - will be ignored for security");
    } else {
        info!("CORS: using whitelist mode with origins: {:?}", config.cors_allowed_origins);
    }

    // Build the application router - conditionally include Swagger UI
    let mut app = Router::new()
        .route("/v1/health", get(comprehensive_health_check))
        .route("/v1/metrics/rate-limiting", get(rate_limit_metrics_handler));

    if config.enable_swagger_ui {
        info!("Swagger UI enabled at /v1/docs");
        app = app
            .route("/v1/docs", get(docs_handlers::redirect_to_docs))
            .route("/v1/docs/", get(docs_handlers::serve_swagger_ui))
            .route("/v1/docs/openapi.json", get(docs_handlers::serve_openapi_spec));
    } else {
        info!("Swagger UI disabled (set ENABLE_SWAGGER_UI=true to enable)");
    }

    let app = app
        .nest("/v1/auth", auth_routes())
        .nest("/v1/auth", protected_auth_routes(app_state.clone()))
        .nest("/v1/auth/users", user_routes(app_state.clone()))
        .nest("/v1/2fa", two_factor_routes(app_state.clone()))
        .nest("/v1/authz", authz_routes(app_state.clone()))
        .nest("/v1/organizations", organization_routes(app_state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(crate::middleware::trace_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(
                    crate::middleware::dynamic_cors_middleware,
                ))
                .layer(Extension(app_state.clone())),
        )
        .with_state(app_state.clone());

    // Start background janitors: expired refresh tokens, stale unverified
    // accounts, and a periodic audit-chain integrity sample.
    crate::services::background_tasks::initialize_background_tasks(app_state).await;
    info!("background janitors started");

    // Parse and bind to address
    let addr: SocketAddr = bind_address.parse()?;
    info!("starting HTTP server on {}...", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

// Health check handler
async fn comprehensive_health_check(State(state): State<AppState>) -> impl IntoResponse {
    use serde_json::json;

    let mut overall_healthy = true;
    let timestamp = chrono::Utc::now().to_rfc3339();

    let postgres_health = match check_diesel_health(&state.diesel_pool).await {
        Ok(_) => {
            json!({
                "status": "healthy",
                "max_connections": state.max_connections,
                "error": null
            })
        },
        Err(e) => {
            overall_healthy = false;
            json!({
                "status": "unhealthy",
                "error": format!("Database connection failed: {}", e)
            })
        },
    };

    let redis_health_result = state.redis_pool.health_check().await;
    if !redis_health_result.is_healthy {
        overall_healthy = false;
    }
    let redis_health = json!({
        "status": if redis_health_result.is_healthy { "healthy" } else { "unhealthy" },
        "latency_ms": redis_health_result.latency_ms,
        "active_connections": redis_health_result.active_connections,
        "total_connections": redis_health_result.total_connections,
        "error": redis_health_result.error
    });

    let response = json!({
        "status": if overall_healthy { "healthy" } else { "degraded" },
        "service": "authority-core",
        "timestamp": timestamp,
        "components": {
            "postgresql": postgres_health,
            "redis": redis_health
        }
    });

    if overall_healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

async fn rate_limit_metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    use serde_json::json;

    let stats = state
        .rate_limit_service
        .get_statistics()
        .await
        .unwrap_or_default();

    let response = json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "rate_limit_keys": stats,
    });

    Json(response)
}
