// API Documentation handlers - modular structure
pub mod auth;
pub mod authz;
pub mod health;
pub mod schemas;
pub mod swagger_ui;

use axum::{
    extract::OriginalUri,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{self, json};

/// Serve OpenAPI JSON specification at /v1/docs/openapi.json
pub async fn serve_openapi_spec() -> Response {
    let spec = build_openapi_spec();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::to_string(&spec).unwrap_or_default(),
    )
        .into_response()
}

/// Redirect /docs to /docs/ for proper relative path resolution
pub async fn redirect_to_docs(original_uri: OriginalUri) -> impl IntoResponse {
    let mut path = original_uri.0.path().to_string();
    if !path.ends_with('/') {
        path.push('/');
    }
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, path)]).into_response()
}

/// Re-export swagger UI handler
pub use swagger_ui::serve_swagger_ui;

/// Build the complete OpenAPI specification
fn build_openapi_spec() -> serde_json::Value {
    serde_json::json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Authority Core API",
            "description": "Credential lifecycle, RBAC/PDP authorization, and tamper-evident audit logging for multi-tenant services",
            "version": "1.0.0",
            "contact": {
                "name": "Platform Team"
            }
        },
        "servers": [
            {
                "url": "http://localhost:8080",
                "description": "Development server (local)"
            }
        ],
        "tags": [
            {
                "name": "Authentication",
                "description": "User authentication and registration"
            },
            {
                "name": "Two-Factor",
                "description": "TOTP-based two-factor authentication enrollment and challenge"
            },
            {
                "name": "Organizations",
                "description": "Organization lifecycle and membership management"
            },
            {
                "name": "Authorization",
                "description": "Policy Decision Point authorization checks and the permission catalog"
            },
            {
                "name": "Health",
                "description": "Service health checks"
            }
        ],
        "paths": {
            "/v1/auth/register": auth::register_endpoint(),
            "/v1/auth/login": auth::login_endpoint(),
            "/v1/auth/refresh": auth::refresh_endpoint(),
            "/v1/auth/logout": auth::logout_endpoint(),
            "/v1/auth/me": auth::get_current_user_endpoint(),
            "/v1/auth/validate": auth::validate_token_endpoint(),
            "/v1/auth/verify-email": auth::verify_email_endpoint(),
            "/v1/auth/resend-verification": auth::resend_verification_endpoint(),
            "/v1/auth/verification-status": auth::verification_status_endpoint(),
            "/v1/auth/forgot-password": auth::forgot_password_endpoint(),
            "/v1/auth/reset-password": auth::reset_password_endpoint(),
            "/v1/2fa/enroll": authz::two_factor_enroll_endpoint(),
            "/v1/2fa/confirm": authz::two_factor_confirm_endpoint(),
            "/v1/authz/authorize": authz::authorize_endpoint(),
            "/v1/authz/permissions": authz::list_permissions_endpoint(),
            "/v1/organizations": authz::create_organization_endpoint(),
            "/v1/organizations/{org_id}/members": authz::organization_members_endpoint(),
            "/v1/health": health::health_endpoint(),
        },
        "components": {
            "schemas": schemas::all_schemas(),
            "securitySchemes": {
                "bearerAuth": {
                    "type": "http",
                    "scheme": "bearer",
                    "bearerFormat": "JWT",
                    "description": "JWT access token obtained from login or refresh endpoints"
                }
            }
        }
    })
}
