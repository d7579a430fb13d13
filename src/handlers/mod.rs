// HTTP route tables, grouped by resource.

pub mod auth;
pub mod docs; // Modular documentation structure
pub mod groups;
pub mod guards;
pub mod organizations;
pub mod rbac;
pub mod two_factor;

use crate::{app::AppState, middleware::auth_middleware};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

/// Unauthenticated credential lifecycle routes.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/login/verify", post(auth::verify_login_two_factor))
        .route("/refresh", post(auth::refresh_token))
        .route("/verify-email", post(auth::verify_email))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/verification-status", get(auth::verification_status))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
}

/// Routes that require a valid access token but no particular org role.
pub fn protected_auth_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::get_current_user))
        .route("/validate", post(auth::validate_token))
        .route("/change-password", post(auth::change_password))
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Two-factor enrollment routes.
pub fn two_factor_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/enroll", post(two_factor::enroll))
        .route("/confirm", post(two_factor::confirm))
        .route("/disable", post(two_factor::disable))
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Policy Decision Point routes. `/authorize` is callable by other services
/// on a user's behalf and carries no end-user bearer token, so it is not
/// gated by `auth_middleware` - it is rate-limited per calling service
/// principal instead (see `handlers::rbac::authorize`). The permission
/// catalog below it is an end-user-facing read and stays behind the
/// middleware.
pub fn authz_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/authorize", post(rbac::authorize))
        .merge(
            Router::new()
                .route(
                    "/permissions",
                    get(rbac::list_permissions).post(rbac::create_permission),
                )
                .layer(middleware::from_fn_with_state(state, auth_middleware)),
        )
}

/// Per-user permission lookups, scoped by organization via a query param.
pub fn user_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/{user_id}/permissions", get(rbac::list_user_permissions))
        .route(
            "/{user_id}/check-permission",
            get(rbac::check_user_permission),
        )
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Organizations, their memberships, and the groups/permissions beneath them.
pub fn organization_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(organizations::list_my_organizations).post(organizations::create_organization),
        )
        .route("/slug/{slug}", get(organizations::get_organization_by_slug))
        .route(
            "/{org_id}",
            get(organizations::get_organization).delete(organizations::delete_organization),
        )
        .route(
            "/{org_id}/check-permission",
            get(organizations::check_my_permission),
        )
        .route("/{org_id}/role", get(organizations::get_my_role))
        .route(
            "/{org_id}/members",
            get(organizations::list_members).post(organizations::add_member),
        )
        .route(
            "/{org_id}/members/{user_id}",
            axum::routing::patch(organizations::update_member_role)
                .delete(organizations::remove_member),
        )
        .route(
            "/{org_id}/groups",
            get(groups::list_groups).post(groups::create_group),
        )
        .route(
            "/{org_id}/groups/{group_id}",
            get(groups::get_group)
                .patch(groups::rename_group)
                .delete(groups::delete_group),
        )
        .route(
            "/{org_id}/groups/{group_id}/members",
            get(groups::list_group_members).post(groups::add_group_member),
        )
        .route(
            "/{org_id}/groups/{group_id}/members/{user_id}",
            axum::routing::delete(groups::remove_group_member),
        )
        .route(
            "/{org_id}/groups/{group_id}/permissions",
            get(rbac::list_group_permissions).post(rbac::grant_group_permission),
        )
        .route(
            "/{org_id}/groups/{group_id}/permissions/{permission_name}",
            axum::routing::delete(rbac::revoke_group_permission),
        )
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}
