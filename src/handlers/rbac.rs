// Policy Decision Point HTTP surface. `authorize` is the sole externally
// reachable authorization check - callers never get raw group membership,
// only a granted/denied decision plus the reason, for audit purposes.

use axum::{
    extract::{ConnectInfo, Extension, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::{
    app::AppState,
    handlers::guards::{parse_user_id, require_admin, require_membership},
    middleware::auth::AuthenticatedUser,
    models::{
        group_permission::{GroupPermission, GroupPermissionError},
        group::{Group, GroupError},
        permission::{Permission, PermissionError},
    },
    utils::auth_errors::AppError,
};

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub resource: String,
    pub action: String,
    pub resource_id: Option<String>,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub granted: bool,
    pub reason: String,
    pub matched_group_ids: Vec<String>,
    pub cache_source: String,
}

/// The calling service's identity for rate-limiting purposes. This endpoint
/// is unauthenticated (no end-user bearer token - it's called by other
/// services on a user's behalf), so the rate-limit key is the service
/// principal header if the caller set one, falling back to its remote
/// address.
fn service_principal(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-service-principal")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_string())
}

/// POST /authz/authorize
///
/// Unauthenticated but rate-limited per calling service principal - this is
/// the PDP endpoint other services call on a user's behalf, not an
/// end-user-facing route. Always writes an audit row, whether the decision
/// is granted or denied.
pub async fn authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<AuthorizeRequest>,
) -> impl IntoResponse {
    let ip_address = addr.ip().to_string();
    let principal = service_principal(&headers, &addr);

    let config = crate::app_config::config();
    if config.enable_rate_limiting {
        let rate_key = format!("authz:{}", principal);
        match state
            .rate_limit_service
            .check_rate_limit(&rate_key, "/auth/authorize")
            .await
        {
            Ok(status) if !status.allowed => {
                return AppError::RateLimited {
                    retry_after_seconds: status.retry_after.unwrap_or(1) as u64,
                }
                .into_response();
            },
            Err(e) => tracing::warn!("authz rate limit check failed: {}", e),
            _ => {},
        }
    }

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    match state
        .rbac_service
        .authorize(
            &mut conn,
            req.user_id,
            req.org_id,
            &req.resource,
            &req.action,
            req.resource_id.as_deref(),
            req.correlation_id.as_deref(),
            Some(&ip_address),
        )
        .await
    {
        Ok(decision) => Json(AuthorizeResponse {
            granted: decision.granted,
            reason: decision.reason,
            matched_group_ids: decision
                .matched_groups
                .iter()
                .map(Uuid::to_string)
                .collect(),
            cache_source: decision.source.as_str().to_string(),
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct GrantPermissionRequest {
    pub permission_name: String,
}

#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl From<Permission> for PermissionResponse {
    fn from(p: Permission) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name(),
            description: p.description,
        }
    }
}

/// GET /authz/permissions - the system-wide permission catalog
pub async fn list_permissions(State(state): State<AppState>) -> impl IntoResponse {
    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    match Permission::list_all(&mut conn).await {
        Ok(perms) => Json(
            perms
                .into_iter()
                .map(PermissionResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePermissionRequest {
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
}

/// POST /authz/permissions - adds to the system-wide permission catalog.
/// Any authenticated caller may add a permission definition; granting it to
/// a group still requires org admin, so defining an unused permission has
/// no effect on its own.
pub async fn create_permission(
    State(state): State<AppState>,
    Json(req): Json<CreatePermissionRequest>,
) -> impl IntoResponse {
    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    let new_permission = crate::models::permission::NewPermission {
        resource: req.resource,
        action: req.action,
        description: req.description,
    };

    match Permission::create(&mut conn, new_permission).await {
        Ok(perm) => (StatusCode::CREATED, Json(PermissionResponse::from(perm))).into_response(),
        Err(PermissionError::AlreadyExists) => {
            AppError::Validation("permission already exists".to_string()).into_response()
        },
        Err(PermissionError::InvalidFormat(_)) => {
            AppError::Validation("resource/action must match [a-z_]+".to_string()).into_response()
        },
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// GET /auth/users/:user_id/permissions?organization_id=
pub async fn list_user_permissions(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(user_id): Path<Uuid>,
    axum::extract::Query(params): axum::extract::Query<OrgScopedQuery>,
) -> impl IntoResponse {
    let caller_id = match parse_user_id(&caller) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    if let Err(e) = require_membership(&mut conn, params.organization_id, caller_id).await {
        return e.into_response();
    }

    match state
        .rbac_service
        .permissions_for_user(&mut conn, user_id, params.organization_id)
        .await
    {
        Ok(perms) => Json(perms).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct OrgScopedQuery {
    pub organization_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CheckPermissionQuery {
    pub organization_id: Uuid,
    pub permission: String,
}

/// GET /auth/users/:user_id/check-permission?organization_id=&permission=
pub async fn check_user_permission(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(user_id): Path<Uuid>,
    axum::extract::Query(params): axum::extract::Query<CheckPermissionQuery>,
) -> impl IntoResponse {
    let caller_id = match parse_user_id(&caller) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    if let Err(e) = require_membership(&mut conn, params.organization_id, caller_id).await {
        return e.into_response();
    }

    let (resource, action) = match Permission::parse_name(&params.permission) {
        Ok(parts) => parts,
        Err(_) => return AppError::Validation("invalid permission name".to_string()).into_response(),
    };

    match state
        .rbac_service
        .authorize(&mut conn, user_id, params.organization_id, &resource, &action, None, None, None)
        .await
    {
        Ok(decision) => Json(AuthorizeResponse {
            granted: decision.granted,
            reason: decision.reason,
            matched_group_ids: decision.matched_groups.iter().map(Uuid::to_string).collect(),
            cache_source: decision.source.as_str().to_string(),
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /organizations/:org_id/groups/:group_id/permissions
pub async fn list_group_permissions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((org_id, group_id)): Path<(Uuid, Uuid)>,
) -> impl IntoResponse {
    let caller_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    if let Err(e) = require_membership(&mut conn, org_id, caller_id).await {
        return e.into_response();
    }

    match Group::find_by_id(&mut conn, group_id).await {
        Ok(group) if group.org_id == org_id => {},
        Ok(_) => return AppError::NotFound("group").into_response(),
        Err(GroupError::NotFound) => return AppError::NotFound("group").into_response(),
        Err(e) => return AppError::Internal(e.to_string()).into_response(),
    }

    match GroupPermission::list_permissions_for_group(&mut conn, group_id).await {
        Ok(perms) => Json(
            perms
                .into_iter()
                .map(PermissionResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// POST /organizations/:org_id/groups/:group_id/permissions
pub async fn grant_group_permission(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((org_id, group_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<GrantPermissionRequest>,
) -> impl IntoResponse {
    let caller_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    if let Err(e) = require_admin(&mut conn, org_id, caller_id).await {
        return e.into_response();
    }

    let permission = match Permission::find_by_name(&mut conn, &req.permission_name).await {
        Ok(p) => p,
        Err(PermissionError::NotFound) => return AppError::NotFound("permission").into_response(),
        Err(PermissionError::InvalidFormat(_)) => {
            return AppError::Validation("invalid permission name".to_string()).into_response();
        },
        Err(e) => return AppError::Internal(e.to_string()).into_response(),
    };

    match GroupPermission::grant(&mut conn, group_id, permission.id, caller_id).await {
        Ok(_) => {
            invalidate_group_members(&state, &mut conn, group_id).await;
            StatusCode::CREATED.into_response()
        },
        Err(GroupPermissionError::AlreadyGranted) => {
            AppError::PermissionAlreadyGranted.into_response()
        },
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// DELETE /organizations/:org_id/groups/:group_id/permissions/:permission_name
pub async fn revoke_group_permission(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((org_id, group_id, permission_name)): Path<(Uuid, Uuid, String)>,
) -> impl IntoResponse {
    let caller_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    if let Err(e) = require_admin(&mut conn, org_id, caller_id).await {
        return e.into_response();
    }

    let permission = match Permission::find_by_name(&mut conn, &permission_name).await {
        Ok(p) => p,
        Err(PermissionError::NotFound) => return AppError::NotFound("permission").into_response(),
        Err(e) => return AppError::Internal(e.to_string()).into_response(),
    };

    match GroupPermission::revoke(&mut conn, group_id, permission.id, caller_id).await {
        Ok(()) => {
            invalidate_group_members(&state, &mut conn, group_id).await;
            StatusCode::NO_CONTENT.into_response()
        },
        Err(GroupPermissionError::NotGranted) => {
            AppError::NotFound("permission grant").into_response()
        },
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// Bumps the authz cache version for every member of `group`, across all
/// orgs the group belongs to. A permission grant/revoke changes what every
/// current member of the group can do.
async fn invalidate_group_members(
    state: &AppState,
    conn: &mut diesel_async::AsyncPgConnection,
    group_id: Uuid,
) {
    use crate::models::group::Group;
    use crate::models::user_group::UserGroup;

    let org_id = match Group::find_by_id(conn, group_id).await {
        Ok(group) => group.org_id,
        Err(e) => {
            tracing::warn!("could not resolve group org for cache invalidation: {}", e);
            return;
        },
    };

    match UserGroup::list_members(conn, group_id).await {
        Ok(member_ids) => {
            for member_id in member_ids {
                state.rbac_service.invalidate(member_id, org_id).await;
            }
        },
        Err(e) => tracing::warn!("failed to list group members for invalidation: {}", e),
    }
}
