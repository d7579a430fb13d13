// Organization lifecycle: create, read, list, soft-delete, and membership
// management. Organization membership is the first gate of every
// authorization decision - a user with zero memberships is denied before
// the PDP ever looks at groups.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    app::AppState,
    handlers::guards::{parse_user_id, require_org_role},
    middleware::auth::AuthenticatedUser,
    models::{
        org_member::{NewOrgMember, OrgMember, OrgMemberError, OrgRole},
        organization::{NewOrganization, Organization, OrganizationError},
    },
    utils::auth_errors::AppError,
};

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Serialize)]
pub struct OrganizationResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub status: String,
}

impl From<Organization> for OrganizationResponse {
    fn from(org: Organization) -> Self {
        Self {
            id: org.id.to_string(),
            name: org.name,
            slug: org.slug,
            status: org.status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub user_id: String,
    pub org_id: String,
    pub role: String,
}

impl From<OrgMember> for MemberResponse {
    fn from(m: OrgMember) -> Self {
        Self {
            user_id: m.user_id.to_string(),
            org_id: m.org_id.to_string(),
            role: m.role,
        }
    }
}

/// POST /organizations
pub async fn create_organization(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<CreateOrganizationRequest>,
) -> impl IntoResponse {
    let user_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    let created = match Organization::create(
        &mut conn,
        NewOrganization {
            name: req.name,
            slug: req.slug,
            status: "active".to_string(),
        },
    )
    .await
    {
        Ok(org) => org,
        Err(OrganizationError::SlugTaken) => return AppError::ConflictSlug.into_response(),
        Err(e) => return AppError::Internal(e.to_string()).into_response(),
    };

    if let Err(e) = OrgMember::add(
        &mut conn,
        NewOrgMember {
            org_id: created.id,
            user_id,
            role: OrgRole::Owner.as_str().to_string(),
        },
    )
    .await
    {
        tracing::error!("failed to add creator as owner: {}", e);
        return AppError::Internal(e.to_string()).into_response();
    }

    (
        StatusCode::CREATED,
        Json(OrganizationResponse::from(created)),
    )
        .into_response()
}

/// GET /organizations/:org_id
pub async fn get_organization(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(org_id): Path<Uuid>,
) -> impl IntoResponse {
    let user_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    if OrgMember::find(&mut conn, org_id, user_id).await.is_err() {
        return AppError::NotAMember.into_response();
    }

    match Organization::find_by_id(&mut conn, org_id).await {
        Ok(org) => Json(OrganizationResponse::from(org)).into_response(),
        Err(OrganizationError::NotFound) => AppError::NotFound("organization").into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// DELETE /organizations/:org_id
pub async fn delete_organization(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(org_id): Path<Uuid>,
) -> impl IntoResponse {
    let user_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    if let Err(e) = require_org_role(&mut conn, org_id, user_id, OrgRole::Owner).await {
        return e.into_response();
    }

    match Organization::soft_delete(&mut conn, org_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// POST /organizations/:org_id/members
pub async fn add_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(org_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> impl IntoResponse {
    let caller_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    if let Err(e) = require_org_role(&mut conn, org_id, caller_id, OrgRole::Admin).await {
        return e.into_response();
    }

    let role = match OrgRole::from_str_opt(&req.role) {
        Some(role) => role,
        None => return AppError::Validation("invalid role".to_string()).into_response(),
    };

    match OrgMember::add(
        &mut conn,
        NewOrgMember {
            org_id,
            user_id: req.user_id,
            role: role.as_str().to_string(),
        },
    )
    .await
    {
        Ok(member) => {
            state.rbac_service.invalidate(req.user_id, org_id).await;
            (StatusCode::CREATED, Json(MemberResponse::from(member))).into_response()
        },
        Err(OrgMemberError::AlreadyMember) => {
            AppError::Validation("already a member".to_string()).into_response()
        },
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// PATCH /organizations/:org_id/members/:user_id
pub async fn update_member_role(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((org_id, target_user_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateMemberRoleRequest>,
) -> impl IntoResponse {
    let caller_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    if let Err(e) = require_org_role(&mut conn, org_id, caller_id, OrgRole::Admin).await {
        return e.into_response();
    }

    let role = match OrgRole::from_str_opt(&req.role) {
        Some(role) => role,
        None => return AppError::Validation("invalid role".to_string()).into_response(),
    };

    match OrgMember::update_role(&mut conn, org_id, target_user_id, role).await {
        Ok(member) => {
            state.rbac_service.invalidate(target_user_id, org_id).await;
            Json(MemberResponse::from(member)).into_response()
        },
        Err(OrgMemberError::NotAMember) => AppError::NotAMember.into_response(),
        Err(OrgMemberError::LastOwner) => {
            AppError::Validation("cannot demote the last owner".to_string()).into_response()
        },
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// DELETE /organizations/:org_id/members/:user_id
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((org_id, target_user_id)): Path<(Uuid, Uuid)>,
) -> impl IntoResponse {
    let caller_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    if let Err(e) = require_org_role(&mut conn, org_id, caller_id, OrgRole::Admin).await {
        return e.into_response();
    }

    match OrgMember::remove(&mut conn, org_id, target_user_id).await {
        Ok(()) => {
            state.rbac_service.invalidate(target_user_id, org_id).await;
            StatusCode::NO_CONTENT.into_response()
        },
        Err(OrgMemberError::NotAMember) => AppError::NotAMember.into_response(),
        Err(OrgMemberError::LastOwner) => {
            AppError::Validation("cannot remove the last owner".to_string()).into_response()
        },
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// GET /organizations - every organization the caller belongs to
pub async fn list_my_organizations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    let user_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    match Organization::list_for_user(&mut conn, user_id).await {
        Ok(orgs) => Json(
            orgs.into_iter()
                .map(OrganizationResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// GET /organizations/slug/:slug
pub async fn get_organization_by_slug(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(slug): Path<String>,
) -> impl IntoResponse {
    let user_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    let org = match Organization::find_by_slug(&mut conn, &slug).await {
        Ok(org) => org,
        Err(OrganizationError::NotFound) => return AppError::NotFound("organization").into_response(),
        Err(e) => return AppError::Internal(e.to_string()).into_response(),
    };

    if OrgMember::find(&mut conn, org.id, user_id).await.is_err() {
        return AppError::NotAMember.into_response();
    }

    Json(OrganizationResponse::from(org)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CheckMyPermissionQuery {
    pub permission: String,
}

/// GET /organizations/:org_id/check-permission?permission=resource:action
pub async fn check_my_permission(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(org_id): Path<Uuid>,
    axum::extract::Query(params): axum::extract::Query<CheckMyPermissionQuery>,
) -> impl IntoResponse {
    let user_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    let (resource, action) = match crate::models::permission::Permission::parse_name(&params.permission) {
        Ok(parts) => parts,
        Err(_) => return AppError::Validation("invalid permission name".to_string()).into_response(),
    };

    match state
        .rbac_service
        .authorize(&mut conn, user_id, org_id, &resource, &action, None, None, None)
        .await
    {
        Ok(decision) => Json(serde_json::json!({
            "granted": decision.granted,
            "reason": decision.reason,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /organizations/:org_id/role - the caller's own role in the org
pub async fn get_my_role(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(org_id): Path<Uuid>,
) -> impl IntoResponse {
    let user_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    match OrgMember::find(&mut conn, org_id, user_id).await {
        Ok(membership) => Json(MemberResponse::from(membership)).into_response(),
        Err(_) => AppError::NotAMember.into_response(),
    }
}

/// GET /organizations/:org_id/members
pub async fn list_members(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(org_id): Path<Uuid>,
) -> impl IntoResponse {
    let caller_id = match parse_user_id(&user) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(_) => return AppError::ServiceUnavailable.into_response(),
    };

    if OrgMember::find(&mut conn, org_id, caller_id).await.is_err() {
        return AppError::NotAMember.into_response();
    }

    match OrgMember::list_for_org(&mut conn, org_id).await {
        Ok(members) => Json(
            members
                .into_iter()
                .map(MemberResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}
