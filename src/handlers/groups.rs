// Group CRUD and membership. Groups are the sole unit permissions attach
// to - there is no "grant user X permission Y" path anywhere in this file.

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
    handlers::guards::{parse_user_id, require_admin, require_membership},
    middleware::auth::AuthenticatedUser,
    models::{
        group::{Group, GroupError, NewGroup},
        org_member::OrgMember,
        user_group::{UserGroup, UserGroupError},
    },
    utils::auth_errors::AppError,
};

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameGroupRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub id: String,
    pub org_id: String,
    pub name: String,
}

impl From<Group> for GroupResponse {
    fn from(g: Group) -> Self {
        Self {
            id: g.id.to_string(),
            org_id: g.org_id.to_string(),
            name: g.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddGroupMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct GroupMemberResponse {
    pub user_id: String,
}

/// POST /organizations/:org_id/groups
pub async fn create_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateGroupRequest>,
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

    match Group::create(
        &mut conn,
        NewGroup {
            org_id,
            name: req.name,
            created_by: caller_id,
        },
    )
    .await
    {
        Ok(group) => (StatusCode::CREATED, Json(GroupResponse::from(group))).into_response(),
        Err(GroupError::NameTaken) => AppError::ConflictGroupName.into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// GET /organizations/:org_id/groups
pub async fn list_groups(
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

    if let Err(e) = require_membership(&mut conn, org_id, caller_id).await {
        return e.into_response();
    }

    match Group::list_for_org(&mut conn, org_id).await {
        Ok(groups) => Json(
            groups
                .into_iter()
                .map(GroupResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// PATCH /organizations/:org_id/groups/:group_id
pub async fn rename_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((org_id, group_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<RenameGroupRequest>,
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

    match Group::rename(&mut conn, group_id, &req.name).await {
        Ok(group) => Json(GroupResponse::from(group)).into_response(),
        Err(GroupError::NotFound) => AppError::NotFound("group").into_response(),
        Err(GroupError::NameTaken) => AppError::ConflictGroupName.into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// DELETE /organizations/:org_id/groups/:group_id
pub async fn delete_group(
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

    if let Err(e) = require_admin(&mut conn, org_id, caller_id).await {
        return e.into_response();
    }

    let member_ids = UserGroup::list_members(&mut conn, group_id).await.unwrap_or_default();

    match Group::delete(&mut conn, group_id).await {
        Ok(()) => {
            for member_id in member_ids {
                state.rbac_service.invalidate(member_id, org_id).await;
            }
            StatusCode::NO_CONTENT.into_response()
        },
        Err(GroupError::NotFound) => AppError::NotFound("group").into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// POST /organizations/:org_id/groups/:group_id/members
pub async fn add_group_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((org_id, group_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AddGroupMemberRequest>,
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

    if OrgMember::find(&mut conn, org_id, req.user_id).await.is_err() {
        return AppError::Validation(
            "user must be an organization member before joining a group".to_string(),
        )
        .into_response();
    }

    match UserGroup::add(&mut conn, req.user_id, group_id).await {
        Ok(_) => {
            state.rbac_service.invalidate(req.user_id, org_id).await;
            StatusCode::CREATED.into_response()
        },
        Err(UserGroupError::AlreadyMember) => {
            AppError::Validation("already a group member".to_string()).into_response()
        },
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// DELETE /organizations/:org_id/groups/:group_id/members/:user_id
pub async fn remove_group_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((org_id, group_id, target_user_id)): Path<(Uuid, Uuid, Uuid)>,
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

    match UserGroup::remove(&mut conn, target_user_id, group_id).await {
        Ok(()) => {
            state.rbac_service.invalidate(target_user_id, org_id).await;
            StatusCode::NO_CONTENT.into_response()
        },
        Err(UserGroupError::NotAMember) => AppError::NotFound("group membership").into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// GET /organizations/:org_id/groups/:group_id
pub async fn get_group(
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
        Ok(group) if group.org_id == org_id => Json(GroupResponse::from(group)).into_response(),
        Ok(_) => AppError::NotFound("group").into_response(),
        Err(GroupError::NotFound) => AppError::NotFound("group").into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}

/// GET /organizations/:org_id/groups/:group_id/members
pub async fn list_group_members(
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

    match UserGroup::list_members(&mut conn, group_id).await {
        Ok(member_ids) => Json(
            member_ids
                .into_iter()
                .map(|id| GroupMemberResponse { user_id: id.to_string() })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}
