// Shared authorization gates for org-scoped handlers. Every handler that
// mutates or reads organization-internal state starts with one of these.

use uuid::Uuid;

use crate::{
    middleware::auth::AuthenticatedUser,
    models::org_member::{OrgMember, OrgRole},
    utils::auth_errors::AppError,
};

pub fn parse_user_id(user: &AuthenticatedUser) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.user_id).map_err(|_| AppError::InvalidToken)
}

/// Requires the caller be at least `min_role` in `org`, returning their
/// current membership row on success.
pub async fn require_org_role(
    conn: &mut diesel_async::AsyncPgConnection,
    org_id: Uuid,
    user_id: Uuid,
    min_role: OrgRole,
) -> Result<OrgMember, AppError> {
    let membership = OrgMember::find(conn, org_id, user_id)
        .await
        .map_err(|_| AppError::NotAMember)?;

    if membership.role_enum() < min_role {
        return Err(AppError::InsufficientRole);
    }
    Ok(membership)
}

/// Requires the caller be at least an org admin. A thin wrapper over
/// `require_org_role` for call sites that don't need the membership row.
pub async fn require_admin(
    conn: &mut diesel_async::AsyncPgConnection,
    org_id: Uuid,
    user_id: Uuid,
) -> Result<(), AppError> {
    require_org_role(conn, org_id, user_id, OrgRole::Admin).await.map(|_| ())
}

/// Requires the caller be a member of `org` at all, without any role floor.
pub async fn require_membership(
    conn: &mut diesel_async::AsyncPgConnection,
    org_id: Uuid,
    user_id: Uuid,
) -> Result<OrgMember, AppError> {
    OrgMember::find(conn, org_id, user_id)
        .await
        .map_err(|_| AppError::NotAMember)
}
