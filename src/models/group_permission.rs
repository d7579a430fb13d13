// Group <-> permission grants, plus the immutable audit trail of who granted
// or revoked them.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::permission::Permission;
use crate::schema::{group_permissions, permission_audit_entries, permissions};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = group_permissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GroupPermission {
    pub id: Uuid,
    pub group_id: Uuid,
    pub permission_id: Uuid,
    pub granted_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = group_permissions)]
pub struct NewGroupPermission {
    pub group_id: Uuid,
    pub permission_id: Uuid,
    pub granted_by: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Grant,
    Revoke,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Grant => "grant",
            AuditAction::Revoke => "revoke",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = permission_audit_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PermissionAuditEntry {
    pub id: Uuid,
    pub action: String,
    pub group_id: Uuid,
    pub permission_id: Uuid,
    pub actor_id: Uuid,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = permission_audit_entries)]
pub struct NewPermissionAuditEntry {
    pub action: String,
    pub group_id: Uuid,
    pub permission_id: Uuid,
    pub actor_id: Uuid,
    pub details: JsonValue,
}

#[derive(thiserror::Error, Debug)]
pub enum GroupPermissionError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Permission is not granted to this group")]
    NotGranted,

    #[error("Permission is already granted to this group")]
    AlreadyGranted,
}

impl GroupPermission {
    /// Grants `permission` to `group` and records the grant in the audit
    /// trail, in the same transaction.
    pub async fn grant(
        conn: &mut AsyncPgConnection,
        group: Uuid,
        permission: Uuid,
        granted_by: Uuid,
    ) -> Result<Self, GroupPermissionError> {
        use diesel_async::AsyncConnection;

        conn.transaction::<_, GroupPermissionError, _>(|tx| {
            Box::pin(async move {
                use crate::schema::group_permissions::dsl::*;

                let grant_row = diesel::insert_into(group_permissions)
                    .values(&NewGroupPermission {
                        group_id: group,
                        permission_id: permission,
                        granted_by,
                    })
                    .get_result::<GroupPermission>(tx)
                    .await
                    .map_err(|e| match e {
                        diesel::result::Error::DatabaseError(
                            diesel::result::DatabaseErrorKind::UniqueViolation,
                            _,
                        ) => GroupPermissionError::AlreadyGranted,
                        _ => GroupPermissionError::Database(e),
                    })?;

                diesel::insert_into(permission_audit_entries::table)
                    .values(&NewPermissionAuditEntry {
                        action: AuditAction::Grant.as_str().to_string(),
                        group_id: group,
                        permission_id: permission,
                        actor_id: granted_by,
                        details: serde_json::json!({}),
                    })
                    .execute(tx)
                    .await?;

                Ok(grant_row)
            })
        })
        .await
    }

    /// Revokes `permission` from `group` and records the revocation in the
    /// audit trail, in the same transaction.
    pub async fn revoke(
        conn: &mut AsyncPgConnection,
        group: Uuid,
        permission: Uuid,
        actor: Uuid,
    ) -> Result<(), GroupPermissionError> {
        use diesel_async::AsyncConnection;

        conn.transaction::<_, GroupPermissionError, _>(|tx| {
            Box::pin(async move {
                use crate::schema::group_permissions::dsl::*;

                let deleted = diesel::delete(
                    group_permissions
                        .filter(group_id.eq(group))
                        .filter(permission_id.eq(permission)),
                )
                .execute(tx)
                .await?;

                if deleted == 0 {
                    return Err(GroupPermissionError::NotGranted);
                }

                diesel::insert_into(permission_audit_entries::table)
                    .values(&NewPermissionAuditEntry {
                        action: AuditAction::Revoke.as_str().to_string(),
                        group_id: group,
                        permission_id: permission,
                        actor_id: actor,
                        details: serde_json::json!({}),
                    })
                    .execute(tx)
                    .await?;

                Ok(())
            })
        })
        .await
    }

    pub async fn list_permission_ids_for_group(
        conn: &mut AsyncPgConnection,
        group: Uuid,
    ) -> Result<Vec<Uuid>, GroupPermissionError> {
        use crate::schema::group_permissions::dsl::*;

        group_permissions
            .filter(group_id.eq(group))
            .select(permission_id)
            .load::<Uuid>(conn)
            .await
            .map_err(GroupPermissionError::Database)
    }

    /// Same as `list_permission_ids_for_group`, resolved to full permission
    /// rows for display.
    pub async fn list_permissions_for_group(
        conn: &mut AsyncPgConnection,
        group: Uuid,
    ) -> Result<Vec<Permission>, GroupPermissionError> {
        group_permissions::table
            .inner_join(permissions::table.on(permissions::id.eq(group_permissions::permission_id)))
            .filter(group_permissions::group_id.eq(group))
            .select(Permission::as_select())
            .load::<Permission>(conn)
            .await
            .map_err(GroupPermissionError::Database)
    }
}
