// Organization membership model - first gate of the PDP.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::org_members;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum OrgRole {
    Member,
    Admin,
    Owner,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Member => "member",
            OrgRole::Admin => "admin",
            OrgRole::Owner => "owner",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "member" => Some(OrgRole::Member),
            "admin" => Some(OrgRole::Admin),
            "owner" => Some(OrgRole::Owner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = org_members)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrgMember {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = org_members)]
pub struct NewOrgMember {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
}

#[derive(thiserror::Error, Debug)]
pub enum OrgMemberError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Not a member of this organization")]
    NotAMember,

    #[error("Already a member of this organization")]
    AlreadyMember,

    #[error("Cannot remove the last owner of an organization")]
    LastOwner,
}

impl OrgMember {
    pub fn role_enum(&self) -> OrgRole {
        OrgRole::from_str_opt(&self.role).unwrap_or(OrgRole::Member)
    }

    pub async fn add(
        conn: &mut AsyncPgConnection,
        new_member: NewOrgMember,
    ) -> Result<Self, OrgMemberError> {
        use crate::schema::org_members::dsl::*;

        diesel::insert_into(org_members)
            .values(&new_member)
            .get_result::<OrgMember>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => OrgMemberError::AlreadyMember,
                _ => OrgMemberError::Database(e),
            })
    }

    pub async fn find(
        conn: &mut AsyncPgConnection,
        org: Uuid,
        user: Uuid,
    ) -> Result<Self, OrgMemberError> {
        use crate::schema::org_members::dsl::*;

        org_members
            .filter(org_id.eq(org))
            .filter(user_id.eq(user))
            .first::<OrgMember>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => OrgMemberError::NotAMember,
                _ => OrgMemberError::Database(e),
            })
    }

    pub async fn list_for_org(
        conn: &mut AsyncPgConnection,
        org: Uuid,
    ) -> Result<Vec<Self>, OrgMemberError> {
        use crate::schema::org_members::dsl::*;

        org_members
            .filter(org_id.eq(org))
            .order(created_at.asc())
            .load::<OrgMember>(conn)
            .await
            .map_err(OrgMemberError::Database)
    }

    pub async fn list_org_ids_for_user(
        conn: &mut AsyncPgConnection,
        user: Uuid,
    ) -> Result<Vec<Uuid>, OrgMemberError> {
        use crate::schema::org_members::dsl::*;

        org_members
            .filter(user_id.eq(user))
            .select(org_id)
            .load::<Uuid>(conn)
            .await
            .map_err(OrgMemberError::Database)
    }

    pub async fn update_role(
        conn: &mut AsyncPgConnection,
        org: Uuid,
        user: Uuid,
        new_role: OrgRole,
    ) -> Result<Self, OrgMemberError> {
        use crate::schema::org_members::dsl::*;

        if new_role != OrgRole::Owner {
            Self::guard_last_owner(conn, org, user).await?;
        }

        diesel::update(org_members.filter(org_id.eq(org)).filter(user_id.eq(user)))
            .set((role.eq(new_role.as_str()), updated_at.eq(Utc::now())))
            .get_result::<OrgMember>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => OrgMemberError::NotAMember,
                _ => OrgMemberError::Database(e),
            })
    }

    pub async fn remove(
        conn: &mut AsyncPgConnection,
        org: Uuid,
        user: Uuid,
    ) -> Result<(), OrgMemberError> {
        Self::guard_last_owner(conn, org, user).await?;

        use crate::schema::org_members::dsl::*;

        let deleted = diesel::delete(org_members.filter(org_id.eq(org)).filter(user_id.eq(user)))
            .execute(conn)
            .await?;

        if deleted == 0 {
            return Err(OrgMemberError::NotAMember);
        }
        Ok(())
    }

    /// Rejects the operation if `user` is the sole owner of `org`.
    async fn guard_last_owner(
        conn: &mut AsyncPgConnection,
        org: Uuid,
        user: Uuid,
    ) -> Result<(), OrgMemberError> {
        use crate::schema::org_members::dsl::*;

        let membership = Self::find(conn, org, user).await?;
        if membership.role_enum() != OrgRole::Owner {
            return Ok(());
        }

        let owner_count: i64 = org_members
            .filter(org_id.eq(org))
            .filter(role.eq(OrgRole::Owner.as_str()))
            .count()
            .get_result(conn)
            .await?;

        if owner_count <= 1 {
            return Err(OrgMemberError::LastOwner);
        }
        Ok(())
    }
}
