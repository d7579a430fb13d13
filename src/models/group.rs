// Group model - named, org-scoped collections of users that permissions are
// granted to. Permissions are never granted directly to users.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::groups;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = groups)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Group {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = groups)]
pub struct NewGroup {
    pub org_id: Uuid,
    pub name: String,
    pub created_by: Uuid,
}

#[derive(thiserror::Error, Debug)]
pub enum GroupError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Group not found")]
    NotFound,

    #[error("A group with this name already exists in the organization")]
    NameTaken,
}

impl Group {
    pub async fn create(
        conn: &mut AsyncPgConnection,
        new_group: NewGroup,
    ) -> Result<Self, GroupError> {
        use crate::schema::groups::dsl::*;

        diesel::insert_into(groups)
            .values(&new_group)
            .get_result::<Group>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => GroupError::NameTaken,
                _ => GroupError::Database(e),
            })
    }

    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        group_id: Uuid,
    ) -> Result<Self, GroupError> {
        use crate::schema::groups::dsl::*;

        groups
            .filter(id.eq(group_id))
            .first::<Group>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => GroupError::NotFound,
                _ => GroupError::Database(e),
            })
    }

    pub async fn list_for_org(
        conn: &mut AsyncPgConnection,
        org: Uuid,
    ) -> Result<Vec<Self>, GroupError> {
        use crate::schema::groups::dsl::*;

        groups
            .filter(org_id.eq(org))
            .order(name.asc())
            .load::<Group>(conn)
            .await
            .map_err(GroupError::Database)
    }

    pub async fn rename(
        conn: &mut AsyncPgConnection,
        group_id: Uuid,
        new_name: &str,
    ) -> Result<Self, GroupError> {
        use crate::schema::groups::dsl::*;

        diesel::update(groups.filter(id.eq(group_id)))
            .set((name.eq(new_name), updated_at.eq(Utc::now())))
            .get_result::<Group>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => GroupError::NotFound,
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => GroupError::NameTaken,
                _ => GroupError::Database(e),
            })
    }

    /// Deletes the group. Membership rows and permission grants cascade via
    /// foreign-key `ON DELETE CASCADE` at the migration level.
    pub async fn delete(
        conn: &mut AsyncPgConnection,
        group_id: Uuid,
    ) -> Result<(), GroupError> {
        use crate::schema::groups::dsl::*;

        let deleted = diesel::delete(groups.filter(id.eq(group_id)))
            .execute(conn)
            .await?;

        if deleted == 0 {
            return Err(GroupError::NotFound);
        }
        Ok(())
    }
}
