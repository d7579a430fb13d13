// User <-> group membership.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::user_groups;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = user_groups)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserGroup {
    pub id: Uuid,
    pub user_id: Uuid,
    pub group_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_groups)]
pub struct NewUserGroup {
    pub user_id: Uuid,
    pub group_id: Uuid,
}

#[derive(thiserror::Error, Debug)]
pub enum UserGroupError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("User is not a member of this group")]
    NotAMember,

    #[error("User is already a member of this group")]
    AlreadyMember,
}

impl UserGroup {
    pub async fn add(
        conn: &mut AsyncPgConnection,
        user: Uuid,
        group: Uuid,
    ) -> Result<Self, UserGroupError> {
        use crate::schema::user_groups::dsl::*;

        diesel::insert_into(user_groups)
            .values(&NewUserGroup {
                user_id: user,
                group_id: group,
            })
            .get_result::<UserGroup>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => UserGroupError::AlreadyMember,
                _ => UserGroupError::Database(e),
            })
    }

    pub async fn remove(
        conn: &mut AsyncPgConnection,
        user: Uuid,
        group: Uuid,
    ) -> Result<(), UserGroupError> {
        use crate::schema::user_groups::dsl::*;

        let deleted = diesel::delete(
            user_groups
                .filter(user_id.eq(user))
                .filter(group_id.eq(group)),
        )
        .execute(conn)
        .await?;

        if deleted == 0 {
            return Err(UserGroupError::NotAMember);
        }
        Ok(())
    }

    pub async fn list_group_ids_for_user(
        conn: &mut AsyncPgConnection,
        user: Uuid,
    ) -> Result<Vec<Uuid>, UserGroupError> {
        use crate::schema::user_groups::dsl::*;

        user_groups
            .filter(user_id.eq(user))
            .select(group_id)
            .load::<Uuid>(conn)
            .await
            .map_err(UserGroupError::Database)
    }

    pub async fn list_members(
        conn: &mut AsyncPgConnection,
        group: Uuid,
    ) -> Result<Vec<Uuid>, UserGroupError> {
        use crate::schema::user_groups::dsl::*;

        user_groups
            .filter(group_id.eq(group))
            .select(user_id)
            .load::<Uuid>(conn)
            .await
            .map_err(UserGroupError::Database)
    }
}
