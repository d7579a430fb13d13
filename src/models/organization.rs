// Organization database model

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{org_members, organizations};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = organizations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub status: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = organizations)]
pub struct NewOrganization {
    pub name: String,
    pub slug: String,
    pub status: String,
}

#[derive(Debug, AsChangeset, Default)]
#[diesel(table_name = organizations)]
pub struct OrganizationUpdate {
    pub name: Option<String>,
    pub status: Option<String>,
    pub deleted_at: Option<Option<DateTime<Utc>>>,
}

#[derive(thiserror::Error, Debug)]
pub enum OrganizationError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Organization not found")]
    NotFound,

    #[error("Slug already in use")]
    SlugTaken,
}

impl Organization {
    pub async fn create(
        conn: &mut AsyncPgConnection,
        new_org: NewOrganization,
    ) -> Result<Self, OrganizationError> {
        use crate::schema::organizations::dsl::*;

        diesel::insert_into(organizations)
            .values(&new_org)
            .get_result::<Organization>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => OrganizationError::SlugTaken,
                _ => OrganizationError::Database(e),
            })
    }

    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        org_id: Uuid,
    ) -> Result<Self, OrganizationError> {
        use crate::schema::organizations::dsl::*;

        organizations
            .filter(id.eq(org_id))
            .filter(deleted_at.is_null())
            .first::<Organization>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => OrganizationError::NotFound,
                _ => OrganizationError::Database(e),
            })
    }

    pub async fn find_by_slug(
        conn: &mut AsyncPgConnection,
        slug_str: &str,
    ) -> Result<Self, OrganizationError> {
        use crate::schema::organizations::dsl::*;

        organizations
            .filter(slug.eq(slug_str))
            .filter(deleted_at.is_null())
            .first::<Organization>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => OrganizationError::NotFound,
                _ => OrganizationError::Database(e),
            })
    }

    pub async fn list(conn: &mut AsyncPgConnection) -> Result<Vec<Self>, OrganizationError> {
        use crate::schema::organizations::dsl::*;

        organizations
            .filter(deleted_at.is_null())
            .order(created_at.desc())
            .load::<Organization>(conn)
            .await
            .map_err(OrganizationError::Database)
    }

    /// Every organization `user_id` is a member of, newest membership first.
    pub async fn list_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> Result<Vec<Self>, OrganizationError> {
        organizations::table
            .inner_join(org_members::table.on(org_members::org_id.eq(organizations::id)))
            .filter(org_members::user_id.eq(user_id_val))
            .filter(organizations::deleted_at.is_null())
            .order(org_members::created_at.desc())
            .select(Organization::as_select())
            .load::<Organization>(conn)
            .await
            .map_err(OrganizationError::Database)
    }

    pub async fn soft_delete(
        conn: &mut AsyncPgConnection,
        org_id: Uuid,
    ) -> Result<(), OrganizationError> {
        use crate::schema::organizations::dsl::*;

        diesel::update(organizations.filter(id.eq(org_id)))
            .set((
                deleted_at.eq(Some(Utc::now())),
                status.eq("deleted"),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await
            .map_err(OrganizationError::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_organization_fields() {
        let new_org = NewOrganization {
            name: "Acme".to_string(),
            slug: "acme".to_string(),
            status: "active".to_string(),
        };
        assert_eq!(new_org.slug, "acme");
    }
}
