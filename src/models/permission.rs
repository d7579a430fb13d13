// System-wide permission catalog. A permission is a (resource, action) pair,
// e.g. resource="billing", action="read" -> "billing:read".

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::permissions;

static PERMISSION_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_]+:[a-z_]+$").expect("static permission regex is valid"));

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = permissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Permission {
    pub id: Uuid,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = permissions)]
pub struct NewPermission {
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum PermissionError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Permission not found")]
    NotFound,

    #[error("Permission already exists")]
    AlreadyExists,

    #[error("Permission name must match ^[a-z_]+:[a-z_]+$, got '{0}'")]
    InvalidFormat(String),
}

impl Permission {
    pub fn name(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }

    /// Validates a `resource:action` permission string and splits it.
    pub fn parse_name(name: &str) -> Result<(String, String), PermissionError> {
        if !PERMISSION_NAME_RE.is_match(name) {
            return Err(PermissionError::InvalidFormat(name.to_string()));
        }
        let (resource, action) = name
            .split_once(':')
            .expect("regex guarantees a single colon separator");
        Ok((resource.to_string(), action.to_string()))
    }

    pub async fn create(
        conn: &mut AsyncPgConnection,
        new_permission: NewPermission,
    ) -> Result<Self, PermissionError> {
        use crate::schema::permissions::dsl::*;

        diesel::insert_into(permissions)
            .values(&new_permission)
            .get_result::<Permission>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => PermissionError::AlreadyExists,
                _ => PermissionError::Database(e),
            })
    }

    pub async fn find_by_name(
        conn: &mut AsyncPgConnection,
        name: &str,
    ) -> Result<Self, PermissionError> {
        use crate::schema::permissions::dsl::*;

        let (res, act) = Self::parse_name(name)?;
        permissions
            .filter(resource.eq(res))
            .filter(action.eq(act))
            .first::<Permission>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => PermissionError::NotFound,
                _ => PermissionError::Database(e),
            })
    }

    pub async fn list_all(conn: &mut AsyncPgConnection) -> Result<Vec<Self>, PermissionError> {
        use crate::schema::permissions::dsl::*;

        permissions
            .order((resource.asc(), action.asc()))
            .load::<Permission>(conn)
            .await
            .map_err(PermissionError::Database)
    }
}
