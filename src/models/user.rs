// User database model
// Core identity record for credential, 2FA and RBAC lookups.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::users;

/// Account status enumeration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, diesel::expression::AsExpression)]
#[diesel(sql_type = diesel::sql_types::Text)]
pub enum UserStatus {
    Active,
    TemporarilyBanned,
    PermanentlyBanned,
    Deleted,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::TemporarilyBanned => "temporarily_banned",
            UserStatus::PermanentlyBanned => "permanently_banned",
            UserStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "temporarily_banned" => Ok(UserStatus::TemporarilyBanned),
            "permanently_banned" => Ok(UserStatus::PermanentlyBanned),
            "deleted" => Ok(UserStatus::Deleted),
            _ => Err(format!("Invalid user status: {}", s)),
        }
    }
}

impl<DB> diesel::deserialize::FromSql<diesel::sql_types::Text, DB> for UserStatus
where
    DB: diesel::backend::Backend,
    String: diesel::deserialize::FromSql<diesel::sql_types::Text, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> diesel::deserialize::Result<Self> {
        let value = String::from_sql(bytes)?;
        Self::from_str(&value).map_err(|e| e.into())
    }
}

impl<DB> diesel::serialize::ToSql<diesel::sql_types::Text, DB> for UserStatus
where
    DB: diesel::backend::Backend,
    str: diesel::serialize::ToSql<diesel::sql_types::Text, DB>,
{
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, DB>,
    ) -> diesel::serialize::Result {
        self.as_str().to_sql(out)
    }
}

/// User database model - queryable from database
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub status: String, // will convert to UserStatus via status_enum()
    pub ban_expires_at: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
    pub two_factor_secret_encrypted: Option<Vec<u8>>,
    pub two_factor_backup_codes: Option<Vec<String>>,
    pub failed_login_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub status: String,
    pub email_verified: bool,
}

/// User update struct
#[derive(Debug, AsChangeset, Default)]
#[diesel(table_name = users)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub status: Option<String>,
    pub ban_expires_at: Option<Option<DateTime<Utc>>>,
    pub email_verified: Option<bool>,
    pub email_verified_at: Option<Option<DateTime<Utc>>>,
    pub two_factor_enabled: Option<bool>,
    pub two_factor_secret_encrypted: Option<Option<Vec<u8>>>,
    pub two_factor_backup_codes: Option<Option<Vec<String>>>,
    pub failed_login_count: Option<i32>,
}

/// Errors for user operations
#[derive(thiserror::Error, Debug)]
pub enum UserError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("User not found")]
    NotFound,

    #[error("Invalid user ID format")]
    InvalidId,

    #[error("Connection pool error")]
    Pool(String),
}

impl User {
    /// Find user by ID
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(id.eq(user_id))
            .first::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Find user by email (case-insensitive, stored lowercased)
    pub async fn find_by_email(
        conn: &mut AsyncPgConnection,
        email_str: &str,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(email.eq(email_str.to_lowercase()))
            .first::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Find user by username
    pub async fn find_by_username(
        conn: &mut AsyncPgConnection,
        username_str: &str,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(username.eq(username_str))
            .first::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Create a new user
    pub async fn create(
        conn: &mut AsyncPgConnection,
        new_user: NewUser,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        diesel::insert_into(users)
            .values(&new_user)
            .get_result::<User>(conn)
            .await
            .map_err(UserError::Database)
    }

    /// Update user
    pub async fn update(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        update: UserUpdate,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        diesel::update(users.filter(id.eq(user_id)))
            .set(&update)
            .get_result::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Get user's status as enum, defaulting to Active on a corrupt value.
    pub fn status_enum(&self) -> UserStatus {
        UserStatus::from_str(&self.status).unwrap_or_else(|e| {
            tracing::warn!(
                "Invalid user status '{}' for user {}, defaulting to Active: {}",
                self.status,
                self.id,
                e
            );
            UserStatus::Active
        })
    }

    /// Whether the account may currently authenticate.
    ///
    /// A temporary ban that has passed its expiry is treated as active -
    /// the janitor lifts bans lazily rather than on a schedule.
    pub fn is_active(&self) -> bool {
        match self.status_enum() {
            UserStatus::Active => true,
            UserStatus::TemporarilyBanned => self
                .ban_expires_at
                .map(|expiry| expiry <= Utc::now())
                .unwrap_or(false),
            UserStatus::PermanentlyBanned | UserStatus::Deleted => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_user(status: &str, ban_expires_at: Option<DateTime<Utc>>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            username: "testuser".to_string(),
            password_hash: "hash".to_string(),
            status: status.to_string(),
            ban_expires_at,
            email_verified: true,
            email_verified_at: Some(now),
            two_factor_enabled: false,
            two_factor_secret_encrypted: None,
            two_factor_backup_codes: None,
            failed_login_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_conversion() {
        assert_eq!(UserStatus::Active.as_str(), "active");
        assert_eq!(UserStatus::from_str("active"), Ok(UserStatus::Active));
        assert!(UserStatus::from_str("bogus").is_err());
    }

    #[test]
    fn test_active_user_is_active() {
        assert!(sample_user("active", None).is_active());
    }

    #[test]
    fn test_expired_temp_ban_is_active() {
        let expired = Utc::now() - chrono::Duration::hours(1);
        assert!(sample_user("temporarily_banned", Some(expired)).is_active());
    }

    #[test]
    fn test_unexpired_temp_ban_is_not_active() {
        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(!sample_user("temporarily_banned", Some(future)).is_active());
    }

    #[test]
    fn test_permanent_ban_is_not_active() {
        assert!(!sample_user("permanently_banned", None).is_active());
    }

    #[test]
    fn test_invalid_status_falls_back_to_active() {
        let user = sample_user("not_a_real_status", None);
        assert_eq!(user.status_enum(), UserStatus::Active);
    }
}
