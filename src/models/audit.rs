// Authorization decision audit row - the hash-chained, append-only log that
// `services::audit` writes to and verifies.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::schema::audit_log;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = audit_log)]
#[diesel(primary_key(seq))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AuditLogRow {
    pub seq: i64,
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub org_id: Option<Uuid>,
    pub resource: String,
    pub action: String,
    pub resource_id: Option<String>,
    pub granted: bool,
    pub reason: String,
    pub matched_group_ids: Vec<Uuid>,
    pub cache_source: String,
    pub correlation_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: JsonValue,
    pub prior_hash: String,
    pub row_hash: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = audit_log)]
pub struct NewAuditLogRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub org_id: Option<Uuid>,
    pub resource: String,
    pub action: String,
    pub resource_id: Option<String>,
    pub granted: bool,
    pub reason: String,
    pub matched_group_ids: Vec<Uuid>,
    pub cache_source: String,
    pub correlation_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: JsonValue,
    pub prior_hash: String,
    pub row_hash: String,
}

#[derive(thiserror::Error, Debug)]
pub enum AuditLogError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

/// Filters accepted by `services::audit::AuditService::query`.
#[derive(Debug, Default, Clone)]
pub struct AuditQueryFilter {
    pub user_id: Option<Uuid>,
    pub org_id: Option<Uuid>,
    pub resource: Option<String>,
    pub granted: Option<bool>,
    pub correlation_id: Option<String>,
    pub resource_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl AuditLogRow {
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        row: NewAuditLogRow,
    ) -> Result<Self, AuditLogError> {
        use crate::schema::audit_log::dsl::*;

        diesel::insert_into(audit_log)
            .values(&row)
            .get_result::<AuditLogRow>(conn)
            .await
            .map_err(AuditLogError::Database)
    }

    /// The most recently written row, used to chain the next `prior_hash`.
    pub async fn latest(conn: &mut AsyncPgConnection) -> Result<Option<Self>, AuditLogError> {
        use crate::schema::audit_log::dsl::*;

        audit_log
            .order(seq.desc())
            .first::<AuditLogRow>(conn)
            .await
            .optional()
            .map_err(AuditLogError::Database)
    }

    pub async fn range(
        conn: &mut AsyncPgConnection,
        from_seq: i64,
        to_seq: i64,
    ) -> Result<Vec<Self>, AuditLogError> {
        use crate::schema::audit_log::dsl::*;

        audit_log
            .filter(seq.ge(from_seq))
            .filter(seq.le(to_seq))
            .order(seq.asc())
            .load::<AuditLogRow>(conn)
            .await
            .map_err(AuditLogError::Database)
    }

    pub async fn query(
        conn: &mut AsyncPgConnection,
        filter: &AuditQueryFilter,
    ) -> Result<Vec<Self>, AuditLogError> {
        use crate::schema::audit_log::dsl::*;

        let mut query = audit_log.into_boxed();

        if let Some(u) = filter.user_id {
            query = query.filter(user_id.eq(u));
        }
        if let Some(o) = filter.org_id {
            query = query.filter(org_id.eq(o));
        }
        if let Some(ref r) = filter.resource {
            query = query.filter(resource.eq(r.clone()));
        }
        if let Some(g) = filter.granted {
            query = query.filter(granted.eq(g));
        }
        if let Some(ref c) = filter.correlation_id {
            query = query.filter(correlation_id.eq(c.clone()));
        }
        if let Some(ref rid) = filter.resource_id {
            query = query.filter(resource_id.eq(rid.clone()));
        }
        if let Some(since) = filter.since {
            query = query.filter(created_at.ge(since));
        }
        if let Some(until) = filter.until {
            query = query.filter(created_at.le(until));
        }

        query
            .order(seq.desc())
            .limit(filter.limit)
            .load::<AuditLogRow>(conn)
            .await
            .map_err(AuditLogError::Database)
    }
}
