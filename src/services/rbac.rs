// The policy decision point. `authorize` is the only function in this crate
// that is allowed to say yes - handlers, background jobs and other services
// call it, they never reconstruct a grant decision from roles or group
// membership themselves.
//
// Org membership is the first gate: a user with no row in `org_members` for
// the target org is denied before permissions are even resolved, regardless
// of what groups they belong to elsewhere. Permissions are never granted to
// a user directly - only to groups, and a user inherits a group's grants by
// being a member of it.
//
// Two cache tiers sit in front of the database:
//   L1 - in-process, per-(user, org), TTL <= 60s, capped at 10k entries.
//   L2 - Redis, per-(user, org), TTL 300s.
// Both are invalidated via a version counter (`authz_ver:{user}:{org}`)
// rather than pub/sub, because `RedisPool` has no subscribe primitive. Every
// mutating RBAC operation bumps the counter for every affected (user, org)
// pair; cache keys embed the version, so a bump is an implicit eviction -
// stale entries simply age out under their TTL without being deleted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{kvs::keys, RedisPool};
use crate::models::org_member::{OrgMember, OrgMemberError};
use crate::services::audit::{self, AuditEvent};
use crate::utils::auth_errors::AppError;

const L1_TTL: Duration = Duration::from_secs(60);
const L1_MAX_ENTRIES: usize = 10_000;
const L2_TTL_SECONDS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheSource {
    L1,
    L2,
    Db,
}

impl CacheSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheSource::L1 => "l1",
            CacheSource::L2 => "l2",
            CacheSource::Db => "db",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthzDecision {
    pub granted: bool,
    pub reason: String,
    pub matched_groups: Vec<Uuid>,
    pub source: CacheSource,
}

/// Resource-scoped ACL hook. `authorize` calls this after the group/grant
/// resolution comes back positive for the family, so an owning resource can
/// still veto a specific instance (e.g. "member of the `billing:read` group,
/// but not assigned to *this* invoice"). No concrete resource table ships
/// with this crate; the no-op checker is what every resource uses until one
/// is registered.
#[async_trait]
pub trait ResourceAclChecker: Send + Sync {
    async fn check(
        &self,
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        org_id: Uuid,
        resource_id: &str,
    ) -> Result<bool, AppError>;
}

pub struct NoopAclChecker;

#[async_trait]
impl ResourceAclChecker for NoopAclChecker {
    async fn check(
        &self,
        _conn: &mut AsyncPgConnection,
        _user_id: Uuid,
        _org_id: Uuid,
        _resource_id: &str,
    ) -> Result<bool, AppError> {
        Ok(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PermissionSet {
    permission_names: Vec<String>,
    group_ids: Vec<Uuid>,
}

struct L1Entry {
    value: PermissionSet,
    inserted_at: Instant,
}

#[derive(Hash, PartialEq, Eq, Clone)]
struct L1Key {
    user_id: Uuid,
    org_id: Uuid,
    version: u64,
}

/// Small hand-rolled LRU. Kept deliberately simple - a few thousand entries
/// of a few dozen strings each, evicted by recency - rather than pulling in
/// a cache crate for something this bounded.
struct L1Cache {
    entries: HashMap<L1Key, L1Entry>,
    order: VecDeque<L1Key>,
}

impl L1Cache {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &L1Key) -> Option<PermissionSet> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() > L1_TTL {
            return None;
        }
        Some(entry.value.clone())
    }

    fn insert(&mut self, key: L1Key, value: PermissionSet) {
        if !self.entries.contains_key(&key) {
            self.order.push_back(key.clone());
            while self.order.len() > L1_MAX_ENTRIES {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.entries.insert(
            key,
            L1Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }
}

pub struct RbacService {
    redis_pool: RedisPool,
    l1: Arc<RwLock<L1Cache>>,
    acl_checkers: HashMap<String, Arc<dyn ResourceAclChecker>>,
    default_checker: Arc<dyn ResourceAclChecker>,
}

impl RbacService {
    pub fn new(redis_pool: RedisPool) -> Self {
        Self {
            redis_pool,
            l1: Arc::new(RwLock::new(L1Cache::new())),
            acl_checkers: HashMap::new(),
            default_checker: Arc::new(NoopAclChecker),
        }
    }

    pub fn with_acl_checker(mut self, resource: &str, checker: Arc<dyn ResourceAclChecker>) -> Self {
        self.acl_checkers.insert(resource.to_string(), checker);
        self
    }

    fn checker_for(&self, resource: &str) -> Arc<dyn ResourceAclChecker> {
        self.acl_checkers
            .get(resource)
            .cloned()
            .unwrap_or_else(|| self.default_checker.clone())
    }

    async fn current_version(&self, user_id: Uuid, org_id: Uuid) -> u64 {
        let key = keys::authz_version(&user_id.to_string(), &org_id.to_string());
        match self.redis_pool.get_string(&key).await {
            Ok(Some(v)) => v.parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Bumps the invalidation version for `(user, org)`. Call this for every
    /// user whose effective permissions could have changed: adding/removing
    /// an org member, adding/removing a group member, granting/revoking a
    /// group permission.
    pub async fn invalidate(&self, user_id: Uuid, org_id: Uuid) {
        let key = keys::authz_version(&user_id.to_string(), &org_id.to_string());
        if let Err(e) = self.redis_pool.incr_version(&key).await {
            tracing::warn!(error = %e, %user_id, %org_id, "failed to bump authz version");
        }
    }

    async fn resolve_permission_set(
        &self,
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<(PermissionSet, CacheSource), AppError> {
        let version = self.current_version(user_id, org_id).await;
        let l1_key = L1Key {
            user_id,
            org_id,
            version,
        };

        if let Some(cached) = self.l1.read().expect("l1 lock poisoned").get(&l1_key) {
            return Ok((cached, CacheSource::L1));
        }

        let l2_key = format!(
            "{}:{}",
            keys::authz_l2(&user_id.to_string(), &org_id.to_string()),
            version
        );
        if let Ok(Some(cached)) = self.redis_pool.get::<PermissionSet>(&l2_key).await {
            self.l1
                .write()
                .expect("l1 lock poisoned")
                .insert(l1_key, cached.clone());
            return Ok((cached, CacheSource::L2));
        }

        let computed = load_permission_set_from_db(conn, user_id, org_id).await?;

        if let Err(e) = self
            .redis_pool
            .set_with_expiry(&l2_key, &computed, L2_TTL_SECONDS)
            .await
        {
            tracing::warn!(error = %e, "failed to populate L2 authz cache");
        }
        self.l1
            .write()
            .expect("l1 lock poisoned")
            .insert(l1_key, computed.clone());

        Ok((computed, CacheSource::Db))
    }

    /// The sole entry point for authorization decisions. Always writes an
    /// audit row, win or lose.
    #[allow(clippy::too_many_arguments)]
    pub async fn authorize(
        &self,
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        org_id: Uuid,
        resource: &str,
        action: &str,
        resource_id: Option<&str>,
        correlation_id: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<AuthzDecision, AppError> {
        let decision = self
            .decide_with_retry(conn, user_id, org_id, resource, action, resource_id)
            .await;

        let event = AuditEvent {
            user_id: Some(user_id),
            org_id: Some(org_id),
            resource: resource.to_string(),
            action: action.to_string(),
            resource_id: resource_id.map(str::to_string),
            granted: decision.granted,
            reason: decision.reason.clone(),
            matched_group_ids: decision.matched_groups.clone(),
            cache_source: decision.source.as_str().to_string(),
            correlation_id: correlation_id.map(str::to_string),
            ip_address: ip_address.map(str::to_string),
            details: serde_json::json!({}),
        };
        if let Err(e) = audit::append(conn, event).await {
            tracing::error!(error = %e, "failed to write audit log entry for authorization decision");
        }

        Ok(decision)
    }

    /// Any decision that cannot be computed fails closed. A transient
    /// DB/Redis error gets one retry with jitter; if that also fails the
    /// call returns a `granted: false` decision rather than propagating the
    /// error, so `authorize` always has something to audit.
    #[allow(clippy::too_many_arguments)]
    async fn decide_with_retry(
        &self,
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        org_id: Uuid,
        resource: &str,
        action: &str,
        resource_id: Option<&str>,
    ) -> AuthzDecision {
        match self
            .decide(conn, user_id, org_id, resource, action, resource_id)
            .await
        {
            Ok(decision) => return decision,
            Err(e) => {
                tracing::warn!(error = %e, %user_id, %org_id, "authorization decision failed, retrying once");
            },
        }

        let jitter_ms = thread_rng().gen_range(25..150);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

        match self
            .decide(conn, user_id, org_id, resource, action, resource_id)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(error = %e, %user_id, %org_id, "authorization decision failed after retry, failing closed");
                AuthzDecision {
                    granted: false,
                    reason: "service_unavailable".to_string(),
                    matched_groups: vec![],
                    source: CacheSource::Db,
                }
            },
        }
    }

    /// Returns the full permission-name list a user currently holds in
    /// `org_id`, via the same cache tiers `authorize` uses. An empty vec
    /// for a non-member rather than an error - there's nothing to deny or
    /// audit about a plain catalog read.
    pub async fn permissions_for_user(
        &self,
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<Vec<String>, AppError> {
        match OrgMember::find(conn, org_id, user_id).await {
            Ok(_) => {},
            Err(OrgMemberError::NotAMember) => return Ok(vec![]),
            Err(e) => return Err(AppError::Internal(e.to_string())),
        }

        let (permission_set, _source) = self.resolve_permission_set(conn, user_id, org_id).await?;
        Ok(permission_set.permission_names)
    }

    async fn decide(
        &self,
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        org_id: Uuid,
        resource: &str,
        action: &str,
        resource_id: Option<&str>,
    ) -> Result<AuthzDecision, AppError> {
        match OrgMember::find(conn, org_id, user_id).await {
            Ok(_) => {},
            Err(OrgMemberError::NotAMember) => {
                return Ok(AuthzDecision {
                    granted: false,
                    reason: "not_a_member".to_string(),
                    matched_groups: vec![],
                    source: CacheSource::Db,
                })
            },
            Err(e) => return Err(AppError::Internal(e.to_string())),
        }

        let (permission_set, source) = self
            .resolve_permission_set(conn, user_id, org_id)
            .await?;

        let permission_name = format!("{}:{}", resource, action);
        if !permission_set.permission_names.iter().any(|p| p == &permission_name) {
            return Ok(AuthzDecision {
                granted: false,
                reason: "permission_not_granted".to_string(),
                matched_groups: vec![],
                source,
            });
        }

        if let Some(rid) = resource_id {
            let checker = self.checker_for(resource);
            let allowed = checker.check(conn, user_id, org_id, rid).await?;
            if !allowed {
                return Ok(AuthzDecision {
                    granted: false,
                    reason: "resource_acl_denied".to_string(),
                    matched_groups: permission_set.group_ids.clone(),
                    source,
                });
            }
        }

        Ok(AuthzDecision {
            granted: true,
            reason: "matched_group_grant".to_string(),
            matched_groups: permission_set.group_ids,
            source,
        })
    }
}

async fn load_permission_set_from_db(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    org_id: Uuid,
) -> Result<PermissionSet, AppError> {
    use crate::schema::{group_permissions, groups, permissions, user_groups};

    let rows: Vec<(Uuid, String, String)> = user_groups::table
        .inner_join(groups::table.on(groups::id.eq(user_groups::group_id)))
        .inner_join(group_permissions::table.on(group_permissions::group_id.eq(groups::id)))
        .inner_join(permissions::table.on(permissions::id.eq(group_permissions::permission_id)))
        .filter(user_groups::user_id.eq(user_id))
        .filter(groups::org_id.eq(org_id))
        .select((groups::id, permissions::resource, permissions::action))
        .load::<(Uuid, String, String)>(conn)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut group_ids = Vec::new();
    let mut permission_names = Vec::new();
    for (group_id, resource, action) in rows {
        if !group_ids.contains(&group_id) {
            group_ids.push(group_id);
        }
        let name = format!("{}:{}", resource, action);
        if !permission_names.contains(&name) {
            permission_names.push(name);
        }
    }

    Ok(PermissionSet {
        permission_names,
        group_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l1_cache_evicts_oldest_beyond_capacity() {
        let mut cache = L1Cache::new();
        for i in 0..3 {
            let key = L1Key {
                user_id: Uuid::new_v4(),
                org_id: Uuid::new_v4(),
                version: i,
            };
            cache.insert(
                key,
                PermissionSet {
                    permission_names: vec![],
                    group_ids: vec![],
                },
            );
        }
        assert_eq!(cache.order.len(), 3);
    }

    #[test]
    fn cache_source_strings_fit_varchar8_column() {
        assert!(CacheSource::L1.as_str().len() <= 8);
        assert!(CacheSource::L2.as_str().len() <= 8);
        assert!(CacheSource::Db.as_str().len() <= 8);
    }
}
