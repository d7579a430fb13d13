// Typed key-value adapter in front of `RedisPool`. Callers never format Redis
// keys or TTLs by hand - they go through the key-family helpers below, which
// match the prefixes in the spec: `rt:`, `2fa:`, `2fa_session:`, `attempts:`,
// `rl:`, `authz_l2:`, `authz_ver:`.

use redis::{AsyncCommands, RedisError};
use serde::{de::DeserializeOwned, Serialize};

use super::redis_pool::RedisPool;

impl RedisPool {
    /// Fetch and deserialize a JSON value, if present.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RedisError> {
        let key = key.to_string();
        let raw: Option<String> = self
            .execute(|mut conn| async move {
                let v: Option<String> = conn.get(&key).await?;
                Ok((v, conn))
            })
            .await?;

        match raw {
            None => Ok(None),
            Some(s) => serde_json::from_str(&s).map(Some).map_err(|e| {
                RedisError::from((redis::ErrorKind::TypeError, "invalid JSON in KVS value", e.to_string()))
            }),
        }
    }

    /// Fetch a raw string value, if present (used for plain codes/tokens
    /// that are not JSON-encoded).
    pub async fn get_string(&self, key: &str) -> Result<Option<String>, RedisError> {
        let key = key.to_string();
        self.execute(|mut conn| async move {
            let v: Option<String> = conn.get(&key).await?;
            Ok((v, conn))
        })
        .await
    }

    /// Serialize `value` as JSON and store it with an expiry.
    pub async fn set_with_expiry<T: Serialize>(
        &self,
        key: &str,
        value: T,
        ttl_seconds: usize,
    ) -> Result<(), RedisError> {
        let key = key.to_string();
        let serialized = serde_json::to_string(&value).map_err(|e| {
            RedisError::from((redis::ErrorKind::TypeError, "value is not serializable", e.to_string()))
        })?;

        self.execute(|mut conn| async move {
            let _: () = conn.set_ex(&key, serialized, ttl_seconds as u64).await?;
            Ok(((), conn))
        })
        .await
    }

    pub async fn del(&self, key: &str) -> Result<(), RedisError> {
        let key = key.to_string();
        self.execute(|mut conn| async move {
            let _: () = conn.del(&key).await?;
            Ok(((), conn))
        })
        .await
    }

    /// Atomically increments a counter, setting its TTL on the first
    /// increment (when the counter is created). Returns the new count.
    pub async fn incr(&self, key: &str, ttl_seconds: usize) -> Result<u64, RedisError> {
        let key = key.to_string();
        self.execute(|mut conn| async move {
            let count: u64 = conn.incr(&key, 1u64).await?;
            if count == 1 {
                let _: () = conn.expire(&key, ttl_seconds as i64).await?;
            }
            Ok((count, conn))
        })
        .await
    }

    /// Bumps the RBAC invalidation version counter for `(user, org)`. No TTL:
    /// the counter lives as long as the pair has ever been resolved.
    pub async fn incr_version(&self, key: &str) -> Result<u64, RedisError> {
        let key = key.to_string();
        self.execute(|mut conn| async move {
            let v: u64 = conn.incr(&key, 1u64).await?;
            Ok((v, conn))
        })
        .await
    }

    /// Admin-only: scan for keys matching a prefix. Not used on request
    /// hot paths - `SCAN` is O(keyspace) and only acceptable for tooling.
    pub async fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<String>, RedisError> {
        let pattern = format!("{}*", prefix);
        self.execute(|mut conn| async move {
            let mut cursor = 0u64;
            let mut found = Vec::new();
            loop {
                let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(200)
                    .query_async(&mut conn)
                    .await?;
                found.extend(keys);
                cursor = next_cursor;
                if cursor == 0 {
                    break;
                }
            }
            Ok((found, conn))
        })
        .await
    }
}

/// Key-family constructors, so every caller builds keys the same way.
pub mod keys {
    pub fn refresh_token(jti: &str) -> String {
        format!("rt:{}", jti)
    }

    pub fn two_factor_code(user_id: &str, purpose: &str) -> String {
        format!("2fa:{}:{}", user_id, purpose)
    }

    pub fn two_factor_session(pending_token: &str) -> String {
        format!("2fa_session:{}", pending_token)
    }

    pub fn attempts(user_id: &str, purpose: &str) -> String {
        format!("attempts:{}:{}", user_id, purpose)
    }

    pub fn rate_limit(route: &str, principal: &str) -> String {
        format!("rl:{}:{}", route, principal)
    }

    pub fn authz_l2(user_id: &str, org_id: &str) -> String {
        format!("authz_l2:{}:{}", user_id, org_id)
    }

    pub fn authz_version(user_id: &str, org_id: &str) -> String {
        format!("authz_ver:{}:{}", user_id, org_id)
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn key_families_match_spec_prefixes() {
        assert_eq!(keys::refresh_token("abc"), "rt:abc");
        assert_eq!(keys::two_factor_code("u1", "login"), "2fa:u1:login");
        assert_eq!(keys::two_factor_session("tok"), "2fa_session:tok");
        assert_eq!(keys::attempts("u1", "login"), "attempts:u1:login");
        assert_eq!(keys::rate_limit("/auth/login", "u1"), "rl:/auth/login:u1");
        assert_eq!(keys::authz_l2("u1", "o1"), "authz_l2:u1:o1");
        assert_eq!(keys::authz_version("u1", "o1"), "authz_ver:u1:o1");
    }
}
