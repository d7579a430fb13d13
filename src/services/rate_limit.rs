// Redis-backed sliding window rate limiter, shared by login, registration,
// password reset and refresh-token endpoints.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::db::RedisPool;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Redis connection error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limit exceeded")]
    LimitExceeded,

    #[error("Invalid rate limit key")]
    InvalidKey,
}

/// Comprehensive rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the time window
    pub max_requests: u32,

    /// Time window in seconds
    pub window_seconds: u32,

    /// Optional burst limit (allows short bursts beyond normal limit)
    pub burst_limit: Option<u32>,

    /// Block duration in seconds when limit is exceeded
    pub block_duration: u32,

    /// Whether to enable distributed rate limiting
    pub distributed: bool,
}

impl RateLimitConfig {
    /// Login endpoint configuration (stricter limits)
    pub fn auth_endpoint() -> Self {
        Self {
            max_requests: 5,
            window_seconds: 900, // 15 minutes
            burst_limit: None,
            block_duration: 1800, // 30 minutes
            distributed: true,
        }
    }

    /// Registration endpoint configuration
    pub fn registration_endpoint() -> Self {
        Self {
            max_requests: 3,
            window_seconds: 3600, // 1 hour
            burst_limit: None,
            block_duration: 3600,
            distributed: true,
        }
    }

    /// Authorize/PDP endpoint - high volume, generous limits
    pub fn authorize_endpoint() -> Self {
        Self {
            max_requests: 10000,
            window_seconds: 60,
            burst_limit: Some(500),
            block_duration: 30,
            distributed: true,
        }
    }

    /// Default configuration for unspecified endpoints
    pub fn default_api() -> Self {
        Self {
            max_requests: 1000,
            window_seconds: 3600,
            burst_limit: Some(20),
            block_duration: 300,
            distributed: true,
        }
    }
}

/// Rate limit check result
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_time: u64,
    pub retry_after: Option<u32>,
    pub current_count: u32,
}

/// Per-subscription-tier overrides are not part of this system; every
/// principal shares the same limits. Kept as a type alias so call sites that
/// expect a tier string (for logging) don't need special-casing.
pub type SubscriptionLimits = RateLimitConfig;

/// High-performance rate limiting service with atomic Redis operations
pub struct RateLimitService {
    redis_pool: RedisPool,
    default_config: RateLimitConfig,
    endpoint_configs: HashMap<String, RateLimitConfig>,
}

impl RateLimitService {
    /// Create new rate limiting service with Redis backend
    pub fn new(redis_pool: RedisPool) -> Self {
        let mut endpoint_configs = HashMap::new();

        endpoint_configs.insert("/auth/login".to_string(), RateLimitConfig::auth_endpoint());
        endpoint_configs.insert(
            "/auth/register".to_string(),
            RateLimitConfig::registration_endpoint(),
        );
        endpoint_configs.insert(
            "/auth/authorize".to_string(),
            RateLimitConfig::authorize_endpoint(),
        );

        let default_config = RateLimitConfig::default_api();

        Self {
            redis_pool,
            default_config,
            endpoint_configs,
        }
    }

    /// Check rate limit with custom configuration
    pub async fn check_rate_limit_with_config(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError> {
        self.sliding_window_check(key, config).await
    }

    /// Check rate limit using atomic Redis Lua script
    #[instrument(skip(self), fields(key, endpoint))]
    pub async fn check_rate_limit(
        &self,
        key: &str,
        endpoint: &str,
    ) -> Result<RateLimitResult, RateLimitError> {
        let start_time = std::time::Instant::now();
        let config = self.get_config_for_endpoint(endpoint);

        let result = self.sliding_window_check(key, config).await?;

        let latency_ms = start_time.elapsed().as_millis() as u64;
        if latency_ms > 5 {
            warn!(
                "Rate limit check exceeded 5ms target: {}ms for key: {}",
                latency_ms, key
            );
        }

        Ok(result)
    }

    /// Atomic sliding window rate limiting with burst support using Lua script
    async fn sliding_window_check(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError> {
        let mut conn = self.redis_pool.get_connection().await?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;

        let window_start = now - (config.window_seconds as u64 * 1000);
        let window_key = format!("rate_limit:{}", key);

        // Atomic Lua script for sliding window with burst support
        let script = r#"
            local key = KEYS[1]
            local now = tonumber(ARGV[1])
            local window_start = tonumber(ARGV[2])
            local max_requests = tonumber(ARGV[3])
            local window_seconds = tonumber(ARGV[4])
            local burst_limit = tonumber(ARGV[5]) or max_requests
            local block_duration = tonumber(ARGV[6])

            redis.call('ZREMRANGEBYSCORE', key, '-inf', window_start)
            local current_count = redis.call('ZCARD', key)

            local block_key = key .. ':blocked'
            local is_blocked = redis.call('EXISTS', block_key)

            if is_blocked == 1 then
                local block_ttl = redis.call('TTL', block_key)
                return {0, 0, now + (window_seconds * 1000), block_ttl > 0 and block_ttl or block_duration, current_count}
            end

            local effective_limit = math.min(burst_limit, max_requests + (burst_limit - max_requests))
            local allowed = current_count < effective_limit

            if allowed then
                local rand = math.random(1000000)
                local request_id = now .. ':' .. rand
                redis.call('ZADD', key, now, request_id)
                current_count = current_count + 1
                local expire_at = now + (window_seconds * 1000)
                redis.call('PEXPIREAT', key, expire_at)
            else
                redis.call('SETEX', block_key, block_duration, '1')
            end

            local remaining = math.max(0, effective_limit - current_count)
            local reset_time = now + (window_seconds * 1000)
            local retry_after = allowed and 0 or block_duration

            return {allowed and 1 or 0, remaining, reset_time, retry_after, current_count}
        "#;

        let burst_limit = config.burst_limit.unwrap_or(config.max_requests);
        let result: Vec<u64> = redis::Script::new(script)
            .key(&window_key)
            .arg(now)
            .arg(window_start)
            .arg(config.max_requests)
            .arg(config.window_seconds)
            .arg(burst_limit)
            .arg(config.block_duration)
            .invoke_async(&mut conn)
            .await?;

        let allowed = result[0] == 1;
        let remaining = result[1] as u32;
        let reset_time = result[2] / 1000;
        let retry_after = if result[3] > 0 {
            Some(result[3] as u32)
        } else {
            None
        };
        let current_count = result[4] as u32;

        Ok(RateLimitResult {
            allowed,
            remaining,
            reset_time,
            retry_after,
            current_count,
        })
    }

    /// Get configuration for specific endpoint with fallback logic
    fn get_config_for_endpoint(&self, endpoint: &str) -> &RateLimitConfig {
        if let Some(config) = self.endpoint_configs.get(endpoint) {
            return config;
        }

        if endpoint.starts_with("/auth/") {
            if let Some(config) = self.endpoint_configs.get("/auth/login") {
                return config;
            }
        }

        &self.default_config
    }

    /// Check user-specific rate limit
    #[instrument(skip(self))]
    pub async fn check_user_rate_limit(
        &self,
        user_id: &str,
        endpoint: &str,
    ) -> Result<RateLimitResult, RateLimitError> {
        let key = format!("user:{}:{}", user_id, endpoint);
        self.sliding_window_check(&key, &self.default_config).await
    }

    /// Get rate limiting statistics for monitoring
    pub async fn get_statistics(&self) -> Result<HashMap<String, u64>, RateLimitError> {
        let mut conn = self.redis_pool.get_connection().await?;

        let mut stats = HashMap::new();
        let mut total_count: u64 = 0;
        let mut blocked_count: u64 = 0;

        let mut cursor = 0u64;
        loop {
            let result: redis::RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("rate_limit:*")
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await;

            match result {
                Ok((new_cursor, keys)) => {
                    for key in &keys {
                        if key.contains(":blocked") {
                            blocked_count += 1;
                        } else {
                            total_count += 1;
                        }
                    }
                    cursor = new_cursor;
                    if cursor == 0 {
                        break;
                    }
                },
                Err(e) => return Err(RateLimitError::Redis(e)),
            }
        }

        stats.insert("total_keys".to_string(), total_count);
        stats.insert("blocked_keys".to_string(), blocked_count);

        Ok(stats)
    }

    /// Clear rate limit for a specific key (admin function)
    pub async fn clear_rate_limit(&self, key: &str) -> Result<(), RateLimitError> {
        let mut conn = self.redis_pool.get_connection().await?;

        let window_key = format!("rate_limit:{}", key);
        let block_key = format!("{}:blocked", window_key);

        let _: () = conn.del(&[&window_key, &block_key]).await?;

        info!("Cleared rate limit for key: {}", key);
        Ok(())
    }
}
