// Centralized rate limiting configuration: endpoint-specific overrides plus
// global emergency whitelist/blacklist. Limits are keyed by route + principal
// (`rl:{route}:{principal}`) rather than by subscription tier - there is no
// subscription concept in this domain.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::services::rate_limit::RateLimitConfig;

/// Global rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Default configuration for unspecified endpoints
    pub default: RateLimitConfig,

    /// Endpoint-specific configurations
    pub endpoints: HashMap<String, RateLimitConfig>,

    /// Global settings
    pub global: GlobalRateLimitSettings,
}

/// Global rate limiting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalRateLimitSettings {
    pub distributed: bool,
    pub default_block_duration: u32,
    pub monitoring: MonitoringSettings,
    pub emergency: EmergencySettings,
}

/// Monitoring configuration for rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSettings {
    pub enable_metrics: bool,
    pub latency_warning_threshold_ms: u64,
    pub enable_analytics: bool,
    pub analytics_sample_rate: f64,
}

/// Emergency rate limiting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencySettings {
    pub emergency_limit: Option<u32>,
    pub emergency_window: u32,
    pub whitelist_ips: Vec<String>,
    pub blacklist_ips: Vec<String>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        let mut endpoints = HashMap::new();

        endpoints.insert(
            "/auth/login".to_string(),
            RateLimitConfig {
                max_requests: 5,
                window_seconds: 900,
                burst_limit: None,
                block_duration: 1800,
                distributed: true,
            },
        );

        endpoints.insert(
            "/auth/register".to_string(),
            RateLimitConfig {
                max_requests: 3,
                window_seconds: 3600,
                burst_limit: None,
                block_duration: 3600,
                distributed: true,
            },
        );

        endpoints.insert(
            "/auth/refresh".to_string(),
            RateLimitConfig {
                max_requests: 10,
                window_seconds: 300,
                burst_limit: Some(3),
                block_duration: 300,
                distributed: true,
            },
        );

        endpoints.insert(
            "/auth/verify-code".to_string(),
            RateLimitConfig {
                max_requests: 10,
                window_seconds: 300,
                burst_limit: Some(3),
                block_duration: 300,
                distributed: true,
            },
        );

        endpoints.insert(
            "/auth/password-reset".to_string(),
            RateLimitConfig {
                max_requests: 5,
                window_seconds: 3600,
                burst_limit: None,
                block_duration: 1800,
                distributed: true,
            },
        );

        endpoints.insert(
            "/auth/authorize".to_string(),
            RateLimitConfig {
                max_requests: 10000,
                window_seconds: 60,
                burst_limit: Some(200),
                block_duration: 30,
                distributed: true,
            },
        );

        endpoints.insert(
            "/admin/*".to_string(),
            RateLimitConfig {
                max_requests: 500,
                window_seconds: 3600,
                burst_limit: Some(50),
                block_duration: 300,
                distributed: true,
            },
        );

        endpoints.insert(
            "/health".to_string(),
            RateLimitConfig {
                max_requests: 1_000_000,
                window_seconds: 60,
                burst_limit: None,
                block_duration: 0,
                distributed: false,
            },
        );

        let default = RateLimitConfig {
            max_requests: 1000,
            window_seconds: 3600,
            burst_limit: Some(20),
            block_duration: 300,
            distributed: true,
        };

        let global = GlobalRateLimitSettings {
            distributed: true,
            default_block_duration: 300,
            monitoring: MonitoringSettings {
                enable_metrics: true,
                latency_warning_threshold_ms: 5,
                enable_analytics: true,
                analytics_sample_rate: 1.0,
            },
            emergency: EmergencySettings {
                emergency_limit: None,
                emergency_window: 60,
                whitelist_ips: vec!["127.0.0.1".to_string(), "::1".to_string()],
                blacklist_ips: vec![],
            },
        };

        Self {
            default,
            endpoints,
            global,
        }
    }
}

impl RateLimitingConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Get configuration for a specific endpoint, honoring `/*` wildcard
    /// prefixes before falling back to the default.
    pub fn get_endpoint_config(&self, endpoint: &str) -> &RateLimitConfig {
        if let Some(config) = self.endpoints.get(endpoint) {
            return config;
        }

        for (pattern, config) in &self.endpoints {
            if pattern.ends_with("/*") {
                let prefix = &pattern[..pattern.len() - 2];
                if endpoint.starts_with(prefix) {
                    return config;
                }
            }
        }

        &self.default
    }

    pub fn is_whitelisted_ip(&self, ip: &str) -> bool {
        self.global
            .emergency
            .whitelist_ips
            .contains(&ip.to_string())
    }

    pub fn is_blacklisted_ip(&self, ip: &str) -> bool {
        self.global
            .emergency
            .blacklist_ips
            .contains(&ip.to_string())
    }

    pub fn get_emergency_limit(&self) -> Option<u32> {
        self.global.emergency.emergency_limit
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.default.max_requests == 0 {
            return Err("Default max_requests cannot be zero".to_string());
        }

        if self.default.window_seconds == 0 {
            return Err("Default window_seconds cannot be zero".to_string());
        }

        for (endpoint, config) in &self.endpoints {
            if config.max_requests == 0 {
                return Err(format!("Endpoint {} max_requests cannot be zero", endpoint));
            }

            if config.window_seconds == 0 {
                return Err(format!(
                    "Endpoint {} window_seconds cannot be zero",
                    endpoint
                ));
            }

            if let Some(burst) = config.burst_limit {
                if burst == 0 {
                    return Err(format!("Endpoint {} burst_limit cannot be zero", endpoint));
                }
            }
        }

        if self.global.monitoring.analytics_sample_rate < 0.0
            || self.global.monitoring.analytics_sample_rate > 1.0
        {
            return Err("Analytics sample rate must be between 0.0 and 1.0".to_string());
        }

        Ok(())
    }
}
