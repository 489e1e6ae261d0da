//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::security::rate_limit::UnknownGroupPolicy;

/// Root configuration for the reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route patterns mapped to upstream targets.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Correlation ID tagging.
    pub correlation: CorrelationConfig,

    /// Bearer token exchange.
    pub token_exchange: TokenExchangeConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A route pattern and where matching requests go.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path pattern (`/users/:id`, `/static/*`).
    pub pattern: String,

    /// Upstream target, absolute URL or path template.
    pub upstream: String,

    /// Rate-limit group applied to this route only.
    #[serde(default)]
    pub rate_limit_group: Option<String>,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Upstream call timeout in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_secs: 15,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Correlation ID configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub enabled: bool,

    /// Header the token is written to.
    pub header: String,

    /// Token length in characters.
    pub token_length: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header: "x-correlation-id".to_string(),
            token_length: 16,
        }
    }
}

/// Bearer token exchange configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TokenExchangeConfig {
    pub enabled: bool,

    /// Reject requests that carry no bearer token.
    pub required: bool,

    /// Public token to signed token pairs served by the in-memory store.
    pub tokens: HashMap<String, String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Header carrying the client identity; the peer IP is used otherwise.
    pub identity_header: Option<String>,

    /// Header selecting the group; `default_group` is used otherwise.
    pub group_header: Option<String>,

    /// Group applied when the request names none.
    pub default_group: String,

    /// What to do when a request names a group that does not exist.
    pub unknown_group: UnknownGroupPolicy,

    /// Group definitions.
    pub groups: Vec<RateLimitGroupConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            identity_header: None,
            group_header: None,
            default_group: "default".to_string(),
            unknown_group: UnknownGroupPolicy::Allow,
            groups: Vec::new(),
        }
    }
}

/// One named rate-limit policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitGroupConfig {
    pub name: String,

    /// Sustained requests per second per identity.
    pub max_rps: u32,

    /// Requests absorbed without waiting.
    pub burst: u32,

    /// Idle seconds before an identity's state is dropped.
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u64,
}

impl RateLimitGroupConfig {
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }
}

fn default_expiration_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.correlation.token_length, 16);
        assert_eq!(config.rate_limit.unknown_group, UnknownGroupPolicy::Allow);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let raw = r#"
            [observability]
            log_format = "json"

            [token_exchange]
            enabled = true
            tokens = { opaque = "signed" }

            [rate_limit]
            enabled = true
            group_header = "x-rate-group"
            unknown_group = "deny"

            [[rate_limit.groups]]
            name = "default"
            max_rps = 10
            burst = 5

            [[routes]]
            pattern = "/users/:id"
            upstream = "http://users.internal/v1/:id"
            rate_limit_group = "default"
        "#;

        let config: ProxyConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.token_exchange.tokens["opaque"], "signed");
        assert_eq!(config.rate_limit.unknown_group, UnknownGroupPolicy::Deny);
        assert_eq!(config.rate_limit.groups[0].expiration(), Duration::from_secs(60));
        assert_eq!(config.routes[0].rate_limit_group.as_deref(), Some("default"));
    }
}
