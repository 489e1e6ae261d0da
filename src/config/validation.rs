//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing rate-limit groups)
//! - Validate value ranges (timeouts > 0, rates > 0)
//! - Detect conflicting routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use axum::http::HeaderName;

use crate::config::schema::ProxyConfig;
use crate::director::UpstreamTarget;
use crate::routing::tree::{is_wildcard, split_segments};

/// A single semantic problem, tagged with the config field it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed config for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than zero"));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new("timeouts.upstream_secs", "must be greater than zero"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("'{}' is not a socket address", config.admin.bind_address),
            ));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if config.correlation.enabled {
        check_header(&mut errors, "correlation.header", &config.correlation.header);
        if config.correlation.token_length == 0 {
            errors.push(ValidationError::new("correlation.token_length", "must be greater than zero"));
        }
    }

    let groups = validate_rate_limit(config, &mut errors);
    validate_routes(config, &groups, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_header(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if HeaderName::from_bytes(value.as_bytes()).is_err() {
        errors.push(ValidationError::new(field, format!("'{}' is not a valid header name", value)));
    }
}

/// Validates rate-limit groups and returns the set of defined names.
fn validate_rate_limit<'a>(
    config: &'a ProxyConfig,
    errors: &mut Vec<ValidationError>,
) -> HashSet<&'a str> {
    let rate_limit = &config.rate_limit;
    let mut names = HashSet::new();

    for (i, group) in rate_limit.groups.iter().enumerate() {
        let field = format!("rate_limit.groups[{}]", i);
        if group.name.is_empty() {
            errors.push(ValidationError::new(&field, "name must not be empty"));
        } else if !names.insert(group.name.as_str()) {
            errors.push(ValidationError::new(&field, format!("duplicate group '{}'", group.name)));
        }
        if group.max_rps == 0 {
            errors.push(ValidationError::new(&field, "max_rps must be greater than zero"));
        }
        if group.burst == 0 {
            errors.push(ValidationError::new(&field, "burst must be greater than zero"));
        }
        if group.expiration_secs == 0 {
            errors.push(ValidationError::new(&field, "expiration_secs must be greater than zero"));
        }
    }

    if rate_limit.enabled {
        if let Some(header) = &rate_limit.identity_header {
            check_header(errors, "rate_limit.identity_header", header);
        }
        if let Some(header) = &rate_limit.group_header {
            check_header(errors, "rate_limit.group_header", header);
        }
        // a throttled request must reach the limiter's own cap before the request timeout
        if let Some(longest) = rate_limit.groups.iter().map(|g| g.expiration_secs).max() {
            if config.timeouts.request_secs <= longest {
                errors.push(ValidationError::new(
                    "timeouts.request_secs",
                    format!("must exceed the longest rate limit expiration ({}s)", longest),
                ));
            }
        }
    }

    names
}

fn validate_routes(config: &ProxyConfig, groups: &HashSet<&str>, errors: &mut Vec<ValidationError>) {
    let mut patterns = HashSet::new();

    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{}]", i);
        let segments = split_segments(&route.pattern);

        if route.pattern.trim().is_empty() {
            errors.push(ValidationError::new(&field, "pattern must not be empty"));
        }
        // "/a/" and "/a" are the same pattern once split
        if !patterns.insert(segments.join("/")) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate pattern '{}'", route.pattern),
            ));
        }
        if let Some(pos) = segments.iter().position(|s| is_wildcard(s)) {
            if pos + 1 != segments.len() {
                errors.push(ValidationError::new(
                    &field,
                    format!("wildcard must be the last segment of '{}'", route.pattern),
                ));
            }
        }
        if segments.iter().any(|s| *s == ":") {
            errors.push(ValidationError::new(&field, "variable segment needs a name"));
        }

        if let Err(e) = UpstreamTarget::parse(&route.upstream) {
            errors.push(ValidationError::new(&field, e.to_string()));
        }

        if let Some(group) = &route.rate_limit_group {
            if !groups.contains(group.as_str()) {
                errors.push(ValidationError::new(
                    &field,
                    format!("unknown rate limit group '{}'", group),
                ));
            }
        }
    }
}
