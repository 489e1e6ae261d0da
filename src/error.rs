//! Error definitions shared by directors, the limiter and the forwarding boundary.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Boxed error used for transport failures we pass through untouched.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while building or running the director pipeline.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Invalid setup (missing director, bad rate-limit parameters).
    /// Only ever produced at startup or registration time.
    #[error("construction error: {0}")]
    Construction(String),

    /// No route in the tree matched the request path.
    #[error("no route matches path {path}")]
    RouteNotFound { path: String },

    /// The request was cancelled without a more specific reason.
    #[error("request terminated")]
    Cancelled,

    /// Rate limiting was requested for a group that does not exist and the
    /// limiter is configured to deny such lookups.
    #[error("rate limit group {0} is not configured")]
    UnknownRateLimitGroup(String),

    /// A bearer token was required but the request carried none.
    #[error("missing bearer token")]
    MissingToken,

    /// The opaque token could not be exchanged for a signed one.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The upstream target could not be applied to the request URL.
    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),

    /// The upstream call itself failed.
    #[error("upstream request failed: {0}")]
    Upstream(#[source] BoxError),

    /// The upstream did not answer in time.
    #[error("upstream timed out after {0:?}")]
    UpstreamTimeout(Duration),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    /// HTTP status used when this error terminates a request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            ProxyError::UnknownRateLimitGroup(_) => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::MissingToken | ProxyError::TokenExchange(_) => StatusCode::UNAUTHORIZED,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::InvalidTarget(_) | ProxyError::Cancelled | ProxyError::Upstream(_) => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::Construction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Construction(_) => "construction",
            ProxyError::RouteNotFound { .. } => "route_not_found",
            ProxyError::Cancelled => "cancelled",
            ProxyError::UnknownRateLimitGroup(_) => "unknown_rate_limit_group",
            ProxyError::MissingToken => "missing_token",
            ProxyError::TokenExchange(_) => "token_exchange",
            ProxyError::InvalidTarget(_) => "invalid_target",
            ProxyError::Upstream(_) => "upstream",
            ProxyError::UpstreamTimeout(_) => "upstream_timeout",
        }
    }
}
