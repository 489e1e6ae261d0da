//! Rate limiting director.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderName;

use crate::director::{Director, ProxyRequest};
use crate::observability::metrics;
use crate::security::rate_limit::{GroupRateLimiter, LimitOutcome};

/// Identity used when neither the header nor the peer address is known.
const ANONYMOUS: &str = "anonymous";

/// Where the rate-limit group of a request comes from.
#[derive(Debug, Clone)]
pub enum GroupSource {
    /// Always the same group.
    Fixed(String),
    /// A request header naming a configured group. Absent or unknown
    /// names fall back to `default`.
    Header { name: HeaderName, default: String },
}

/// Where the client identity of a request comes from.
#[derive(Debug, Clone)]
pub enum IdentitySource {
    /// The peer IP address.
    RemoteAddr,
    /// A request header, falling back to the peer IP address.
    Header(HeaderName),
}

/// Director that delays requests according to their group's policy.
pub struct RateLimitDirector {
    limiter: Arc<GroupRateLimiter>,
    group: GroupSource,
    identity: IdentitySource,
}

impl RateLimitDirector {
    pub fn new(limiter: Arc<GroupRateLimiter>, group: GroupSource, identity: IdentitySource) -> Self {
        Self {
            limiter,
            group,
            identity,
        }
    }

    fn group_of(&self, req: &ProxyRequest) -> String {
        match &self.group {
            GroupSource::Fixed(group) => group.clone(),
            GroupSource::Header { name, default } => req
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty() && self.limiter.group(v).is_some())
                .unwrap_or(default.as_str())
                .to_string(),
        }
    }

    fn identity_of(&self, req: &ProxyRequest) -> String {
        let from_header = match &self.identity {
            IdentitySource::Header(name) => req
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            IdentitySource::RemoteAddr => None,
        };

        from_header
            .or_else(|| req.remote_addr().map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }
}

#[async_trait]
impl Director for RateLimitDirector {
    async fn direct(&self, req: &mut ProxyRequest) {
        let group = self.group_of(req);
        let identity = self.identity_of(req);

        match self.limiter.limit(&group, &identity).await {
            Ok(LimitOutcome::Passed) => {}
            Ok(LimitOutcome::Throttled(_)) | Ok(LimitOutcome::TimedOut(_)) => {
                metrics::record_rate_limited(&group);
            }
            Err(e) => {
                tracing::warn!(group = %group, identity = %identity, error = %e, "Rate limit rejected request");
                req.cancel(e);
            }
        }
    }

    fn name(&self) -> &'static str {
        "rate_limit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxyError;
    use crate::security::rate_limit::{RateLimitPolicy, UnknownGroupPolicy};
    use axum::extract::ConnectInfo;
    use axum::http::Request;
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    fn request(headers: &[(&str, &str)]) -> ProxyRequest {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut req = builder.body(()).unwrap();
        let addr: SocketAddr = "10.0.0.7:5555".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        ProxyRequest::from_request(req).0
    }

    fn limiter() -> Arc<GroupRateLimiter> {
        limiter_with(UnknownGroupPolicy::Deny)
    }

    fn limiter_with(unknown: UnknownGroupPolicy) -> Arc<GroupRateLimiter> {
        let limiter = GroupRateLimiter::new(unknown);
        let policy = RateLimitPolicy::new(Duration::from_secs(5), 10, 1).unwrap();
        limiter.set_group("public", policy).unwrap();
        let policy = RateLimitPolicy::new(Duration::from_secs(5), 100, 50).unwrap();
        limiter.set_group("partners", policy).unwrap();
        Arc::new(limiter)
    }

    fn header_group() -> GroupSource {
        GroupSource::Header {
            name: HeaderName::from_static("x-rate-group"),
            default: "public".into(),
        }
    }

    #[test]
    fn test_identity_and_group_resolution() {
        let director = RateLimitDirector::new(
            limiter(),
            header_group(),
            IdentitySource::Header(HeaderName::from_static("x-api-key")),
        );

        let req = request(&[("x-api-key", "key-1"), ("x-rate-group", "partners")]);
        assert_eq!(director.identity_of(&req), "key-1");
        assert_eq!(director.group_of(&req), "partners");

        let req = request(&[]);
        assert_eq!(director.identity_of(&req), "10.0.0.7");
        assert_eq!(director.group_of(&req), "public");

        let req = request(&[("x-rate-group", "whatever")]);
        assert_eq!(director.group_of(&req), "public");
    }

    #[tokio::test]
    async fn test_unknown_header_group_is_still_throttled() {
        let director = RateLimitDirector::new(
            limiter_with(UnknownGroupPolicy::Allow),
            header_group(),
            IdentitySource::Header(HeaderName::from_static("x-api-key")),
        );

        let mut req = request(&[("x-api-key", "k"), ("x-rate-group", "whatever")]);
        director.direct(&mut req).await;

        let start = Instant::now();
        let mut req = request(&[("x-api-key", "k"), ("x-rate-group", "whatever")]);
        director.direct(&mut req).await;
        assert!(!req.is_cancelled());
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_unknown_group_cancels_when_denied() {
        let director = RateLimitDirector::new(
            limiter(),
            GroupSource::Fixed("missing".into()),
            IdentitySource::RemoteAddr,
        );

        let mut req = request(&[]);
        director.direct(&mut req).await;
        assert!(matches!(
            req.into_error(),
            Some(ProxyError::UnknownRateLimitGroup(_))
        ));
    }

    #[tokio::test]
    async fn test_second_request_is_delayed() {
        let director = RateLimitDirector::new(
            limiter(),
            GroupSource::Fixed("public".into()),
            IdentitySource::RemoteAddr,
        );

        let mut req = request(&[]);
        director.direct(&mut req).await;

        let start = Instant::now();
        let mut req = request(&[]);
        director.direct(&mut req).await;
        assert!(!req.is_cancelled());
        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
