//! Correlation ID tagging.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};

use crate::director::{Director, ProxyRequest};
use crate::security::token::TokenIssuer;

pub const X_CORRELATION_ID: &str = "x-correlation-id";

/// Director that stamps each request with a fresh random token.
pub struct Correlation {
    issuer: Arc<dyn TokenIssuer>,
    header: HeaderName,
    length: usize,
}

impl Correlation {
    pub fn new(issuer: Arc<dyn TokenIssuer>, header: HeaderName, length: usize) -> Self {
        Self {
            issuer,
            header,
            length,
        }
    }
}

#[async_trait]
impl Director for Correlation {
    async fn direct(&self, req: &mut ProxyRequest) {
        let token = match self.issuer.issue(self.length) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to issue correlation token");
                return;
            }
        };

        match HeaderValue::from_str(&token) {
            Ok(value) => {
                req.headers_mut().insert(self.header.clone(), value);
            }
            Err(e) => tracing::warn!(error = %e, "Correlation token is not a valid header value"),
        }
    }

    fn name(&self) -> &'static str {
        "correlation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::token::{RandomTokenIssuer, TokenError};
    use axum::http::Request;

    struct FailingIssuer;

    impl TokenIssuer for FailingIssuer {
        fn issue(&self, _length: usize) -> Result<String, TokenError> {
            Err(TokenError::Entropy("exhausted".into()))
        }
    }

    fn request() -> ProxyRequest {
        let req = Request::builder()
            .uri("/")
            .header(X_CORRELATION_ID, "from-client")
            .body(())
            .unwrap();
        ProxyRequest::from_request(req).0
    }

    #[tokio::test]
    async fn test_sets_fresh_token() {
        let director = Correlation::new(
            Arc::new(RandomTokenIssuer),
            HeaderName::from_static(X_CORRELATION_ID),
            16,
        );

        let mut req = request();
        director.direct(&mut req).await;

        let value = req.headers()[X_CORRELATION_ID].to_str().unwrap();
        assert_eq!(value.len(), 16);
        assert_ne!(value, "from-client");
    }

    #[tokio::test]
    async fn test_issue_failure_does_not_cancel() {
        let director = Correlation::new(
            Arc::new(FailingIssuer),
            HeaderName::from_static(X_CORRELATION_ID),
            16,
        );

        let mut req = request();
        director.direct(&mut req).await;
        assert!(!req.is_cancelled());
        assert_eq!(req.headers()[X_CORRELATION_ID], "from-client");
    }
}
