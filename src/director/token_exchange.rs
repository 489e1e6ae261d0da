//! Bearer token exchange.
//!
//! Replaces a long-lived opaque `Authorization: Bearer` token with the
//! short-lived signed token the exchanger hands back. Signature checks are
//! left to the upstream.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderValue};

use crate::director::{Director, ProxyRequest};
use crate::error::ProxyError;
use crate::security::token::TokenExchanger;

const BEARER: &str = "Bearer ";

pub struct TokenExchange {
    exchanger: Arc<dyn TokenExchanger>,
    required: bool,
}

impl TokenExchange {
    /// `required` decides whether a request without a bearer token is
    /// cancelled or passed through untouched.
    pub fn new(exchanger: Arc<dyn TokenExchanger>, required: bool) -> Self {
        Self {
            exchanger,
            required,
        }
    }
}

fn bearer_token(req: &ProxyRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Director for TokenExchange {
    async fn direct(&self, req: &mut ProxyRequest) {
        let Some(token) = bearer_token(req) else {
            if self.required {
                req.cancel(ProxyError::MissingToken);
            }
            return;
        };

        let signed = match self.exchanger.exchange(&token).await {
            Ok(signed) => signed,
            Err(e) => {
                tracing::debug!(error = %e, "Token exchange failed");
                req.cancel(ProxyError::TokenExchange(e.to_string()));
                return;
            }
        };

        match HeaderValue::from_str(&format!("{}{}", BEARER, signed)) {
            Ok(value) => {
                req.headers_mut().insert(AUTHORIZATION, value);
            }
            Err(_) => req.cancel(ProxyError::TokenExchange(
                "signed token is not a valid header value".into(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "token_exchange"
    }
}
