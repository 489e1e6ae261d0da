//! Upstream transport.
//!
//! # Responsibilities
//! - Send a fully directed request to its upstream and return the response
//! - Bound every upstream call by the configured timeout
//! - Apply forwarding hygiene (hop-by-hop headers, X-Forwarded-For)
//!
//! # Design Decisions
//! - Transport errors are passed through, never retried
//! - Bodies are streamed in both directions, never buffered

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::error::{ProxyError, ProxyResult};
use crate::security::headers::{append_forwarded_for, strip_hop_by_hop};

/// Sends requests upstream.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, request: Request<Body>) -> ProxyResult<Response<Body>>;
}

/// Transport backed by the pooled hyper client.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HyperTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, timeout }
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn round_trip(&self, mut request: Request<Body>) -> ProxyResult<Response<Body>> {
        if request.uri().authority().is_none() {
            return Err(ProxyError::InvalidTarget(format!(
                "request for {} has no upstream host",
                request.uri()
            )));
        }

        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        let headers = request.headers_mut();
        strip_hop_by_hop(headers);
        if let Some(ip) = client_addr {
            append_forwarded_for(headers, ip);
        }

        let uri = request.uri().clone();
        tracing::debug!(upstream = %uri, method = %request.method(), "Forwarding request");

        let pending = self.client.request(request);
        let response: Response<Incoming> = match tokio::time::timeout(self.timeout, pending).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(upstream = %uri, error = %e, "Upstream error");
                return Err(ProxyError::Upstream(Box::new(e)));
            }
            Err(_) => {
                tracing::warn!(upstream = %uri, timeout = ?self.timeout, "Upstream timed out");
                return Err(ProxyError::UpstreamTimeout(self.timeout));
            }
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}
