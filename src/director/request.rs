//! Per-request state threaded through a director chain.
//!
//! # Responsibilities
//! - Hold the routing metadata directors may rewrite (method, URI, headers)
//! - Carry path variables bound by the router
//! - Carry the terminal cancellation state of the request
//!
//! # Design Decisions
//! - The body never enters a director; it stays with the forwarding boundary
//! - Cancellation is owned by the request, so it cannot leak to other requests
//! - Cancellation is write-once: the first reason wins

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{request::Parts, Extensions, HeaderMap, Method, Request, Uri};

use crate::error::{ProxyError, ProxyResult};

/// Variables bound from `:name` segments of a matched route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVariables(HashMap<String, String>);

impl PathVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Terminal failure state of a single request.
#[derive(Debug, Default)]
pub struct Cancellation {
    cancelled: bool,
    error: Option<ProxyError>,
}

impl Cancellation {
    /// Mark the request as cancelled. Returns false if it already was,
    /// in which case the new reason is dropped.
    pub fn cancel(&mut self, error: Option<ProxyError>) -> bool {
        if self.cancelled {
            return false;
        }
        self.cancelled = true;
        self.error = error;
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn error(&self) -> Option<&ProxyError> {
        self.error.as_ref()
    }

    /// The error to report at the boundary, `None` when not cancelled.
    /// A cancellation without a reason reports [`ProxyError::Cancelled`].
    pub fn into_error(self) -> Option<ProxyError> {
        self.cancelled
            .then(|| self.error.unwrap_or(ProxyError::Cancelled))
    }
}

/// The mutable view of an inbound request that directors operate on.
#[derive(Debug)]
pub struct ProxyRequest {
    parts: Parts,
    original_path: String,
    variables: PathVariables,
    remainder: Option<String>,
    cancellation: Cancellation,
}

impl ProxyRequest {
    pub fn new(parts: Parts) -> Self {
        let original_path = parts.uri.path().to_string();
        Self {
            parts,
            original_path,
            variables: PathVariables::default(),
            remainder: None,
            cancellation: Cancellation::default(),
        }
    }

    /// Split a request into the director view and its untouched body.
    pub fn from_request<B>(request: Request<B>) -> (Self, B) {
        let (parts, body) = request.into_parts();
        (Self::new(parts), body)
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.parts.method = method;
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn set_uri(&mut self, uri: Uri) {
        self.parts.uri = uri;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.parts.headers
    }

    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.parts.extensions
    }

    /// Peer address, present when the server was built with connect info.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0)
    }

    /// Path as it arrived, before any director rewrote the URI.
    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    pub fn variables(&self) -> &PathVariables {
        &self.variables
    }

    /// Path remainder captured by a wildcard route, if one matched.
    pub fn wildcard(&self) -> Option<&str> {
        self.remainder.as_deref()
    }

    /// Record the outcome of a route match.
    pub fn bind_route(&mut self, variables: PathVariables, remainder: Option<String>) {
        self.variables = variables;
        self.remainder = remainder;
    }

    /// Cancel the request with a specific reason.
    pub fn cancel(&mut self, error: ProxyError) {
        if !self.cancellation.cancel(Some(error)) {
            tracing::debug!(path = %self.original_path, "Request already cancelled, keeping first reason");
        }
    }

    /// Cancel the request without attaching a reason.
    pub fn terminate(&mut self) {
        self.cancellation.cancel(None);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Consume the request, returning its terminal error if it was cancelled.
    pub fn into_error(self) -> Option<ProxyError> {
        self.cancellation.into_error()
    }

    /// Reassemble the (possibly rewritten) request around its body, or
    /// return its terminal error.
    pub fn try_into_request<B>(self, body: B) -> ProxyResult<Request<B>> {
        match self.cancellation.into_error() {
            Some(error) => Err(error),
            None => Ok(Request::from_parts(self.parts, body)),
        }
    }
}
