//! Upstream URL rewriting.
//!
//! # Responsibilities
//! - Parse an upstream target (scheme, host, path template, query)
//! - Apply it onto a request URI
//! - Suppress the default User-Agent when the client sent none
//!
//! # Rewrite Rules
//! - Scheme and authority replace the request's when the target has them
//! - A plain target path is joined in front of the request path
//!   (`/base` + `/dir` = `/base/dir`)
//! - A target path with `:name` or `*`/`+` segments is a template: variables
//!   come from the route match, the wildcard from the captured remainder
//! - Queries are joined with `&` when both sides have one
//! - The Host header is left untouched

use async_trait::async_trait;
use axum::http::{header::USER_AGENT, HeaderValue, Uri};
use url::Url;

use crate::director::{Director, ProxyRequest};
use crate::error::{ProxyError, ProxyResult};
use crate::routing::tree::{is_wildcard, split_segments};

/// Where a request should be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    scheme: Option<String>,
    authority: Option<String>,
    path: String,
    query: Option<String>,
}

impl UpstreamTarget {
    /// Parse an absolute URL (`http://host/base?q=1`) or a path-only
    /// template (`/v2/:id`).
    pub fn parse(target: &str) -> ProxyResult<Self> {
        if target.starts_with('/') {
            let (path, query) = match target.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (target, None),
            };
            return Ok(Self {
                scheme: None,
                authority: None,
                path: path.to_string(),
                query: query.filter(|q| !q.is_empty()).map(str::to_string),
            });
        }

        let url = Url::parse(target)
            .map_err(|e| ProxyError::InvalidTarget(format!("{}: {}", target, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ProxyError::InvalidTarget(format!("{}: missing host", target)))?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            scheme: Some(url.scheme().to_string()),
            authority: Some(authority),
            path: url.path().to_string(),
            query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn is_template(&self) -> bool {
        split_segments(&self.path)
            .iter()
            .any(|segment| segment.starts_with(':') || is_wildcard(segment))
    }

    fn expand(&self, req: &ProxyRequest) -> ProxyResult<String> {
        let mut expanded = Vec::new();
        for segment in split_segments(&self.path) {
            if is_wildcard(segment) {
                if let Some(rest) = req.wildcard().filter(|rest| !rest.is_empty()) {
                    expanded.push(rest.to_string());
                }
            } else if let Some(name) = segment.strip_prefix(':') {
                let value = req.variables().get(name).ok_or_else(|| {
                    ProxyError::InvalidTarget(format!("path variable :{} is not bound", name))
                })?;
                expanded.push(value.to_string());
            } else {
                expanded.push(segment.to_string());
            }
        }
        Ok(format!("/{}", expanded.join("/")))
    }

    /// Rewrite the request URI towards this target.
    pub fn rewrite(&self, req: &mut ProxyRequest) -> ProxyResult<()> {
        let incoming = req.uri().clone();

        let path = if self.is_template() {
            self.expand(req)?
        } else {
            single_joining_slash(&self.path, incoming.path())
        };

        let path_and_query = match merge_query(self.query.as_deref(), incoming.query()) {
            Some(query) => format!("{}?{}", path, query),
            None => path,
        };

        let mut builder = Uri::builder();
        if let Some(scheme) = self.scheme.as_deref().or(incoming.scheme_str()) {
            builder = builder.scheme(scheme);
        }
        if let Some(authority) = self
            .authority
            .as_deref()
            .or(incoming.authority().map(|a| a.as_str()))
        {
            builder = builder.authority(authority);
        }
        let uri = builder
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ProxyError::InvalidTarget(e.to_string()))?;

        tracing::trace!(from = %incoming, to = %uri, "Request rewritten");
        req.set_uri(uri);

        if !req.headers().contains_key(USER_AGENT) {
            // An empty value stops the client from sending its own default.
            req.headers_mut()
                .insert(USER_AGENT, HeaderValue::from_static(""));
        }
        Ok(())
    }
}

/// Join two paths with exactly one slash between them.
pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => format!("{}/{}", a, b),
        _ => format!("{}{}", a, b),
    }
}

/// Combine target and incoming query strings, target first.
pub fn merge_query(target: Option<&str>, incoming: Option<&str>) -> Option<String> {
    match (
        target.filter(|q| !q.is_empty()),
        incoming.filter(|q| !q.is_empty()),
    ) {
        (Some(t), Some(i)) => Some(format!("{}&{}", t, i)),
        (Some(q), None) | (None, Some(q)) => Some(q.to_string()),
        (None, None) => None,
    }
}

/// Director that sends every request to one upstream target.
#[derive(Debug, Clone)]
pub struct SingleHost {
    target: UpstreamTarget,
}

impl SingleHost {
    pub fn new(target: UpstreamTarget) -> Self {
        Self { target }
    }

    pub fn parse(target: &str) -> ProxyResult<Self> {
        UpstreamTarget::parse(target).map(Self::new)
    }

    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }
}

#[async_trait]
impl Director for SingleHost {
    async fn direct(&self, req: &mut ProxyRequest) {
        if let Err(e) = self.target.rewrite(req) {
            tracing::warn!(error = %e, path = %req.original_path(), "Upstream rewrite failed");
            req.cancel(e);
        }
    }

    fn name(&self) -> &'static str {
        "single_host"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::PathVariables;
    use axum::http::Request;

    fn request(uri: &str) -> ProxyRequest {
        ProxyRequest::from_request(Request::builder().uri(uri).body(()).unwrap()).0
    }

    #[test]
    fn test_base_path_and_query_merge() {
        let target = UpstreamTarget::parse("http://example.com/base?y=2").unwrap();
        let mut req = request("/dir?x=1");
        target.rewrite(&mut req).unwrap();

        assert_eq!(req.uri().to_string(), "http://example.com/base/dir?y=2&x=1");
    }

    #[test]
    fn test_user_agent_suppressed_only_when_absent() {
        let target = UpstreamTarget::parse("http://example.com").unwrap();

        let mut req = request("/");
        target.rewrite(&mut req).unwrap();
        assert_eq!(req.headers()[USER_AGENT], "");

        let mut req = request("/");
        req.headers_mut().insert(USER_AGENT, "curl/8".parse().unwrap());
        target.rewrite(&mut req).unwrap();
        assert_eq!(req.headers()[USER_AGENT], "curl/8");
    }

    #[test]
    fn test_template_substitutes_variables_and_wildcard() {
        let target = UpstreamTarget::parse("http://users.internal:8080/v2/:id/files/*").unwrap();
        let mut req = request("/users/42/docs/a/b.txt?raw=1");
        let vars: PathVariables = [("id", "42")].into_iter().collect();
        req.bind_route(vars, Some("a/b.txt".into()));

        target.rewrite(&mut req).unwrap();
        assert_eq!(
            req.uri().to_string(),
            "http://users.internal:8080/v2/42/files/a/b.txt?raw=1"
        );
    }

    #[test]
    fn test_unbound_variable_is_an_error() {
        let target = UpstreamTarget::parse("/v2/:id").unwrap();
        let mut req = request("/x");
        assert!(matches!(
            target.rewrite(&mut req),
            Err(ProxyError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_path_only_target_keeps_origin() {
        let target = UpstreamTarget::parse("/internal?debug=1").unwrap();
        let mut req = request("http://front.example/api");
        target.rewrite(&mut req).unwrap();
        assert_eq!(req.uri().to_string(), "http://front.example/internal/api?debug=1");
    }

    #[test]
    fn test_invalid_target() {
        assert!(UpstreamTarget::parse("not a url").is_err());
    }

    #[test]
    fn test_helpers() {
        assert_eq!(single_joining_slash("/a/", "/b"), "/a/b");
        assert_eq!(single_joining_slash("/a", "b"), "/a/b");
        assert_eq!(single_joining_slash("/a", "/b"), "/a/b");
        assert_eq!(merge_query(Some(""), Some("x=1")).as_deref(), Some("x=1"));
        assert_eq!(merge_query(None, None), None);
    }

    #[tokio::test]
    async fn test_single_host_cancels_on_bad_rewrite() {
        let director = SingleHost::parse("/v1/:missing").unwrap();
        let mut req = request("/anything");
        director.direct(&mut req).await;
        assert!(matches!(
            req.into_error(),
            Some(ProxyError::InvalidTarget(_))
        ));
    }
}
