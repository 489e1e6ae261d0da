//! Route lookup and dispatch.

use std::sync::Arc;

use async_trait::async_trait;

use crate::director::{Director, ProxyRequest};
use crate::error::ProxyError;
use crate::routing::tree::RouteTree;

/// Director that dispatches to the director registered for the request path.
pub struct RouterDirector {
    tree: RouteTree<Arc<dyn Director>>,
}

impl RouterDirector {
    pub fn new<I, P>(routes: I) -> Self
    where
        I: IntoIterator<Item = (P, Arc<dyn Director>)>,
        P: Into<String>,
    {
        let tree = RouteTree::build(routes);
        tracing::debug!(routes = tree.len(), "Route tree built");
        Self { tree }
    }

    pub fn tree(&self) -> &RouteTree<Arc<dyn Director>> {
        &self.tree
    }
}

#[async_trait]
impl Director for RouterDirector {
    async fn direct(&self, req: &mut ProxyRequest) {
        let path = req.uri().path().to_string();
        match self.tree.find(&path) {
            Some(found) => {
                req.bind_route(found.variables, found.remainder);
                found.value.direct(req).await;
            }
            None => {
                tracing::debug!(path = %path, "No route matched");
                req.cancel(ProxyError::RouteNotFound { path });
            }
        }
    }

    fn name(&self) -> &'static str {
        "router"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::from_fn;
    use axum::http::Request;

    fn request(uri: &str) -> ProxyRequest {
        ProxyRequest::from_request(Request::builder().uri(uri).body(()).unwrap()).0
    }

    fn tag(value: &'static str) -> Arc<dyn Director> {
        Arc::new(from_fn(move |req: &mut ProxyRequest| {
            req.headers_mut().insert("x-route", value.parse().unwrap());
        }))
    }

    #[tokio::test]
    async fn test_dispatch_binds_variables() {
        let router = RouterDirector::new(vec![
            ("/users/:id", tag("user")),
            ("/files/*", tag("files")),
        ]);

        let mut req = request("/users/42?full=1");
        router.direct(&mut req).await;
        assert!(!req.is_cancelled());
        assert_eq!(req.headers()["x-route"], "user");
        assert_eq!(req.variables().get("id"), Some("42"));

        let mut req = request("/files/a/b.txt");
        router.direct(&mut req).await;
        assert_eq!(req.headers()["x-route"], "files");
        assert_eq!(req.wildcard(), Some("a/b.txt"));
    }

    #[tokio::test]
    async fn test_miss_cancels_with_not_found() {
        let router = RouterDirector::new(vec![("/a/b", tag("ab"))]);

        let mut req = request("/a");
        router.direct(&mut req).await;
        match req.into_error() {
            Some(ProxyError::RouteNotFound { path }) => assert_eq!(path, "/a"),
            other => panic!("expected not found, got {:?}", other),
        }
    }
}
