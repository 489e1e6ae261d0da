//! The forwarding boundary.
//!
//! # Responsibilities
//! - Run the active director chain against each inbound request
//! - Forward uncancelled requests through the transport exactly once
//! - Turn a cancellation into the error it carries, without forwarding
//! - Swap the chain atomically on reload or dynamic registration
//!
//! # Design Decisions
//! - Each request loads the chain once; a swap never affects requests
//!   already running
//! - The configured chain and dynamically added directors are kept apart,
//!   so a config reload does not drop dynamic directors

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::routing::MethodRouter;
use axum::Router;

use crate::director::{Chain, Director, ProxyRequest};
use crate::error::{ProxyError, ProxyResult};
use crate::http::transport::Transport;
use crate::observability::metrics;

#[derive(Default)]
struct ChainLayout {
    /// Chain built from configuration.
    base: Chain,
    /// Directors appended at runtime, in registration order.
    extras: Vec<Arc<dyn Director>>,
    /// Handlers registered alongside dynamic directors.
    routes: Vec<(String, MethodRouter)>,
}

impl ChainLayout {
    fn compose(&self) -> Chain {
        self.extras
            .iter()
            .fold(self.base.clone(), |chain, director| chain.appended(director.clone()))
    }
}

/// Build the dynamic router, turning axum's panic on a conflicting or
/// malformed path into an error.
fn build_router(routes: &[(String, MethodRouter)]) -> ProxyResult<Router> {
    panic::catch_unwind(AssertUnwindSafe(|| {
        routes
            .iter()
            .fold(Router::new(), |router, (path, handler)| router.route(path, handler.clone()))
    }))
    .map_err(|payload| {
        let reason = payload
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| payload.downcast_ref::<&str>().copied())
            .unwrap_or("invalid route");
        ProxyError::Construction(reason.to_string())
    })
}

/// Owns the active chain and the upstream transport.
pub struct ProxyCore {
    active: ArcSwap<Chain>,
    dynamic_router: ArcSwap<Router>,
    layout: Mutex<ChainLayout>,
    transport: Arc<dyn Transport>,
}

impl ProxyCore {
    pub fn new(chain: Chain, transport: Arc<dyn Transport>) -> Self {
        Self {
            active: ArcSwap::from_pointee(chain.clone()),
            dynamic_router: ArcSwap::from_pointee(Router::new()),
            layout: Mutex::new(ChainLayout {
                base: chain,
                ..ChainLayout::default()
            }),
            transport,
        }
    }

    /// Direct the request and forward it, or return the cancellation error.
    pub async fn handle(&self, request: Request<Body>) -> ProxyResult<Response<Body>> {
        let chain = self.active.load_full();
        let (mut req, body) = ProxyRequest::from_request(request);

        chain.direct(&mut req).await;

        match req.try_into_request(body) {
            Ok(request) => self.transport.round_trip(request).await,
            Err(error) => {
                tracing::debug!(reason = error.kind(), error = %error, "Request cancelled before forwarding");
                metrics::record_cancelled(error.kind());
                Err(error)
            }
        }
    }

    /// The chain new requests will run.
    pub fn chain(&self) -> Arc<Chain> {
        self.active.load_full()
    }

    /// Replace the configured part of the chain. Dynamic directors stay
    /// appended after it.
    pub fn reload(&self, base: Chain) {
        let mut layout = self.layout.lock().unwrap_or_else(PoisonError::into_inner);
        layout.base = base;
        self.active.store(Arc::new(layout.compose()));
        tracing::info!(chain = ?layout.base, dynamic = layout.extras.len(), "Director chain reloaded");
    }

    /// Append a director to the active chain.
    pub fn add_director(&self, director: Arc<dyn Director>) {
        let mut layout = self.layout.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(director = director.name(), "Director appended");
        layout.extras.push(director);
        self.active.store(Arc::new(layout.compose()));
    }

    /// Bind `handler` at `path` on the admin surface and append `director`.
    ///
    /// Fails without changing anything if the path is malformed, taken or
    /// conflicts with a registered capture.
    pub fn add_dynamic_director(
        &self,
        path: &str,
        handler: MethodRouter,
        director: Arc<dyn Director>,
    ) -> ProxyResult<()> {
        if !path.starts_with('/') {
            return Err(ProxyError::Construction(format!("path '{}' must start with '/'", path)));
        }
        if path
            .split('/')
            .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
        {
            return Err(ProxyError::Construction(format!(
                "path '{}' must use {{name}} captures",
                path
            )));
        }

        let mut layout = self.layout.lock().unwrap_or_else(PoisonError::into_inner);
        if layout.routes.iter().any(|(existing, _)| existing == path) {
            return Err(ProxyError::Construction(format!("path '{}' is already registered", path)));
        }

        let mut routes = layout.routes.clone();
        routes.push((path.to_string(), handler));
        let router = build_router(&routes)?;

        layout.routes = routes;
        layout.extras.push(director);
        self.dynamic_router.store(Arc::new(router));
        self.active.store(Arc::new(layout.compose()));
        tracing::info!(path = %path, "Dynamic director registered");
        Ok(())
    }

    /// Router serving the handlers registered via [`Self::add_dynamic_director`].
    pub fn dynamic_router(&self) -> Router {
        Router::clone(&self.dynamic_router.load())
    }

    pub fn dynamic_paths(&self) -> Vec<String> {
        self.layout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .routes
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::{from_fn, SingleHost};
    use crate::routing::RouterDirector;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and records the URIs it was asked to send.
    #[derive(Default)]
    struct StubTransport {
        calls: AtomicUsize,
        uris: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn round_trip(&self, request: Request<Body>) -> ProxyResult<Response<Body>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.uris.lock().unwrap().push(request.uri().to_string());
            Ok(Response::new(Body::from("ok")))
        }
    }

    fn routed_chain() -> Chain {
        let upstream: Arc<dyn Director> = Arc::new(SingleHost::parse("http://example.com/base").unwrap());
        let router: Arc<dyn Director> = Arc::new(RouterDirector::new([("/dir", upstream)]));
        Chain::new(vec![router])
    }

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_rewritten_request_once() {
        let transport = Arc::new(StubTransport::default());
        let core = ProxyCore::new(routed_chain(), transport.clone());

        let response = core.handle(request("/dir?x=1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            transport.uris.lock().unwrap().as_slice(),
            ["http://example.com/base/dir?x=1"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_request_never_reaches_transport() {
        let transport = Arc::new(StubTransport::default());
        let core = ProxyCore::new(routed_chain(), transport.clone());

        let err = core.handle(request("/missing")).await.unwrap_err();
        assert!(matches!(err, ProxyError::RouteNotFound { .. }));

        let silent: Arc<dyn Director> = Arc::new(from_fn(|req: &mut ProxyRequest| req.terminate()));
        core.reload(Chain::new(vec![silent]));
        let err = core.handle(request("/dir")).await.unwrap_err();
        assert!(matches!(err, ProxyError::Cancelled));

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_added_directors_survive_reload() {
        let transport = Arc::new(StubTransport::default());
        let core = ProxyCore::new(Chain::default(), transport);

        let tag: Arc<dyn Director> = Arc::new(from_fn(|req: &mut ProxyRequest| {
            req.headers_mut().insert("x-tag", "1".parse().unwrap());
        }));
        core.add_director(tag);
        assert_eq!(core.chain().len(), 1);

        core.reload(routed_chain());
        assert_eq!(core.chain().names(), vec!["router", "fn"]);
    }

    #[tokio::test]
    async fn test_in_flight_chain_is_unaffected_by_swap() {
        let core = ProxyCore::new(routed_chain(), Arc::new(StubTransport::default()));
        let captured = core.chain();

        core.reload(Chain::default());
        assert_eq!(captured.len(), 1);
        assert!(core.chain().is_empty());
    }

    #[tokio::test]
    async fn test_dynamic_director_registration() {
        let core = ProxyCore::new(Chain::default(), Arc::new(StubTransport::default()));
        let noop: Arc<dyn Director> = Arc::new(from_fn(|_req: &mut ProxyRequest| {}));

        core.add_dynamic_director("/hooks/tag", get(|| async { "tagged" }), noop.clone())
            .unwrap();
        assert_eq!(core.chain().len(), 1);
        assert_eq!(core.dynamic_paths(), vec!["/hooks/tag".to_string()]);

        let duplicate = core.add_dynamic_director("/hooks/tag", get(|| async { "" }), noop.clone());
        assert!(matches!(duplicate, Err(ProxyError::Construction(_))));
        assert!(core.add_dynamic_director("hooks", get(|| async { "" }), noop.clone()).is_err());
        assert!(core.add_dynamic_director("/h/:id", get(|| async { "" }), noop.clone()).is_err());
        assert_eq!(core.chain().len(), 1);

        // conflicting captures and broken syntax are rejected and leave no trace
        core.add_dynamic_director("/h/{a}", get(|| async { "a" }), noop.clone())
            .unwrap();
        let conflict = core.add_dynamic_director("/h/{b}", get(|| async { "b" }), noop.clone());
        assert!(matches!(conflict, Err(ProxyError::Construction(_))));
        assert!(core.add_dynamic_director("/h/{", get(|| async { "" }), noop.clone()).is_err());
        assert_eq!(core.dynamic_paths(), vec!["/hooks/tag".to_string(), "/h/{a}".to_string()]);
        assert_eq!(core.chain().len(), 2);

        core.add_dynamic_director("/ok", get(|| async { "ok" }), noop).unwrap();
        assert_eq!(core.chain().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_registration_and_requests() {
        let transport = Arc::new(StubTransport::default());
        let core = Arc::new(ProxyCore::new(routed_chain(), transport.clone()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let core = core.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    core.add_director(Arc::new(from_fn(|_req: &mut ProxyRequest| {})));
                } else {
                    core.handle(request("/dir")).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(core.chain().len(), 5);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    }
}
