//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Bind server to listener, plus the admin API when enabled
//! - Rebuild and swap the director chain on config updates

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::{setup_admin_router, AdminState};
use crate::config::ProxyConfig;
use crate::director::pipeline::Pipeline;
use crate::error::ProxyResult;
use crate::http::proxy::ProxyCore;
use crate::http::transport::{HyperTransport, Transport};
use crate::observability::metrics;
use crate::security::rate_limit::GroupRateLimiter;

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    config: ProxyConfig,
    core: Arc<ProxyCore>,
    pipeline: Arc<Pipeline>,
}

impl HttpServer {
    /// Create a server forwarding through the hyper client.
    pub fn new(config: ProxyConfig) -> ProxyResult<Self> {
        let transport = Arc::new(HyperTransport::new(Duration::from_secs(
            config.timeouts.upstream_secs,
        )));
        Self::with_transport(config, transport)
    }

    /// Create a server forwarding through `transport`.
    pub fn with_transport(config: ProxyConfig, transport: Arc<dyn Transport>) -> ProxyResult<Self> {
        let limiter = Arc::new(GroupRateLimiter::new(config.rate_limit.unknown_group));
        let pipeline = Arc::new(Pipeline::new(limiter));
        let chain = pipeline.build_chain(&config)?;
        let core = Arc::new(ProxyCore::new(chain, transport));

        Ok(Self {
            config,
            core,
            pipeline,
        })
    }

    pub fn core(&self) -> &Arc<ProxyCore> {
        &self.core
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The proxy router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(self.core.clone())
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The admin API router.
    pub fn admin_router(&self) -> Router {
        setup_admin_router(AdminState::new(
            self.core.clone(),
            self.pipeline.limiter().clone(),
            &self.config.admin.api_key,
        ))
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires. Configs received on `config_updates` replace the
    /// director chain.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let admin = self.admin_router();
            let mut admin_shutdown = shutdown.resubscribe();
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API starting");
            tokio::spawn(async move {
                let result = axum::serve(admin_listener, admin)
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = result {
                    tracing::error!(error = %e, "Admin API stopped");
                }
            });
        }

        let pipeline = self.pipeline.clone();
        let core = self.core.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match pipeline.build_chain(&config) {
                    Ok(chain) => core.reload(chain),
                    Err(e) => {
                        tracing::error!(error = %e, "Config reload rejected, keeping current chain")
                    }
                }
            }
        });

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(State(core): State<Arc<ProxyCore>>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();

    let response = match core.handle(request).await {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    };

    metrics::record_request(&method, response.status().as_u16(), start_time);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::error::ProxyError;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    /// Echoes the upstream URI and selected request headers back as the body.
    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn round_trip(&self, request: Request<Body>) -> ProxyResult<Response<Body>> {
            let request_id = request
                .headers()
                .get("x-request-id")
                .map(|v| v.to_str().unwrap_or_default().to_string())
                .unwrap_or_default();
            Ok(Response::new(Body::from(format!("{} {}", request.uri(), request_id))))
        }
    }

    fn server() -> HttpServer {
        let mut config = ProxyConfig::default();
        config.routes.push(RouteConfig {
            pattern: "/api/*".into(),
            upstream: "http://backend.internal/v2/*".into(),
            rate_limit_group: None,
        });
        HttpServer::with_transport(config, Arc::new(EchoTransport)).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_proxy_handler_forwards_with_request_id() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/api/items/7").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let body = body_string(response).await;
        let (uri, request_id) = body.split_once(' ').unwrap();
        assert_eq!(uri, "http://backend.internal/v2/items/7");
        assert!(!request_id.is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_path_is_404() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/other").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_route_fails_construction() {
        let mut config = ProxyConfig::default();
        config.routes.push(RouteConfig {
            pattern: "/x".into(),
            upstream: "not a url".into(),
            rate_limit_group: None,
        });
        assert!(matches!(
            HttpServer::with_transport(config, Arc::new(EchoTransport)),
            Err(ProxyError::InvalidTarget(_))
        ));
    }
}
