//! Admin API for runtime reconfiguration.
//!
//! Every route, including handlers registered through
//! [`ProxyCore::add_dynamic_director`], sits behind bearer-key auth.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::proxy::ProxyCore;
use crate::security::rate_limit::GroupRateLimiter;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub core: Arc<ProxyCore>,
    pub limiter: Arc<GroupRateLimiter>,
    pub api_key: Arc<str>,
    pub started: Instant,
}

impl AdminState {
    pub fn new(core: Arc<ProxyCore>, limiter: Arc<GroupRateLimiter>, api_key: &str) -> Self {
        Self {
            core,
            limiter,
            api_key: Arc::from(api_key),
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/ratelimit/groups", get(list_groups))
        .route("/admin/ratelimit/groups/{id}", put(set_group).delete(delete_group))
        .fallback(dynamic_dispatch)
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
