//! Director subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → request.rs (split into ProxyRequest + body)
//!     → chain.rs (run directors in order, stop on cancellation)
//!         → correlation.rs, token_exchange.rs, rate_limit.rs
//!         → routing::RouterDirector → upstream.rs (URL rewrite)
//!     → http::proxy (forward or synthesize the error)
//! ```
//!
//! # Design Decisions
//! - Directors mutate routing metadata only, never the body
//! - A director reports failure by cancelling the request, not by returning
//! - Directors are shared trait objects; one instance serves all requests

use std::sync::Arc;

use async_trait::async_trait;

pub mod chain;
pub mod correlation;
pub mod pipeline;
pub mod rate_limit;
pub mod request;
pub mod token_exchange;
pub mod upstream;

pub use chain::Chain;
pub use request::{Cancellation, PathVariables, ProxyRequest};
pub use upstream::{SingleHost, UpstreamTarget};

/// A composable request transformation step.
#[async_trait]
pub trait Director: Send + Sync {
    /// Transform the request in place, or cancel it.
    async fn direct(&self, req: &mut ProxyRequest);

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "director"
    }
}

#[async_trait]
impl<D: Director + ?Sized> Director for Arc<D> {
    async fn direct(&self, req: &mut ProxyRequest) {
        (**self).direct(req).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Director backed by a synchronous closure.
pub struct FnDirector<F>(F);

/// Wrap a closure as a director.
pub fn from_fn<F>(f: F) -> FnDirector<F>
where
    F: Fn(&mut ProxyRequest) + Send + Sync + 'static,
{
    FnDirector(f)
}

#[async_trait]
impl<F> Director for FnDirector<F>
where
    F: Fn(&mut ProxyRequest) + Send + Sync + 'static,
{
    async fn direct(&self, req: &mut ProxyRequest) {
        (self.0)(req)
    }

    fn name(&self) -> &'static str {
        "fn"
    }
}
