//! Director-based reverse proxy library.

pub mod admin;
pub mod config;
pub mod director;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use director::{Chain, Director, ProxyRequest};
pub use error::{ProxyError, ProxyResult};
pub use http::{HttpServer, ProxyCore};
pub use lifecycle::Shutdown;
