//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → proxy.rs (run the director chain, check cancellation)
//!         → transport.rs (forward upstream)     if not cancelled
//!         → response.rs (error → response)      if cancelled or failed
//!     → Send to client
//! ```

pub mod proxy;
pub mod response;
pub mod server;
pub mod transport;

pub use proxy::ProxyCore;
pub use server::HttpServer;
pub use transport::{HyperTransport, Transport};
