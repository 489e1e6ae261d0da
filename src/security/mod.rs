//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Director chain:
//!     → token.rs (correlation tokens, bearer token exchange)
//!     → rate_limit.rs (per-group, per-identity token buckets)
//! Forwarding:
//!     → headers.rs (hop-by-hop stripping, X-Forwarded-For)
//! ```
//!
//! # Design Decisions
//! - Limiter state is process-local and advisory; nothing is persisted
//! - Cryptography stays behind the token traits

pub mod headers;
pub mod rate_limit;
pub mod token;
