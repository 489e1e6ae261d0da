//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup or reload):
//!     (pattern → director) pairs
//!     → Sort patterns
//!     → Insert into segment trie (tree.rs)
//!     → Freeze as immutable RouterDirector (router.rs)
//!
//! Incoming Request (path)
//!     → tree.rs (literal > variable > wildcard, with backtracking)
//!     → bind path variables onto the request
//!     → run the matched director, or cancel with RouteNotFound
//! ```
//!
//! # Design Decisions
//! - Routes compiled once, immutable at runtime (rebuild and swap to change)
//! - No regex in hot path
//! - Deterministic: same route set always yields the same tree
//! - Explicit not-found cancellation rather than a silent default

pub mod router;
pub mod tree;

pub use router::RouterDirector;
pub use tree::{RouteMatch, RouteTree};
