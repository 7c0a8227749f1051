//! Routing subsystem (proxy dispatcher).
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, query)
//!     → router.rs (route lookup)
//!     → matcher.rs (segment-aware prefix match)
//!     → Return: RouteMatch { mode, path remainder, query } or DispatchError
//! ```
//!
//! # Design Decisions
//! - Two static routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::PathPrefixMatcher;
pub use router::{DispatchError, Dispatcher, Route, RouteMatch};
