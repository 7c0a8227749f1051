//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown_signal() resolves
//!
//! Shutdown (shutdown.rs):
//!     trigger() → server stops accepting → grace period → upstream exchanges cancelled → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, cancel, close pool
//! - Shutdown has timeout: outstanding upstream work is cancelled after the grace period

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
