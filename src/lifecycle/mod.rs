//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → bootstrap every connector → await readiness
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop monitor → wait for in-flight probes → close handles
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then connectors, then the monitor
//! - Shutdown releases every connection exactly once

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{shutdown_all, Shutdown};
pub use startup::{await_ready, bootstrap, Connectors};
