//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Readiness (readiness.rs):
//!     Connection constructed
//!     → one bounded probe
//!     → Pending → Ready | Failed (single assignment)
//!
//! Quorum (quorum.rs):
//!     Multi-host live()
//!     → concurrent per-host checks
//!     → pass iff success ratio > 0.6
//!
//! Monitor (monitor.rs):
//!     Periodic timer
//!     → Registry::check_all
//!     → health gauges + transition logs
//! ```
//!
//! # Design Decisions
//! - Readiness is resolved once; liveness is re-derived on every call
//! - Health state is per-component, keyed by component id

pub mod monitor;
pub mod quorum;
pub mod readiness;

use std::time::Duration;

pub use monitor::HealthMonitor;
pub use readiness::{ReadinessGate, ReadinessState};

/// Slack added on top of a quorum backend's per-host timeout when bounding
/// its readiness probe, so a slow host fails inside the quorum rather than
/// timing out the whole probe.
pub const QUORUM_PROBE_GRACE: Duration = Duration::from_millis(500);
