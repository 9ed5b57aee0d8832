//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (readiness, health and quorum gauges)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Prometheus text exposition (`infra-connect check --metrics`)
//! ```
//!
//! # Design Decisions
//! - Structured fields (backend, component_id) on every connector event
//! - Metrics are cheap (atomic updates) and safe to record before init

pub mod logging;
pub mod metrics;
