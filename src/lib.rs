//! Connection bootstrap and readiness/quorum health for infrastructure
//! backend connectors.
//!
//! A connector turns a declarative config into a connection that has been
//! probed at least once, tolerates a minority of dead hosts on multi-host
//! backends, and reports itself through one [`registry::Component`] contract.

// Core
pub mod connector;
pub mod error;
pub mod health;
pub mod registry;

// Backends
pub mod backends;
pub mod net;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::BootstrapConfig;
pub use connector::{Backend, Connection};
pub use error::{ConnectError, QuorumError};
pub use lifecycle::Shutdown;
pub use registry::Registry;
