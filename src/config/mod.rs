//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BootstrapConfig (immutable)
//!     → lifecycle::startup builds one connector per backend table
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Zero-valued connector knobs are filled by each connector's normalizer,
//!   not by serde, so programmatic configs get the same defaults

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{BootstrapConfig, HealthCheckConfig, ObservabilityConfig};
