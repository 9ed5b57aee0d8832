//! Configuration schema definitions.
//!
//! One file configures every connector the process bootstraps. Each backend
//! is an array of tables, so several instances of the same backend can run
//! side by side:
//!
//! ```toml
//! [observability]
//! log_level = "info"
//!
//! [[etcd]]
//! hosts = ["10.0.0.1:2379", "10.0.0.2:2379", "10.0.0.3:2379"]
//!
//! [[postgres]]
//! host = "db.local"
//! database = "orders"
//! ```

use serde::{Deserialize, Serialize};

use crate::backends::{
    ClickHouseConfig, EtcdConfig, GitLabConfig, HttpConfig, KafkaConfig, PostgresConfig,
    RedisConfig, S3Config,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Periodic liveness sweep settings.
    pub health_check: HealthCheckConfig,

    pub clickhouse: Vec<ClickHouseConfig>,
    pub etcd: Vec<EtcdConfig>,
    pub s3: Vec<S3Config>,
    pub kafka: Vec<KafkaConfig>,
    pub postgres: Vec<PostgresConfig>,
    pub redis: Vec<RedisConfig>,
    pub http: Vec<HttpConfig>,
    pub gitlab: Vec<GitLabConfig>,
}

impl BootstrapConfig {
    /// Number of connectors this config declares.
    pub fn connector_count(&self) -> usize {
        self.clickhouse.len()
            + self.etcd.len()
            + self.s3.len()
            + self.kafka.len()
            + self.postgres.len()
            + self.redis.len()
            + self.http.len()
            + self.gitlab.len()
    }
}

/// Periodic health check configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable periodic liveness sweeps.
    pub enabled: bool,

    /// Sweep interval in seconds.
    pub interval_secs: u64,

    /// Per-component `live()` timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Install the Prometheus recorder.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
