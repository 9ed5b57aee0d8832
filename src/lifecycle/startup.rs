//! Startup orchestration.
//!
//! # Responsibilities
//! - Build and register one connector per configured backend table
//! - Wait for every readiness gate and publish the outcome
//!
//! # Design Decisions
//! - A connector that fails construction is still registered; startup never
//!   aborts because one backend is unreachable
//! - All probes run concurrently; waiting happens after every connector
//!   has been created

use std::sync::Arc;

use crate::backends::{ClickHouse, Etcd, GitLab, Http, Kafka, Postgres, Redis, S3};
use crate::config::BootstrapConfig;
use crate::connector::{Backend, Connection};
use crate::observability::metrics;
use crate::registry::{ComponentReport, Registry};

/// Typed handles to every connector created by [`bootstrap`].
#[derive(Debug, Default)]
pub struct Connectors {
    pub clickhouse: Vec<Arc<Connection<ClickHouse>>>,
    pub etcd: Vec<Arc<Connection<Etcd>>>,
    pub s3: Vec<Arc<Connection<S3>>>,
    pub kafka: Vec<Arc<Connection<Kafka>>>,
    pub postgres: Vec<Arc<Connection<Postgres>>>,
    pub redis: Vec<Arc<Connection<Redis>>>,
    pub http: Vec<Arc<Connection<Http>>>,
    pub gitlab: Vec<Arc<Connection<GitLab>>>,
}

impl Connectors {
    pub fn len(&self) -> usize {
        self.clickhouse.len()
            + self.etcd.len()
            + self.s3.len()
            + self.kafka.len()
            + self.postgres.len()
            + self.redis.len()
            + self.http.len()
            + self.gitlab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn start_all<B: Backend>(configs: &[B::Config], registry: &Registry) -> Vec<Arc<Connection<B>>> {
    configs
        .iter()
        .cloned()
        .map(|config| Connection::<B>::bootstrap(config, registry))
        .collect()
}

/// Construct and register every configured connector.
///
/// Must be called from within a Tokio runtime.
pub fn bootstrap(config: &BootstrapConfig, registry: &Registry) -> Connectors {
    let connectors = Connectors {
        clickhouse: start_all::<ClickHouse>(&config.clickhouse, registry),
        etcd: start_all::<Etcd>(&config.etcd, registry),
        s3: start_all::<S3>(&config.s3, registry),
        kafka: start_all::<Kafka>(&config.kafka, registry),
        postgres: start_all::<Postgres>(&config.postgres, registry),
        redis: start_all::<Redis>(&config.redis, registry),
        http: start_all::<Http>(&config.http, registry),
        gitlab: start_all::<GitLab>(&config.gitlab, registry),
    };

    tracing::info!(
        connectors = connectors.len(),
        registered = registry.len(),
        "Connectors bootstrapped"
    );
    connectors
}

/// Wait for every readiness gate, then log and record each outcome.
pub async fn await_ready(registry: &Registry) -> Vec<ComponentReport> {
    let reports = registry.await_ready().await;

    for report in &reports {
        metrics::record_readiness(report.key, &report.id, &report.readiness);
        if report.readiness.is_ready() {
            tracing::info!(key = report.key, name = %report.name, "Component ready");
        } else {
            tracing::error!(
                key = report.key,
                name = %report.name,
                readiness = ?report.readiness,
                "Component failed readiness"
            );
        }
    }
    reports
}
