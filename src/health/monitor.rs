//! Periodic liveness sweeps.
//!
//! # Responsibilities
//! - Periodically run `live()` on every registered component
//! - Publish per-component liveness gauges
//! - Log Up/Down transitions once, not on every tick
//!
//! Liveness is re-derived on every sweep and ignores the readiness gate, so a
//! component whose first probe failed is reported live once it recovers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;
use uuid::Uuid;

use crate::config::HealthCheckConfig;
use crate::observability::metrics;
use crate::registry::{ComponentReport, LiveStatus, Registry};

pub struct HealthMonitor {
    registry: Arc<Registry>,
    config: HealthCheckConfig,
    last: HashMap<Uuid, bool>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<Registry>, config: HealthCheckConfig) -> Self {
        Self {
            registry,
            config,
            last: HashMap::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Periodic health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            timeout = self.config.timeout_secs,
            components = self.registry.len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Check every component once and record the outcome.
    pub async fn sweep(&mut self) -> Vec<ComponentReport> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let reports = self.registry.check_all(timeout).await;

        for report in &reports {
            let live = report.is_live();
            metrics::record_component_health(report.key, &report.id, live);

            let previous = self.last.insert(report.id, live);
            if previous == Some(live) {
                continue;
            }
            match (&report.live, previous) {
                (LiveStatus::Down { error }, _) => tracing::warn!(
                    key = report.key,
                    component_id = %report.id,
                    error = %error,
                    "Component is down"
                ),
                (_, Some(false)) => tracing::info!(
                    key = report.key,
                    component_id = %report.id,
                    "Component recovered"
                ),
                _ => tracing::debug!(
                    key = report.key,
                    component_id = %report.id,
                    live,
                    "Component health observed"
                ),
            }
        }
        reports
    }

    /// Liveness recorded by the last sweep, if the component was seen.
    pub fn last_live(&self, id: &Uuid) -> Option<bool> {
        self.last.get(id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::http::{Http, HttpConfig};
    use crate::connector::Connection;
    use crate::registry::Component;

    #[tokio::test]
    async fn test_sweep_reports_unreachable_component_down() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let registry = Arc::new(Registry::new());
        let conn = Connection::<Http>::bootstrap(
            HttpConfig {
                url: format!("http://{}/health", addr),
                timeout_ms: 500,
                ..HttpConfig::default()
            },
            &registry,
        );
        let _ = conn.await_ping().await;

        let mut monitor = HealthMonitor::new(
            registry,
            HealthCheckConfig {
                enabled: true,
                interval_secs: 1,
                timeout_secs: 2,
            },
        );
        let reports = monitor.sweep().await;
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].live, LiveStatus::Down { .. }));
        assert!(!reports[0].is_live());
        assert_eq!(monitor.last_live(&reports[0].id), Some(false));
    }

    #[tokio::test]
    async fn test_component_recovers_after_failed_first_probe() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // First request gets 503, every later one 200.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let served = Arc::new(AtomicUsize::new(0));
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let served = served.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let status = if served.fetch_add(1, Ordering::SeqCst) == 0 { 503 } else { 200 };
                    let response = format!(
                        "HTTP/1.1 {} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        status
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        let registry = Arc::new(Registry::new());
        let conn = Connection::<Http>::bootstrap(
            HttpConfig {
                url: format!("http://{}/health", addr),
                timeout_ms: 1_000,
                ..HttpConfig::default()
            },
            &registry,
        );
        assert!(conn.await_ping().await.is_err());

        let mut monitor = HealthMonitor::new(
            registry,
            HealthCheckConfig {
                enabled: true,
                interval_secs: 1,
                timeout_secs: 2,
            },
        );
        let reports = monitor.sweep().await;
        assert_eq!(reports[0].live, LiveStatus::Up);
        assert!(reports[0].is_live());
        assert!(!reports[0].is_healthy());
        assert_eq!(monitor.last_live(&conn.id()), Some(true));
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let registry = Arc::new(Registry::new());
        let monitor = HealthMonitor::new(
            registry,
            HealthCheckConfig {
                enabled: true,
                interval_secs: 60,
                timeout_secs: 1,
            },
        );
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(monitor.run(rx));
        tx.send(()).unwrap();
        assert!(time::timeout(Duration::from_secs(2), handle).await.is_ok());
    }
}
