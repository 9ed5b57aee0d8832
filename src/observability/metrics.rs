//! Metrics collection and exposition.
//!
//! # Metrics
//! - `connector_health` (gauge): 1=live, 0=down, by key and component id
//! - `connector_ready` (gauge): 1=ready, 0=failed, by key and component id
//! - `connector_quorum_failed_hosts` (gauge): failed hosts in the last quorum
//!   evaluation, by backend and component id
//!
//! # Design Decisions
//! - The Prometheus recorder is a process global installed at most once
//! - Recording without an installed recorder is a no-op, so libraries and
//!   tests never need to initialize metrics

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use uuid::Uuid;

use crate::health::readiness::ReadinessState;

static RECORDER: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Safe to call multiple times.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    RECORDER.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        tracing::info!("Prometheus recorder installed");
        Ok(handle)
    })
}

/// The installed recorder handle, if any.
pub fn handle() -> Option<&'static PrometheusHandle> {
    RECORDER.get()
}

/// Prometheus text exposition of everything recorded so far.
pub fn render() -> Option<String> {
    handle().map(PrometheusHandle::render)
}

pub fn record_component_health(key: &'static str, id: &Uuid, healthy: bool) {
    metrics::gauge!("connector_health", "key" => key, "id" => id.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

/// Record a resolved readiness gate. Pending gates are skipped.
pub fn record_readiness(key: &'static str, id: &Uuid, state: &ReadinessState) {
    let value = match state {
        ReadinessState::Pending => return,
        ReadinessState::Ready => 1.0,
        ReadinessState::Failed(_) => 0.0,
    };
    metrics::gauge!("connector_ready", "key" => key, "id" => id.to_string()).set(value);
}

/// `id` is empty when the evaluation ran outside a component's check.
pub fn record_quorum_failures(backend: &'static str, id: Option<&Uuid>, failed: usize) {
    let id = id.map(Uuid::to_string).unwrap_or_default();
    metrics::gauge!("connector_quorum_failed_hosts", "backend" => backend, "id" => id)
        .set(failed as f64);
}
