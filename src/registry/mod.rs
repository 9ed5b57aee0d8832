//! Component registry.
//!
//! # Data Flow
//! ```text
//! Connection::bootstrap
//!     → Registry::load (once per connector, success or failure)
//!     → report.rs (health snapshot for every component)
//!     → lifecycle::shutdown (release every handle)
//! ```
//!
//! # Design Decisions
//! - Connectors are stored as `Arc<dyn Component>` keyed by component id
//! - `load` is synchronous and never blocks on I/O
//! - Failed connectors are registered too, so health aggregation sees them

pub mod component;
pub mod report;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use uuid::Uuid;

use crate::error::ConnectError;

pub use component::Component;
pub use report::{ComponentReport, LiveStatus};

/// Process-wide set of registered connectors.
#[derive(Default)]
pub struct Registry {
    components: DashMap<Uuid, Arc<dyn Component>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component. Re-loading the same id replaces the entry.
    pub fn load(&self, component: Arc<dyn Component>) {
        let id = component.id();
        tracing::debug!(
            component_id = %id,
            key = component.key(),
            name = %component.name(),
            "Component registered"
        );
        self.components.insert(id, component);
    }

    /// Look up a component by id.
    pub fn get(&self, id: &Uuid) -> Option<Arc<dyn Component>> {
        self.components.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// All components reporting the given key (e.g. every `etcd` connector).
    pub fn by_key(&self, key: &str) -> Vec<Arc<dyn Component>> {
        self.components
            .iter()
            .filter(|entry| entry.value().key() == key)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Snapshot of every registered component.
    pub fn components(&self) -> Vec<Arc<dyn Component>> {
        self.components
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Run `live()` on every component concurrently, each bounded by `timeout`.
    pub async fn check_all(&self, timeout: Duration) -> Vec<ComponentReport> {
        let checks = self.components().into_iter().map(|component| async move {
            let outcome = match tokio::time::timeout(timeout, component.live()).await {
                Ok(result) => result,
                Err(_) => Err(ConnectError::Timeout {
                    backend: component.key(),
                    timeout,
                }),
            };
            ComponentReport::new(component.as_ref(), outcome)
        });

        let mut reports = join_all(checks).await;
        reports.sort_by(|a, b| a.key.cmp(b.key).then_with(|| a.name.cmp(&b.name)));
        reports
    }

    /// Wait for every component's readiness gate.
    pub async fn await_ready(&self) -> Vec<ComponentReport> {
        let waits = self.components().into_iter().map(|component| async move {
            component.await_ready().await;
            ComponentReport::readiness_only(component.as_ref())
        });
        let mut reports = join_all(waits).await;
        reports.sort_by(|a, b| a.key.cmp(b.key).then_with(|| a.name.cmp(&b.name)));
        reports
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("components", &self.components.len())
            .finish()
    }
}
