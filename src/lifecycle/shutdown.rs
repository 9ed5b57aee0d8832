//! Shutdown coordination.

use futures_util::future::join_all;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ConnectError;
use crate::registry::Registry;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Release every registered connection.
///
/// Each connection first waits for its in-flight readiness probe. Returns
/// the connections whose driver reported an error while closing.
pub async fn shutdown_all(registry: &Registry) -> Vec<(Uuid, ConnectError)> {
    let closes = registry.components().into_iter().map(|component| async move {
        let outcome = component.shutdown().await;
        (component.id(), component.key(), outcome)
    });

    let mut failures = Vec::new();
    for (id, key, outcome) in join_all(closes).await {
        if let Err(e) = outcome {
            tracing::error!(key, component_id = %id, error = %e, "Shutdown failed");
            failures.push((id, e));
        }
    }
    tracing::info!(
        components = registry.len(),
        failed = failures.len(),
        "All connections released"
    );
    failures
}
