//! The uniform contract every connector exposes to the registry.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ConnectError;
use crate::health::readiness::ReadinessState;

/// A registered backend connector.
#[async_trait]
pub trait Component: Send + Sync {
    /// Unique id assigned at construction.
    fn id(&self) -> Uuid;

    /// Stable backend identifier (`"etcd"`, `"postgres"`, ...).
    fn key(&self) -> &'static str;

    /// Human-readable identity.
    fn name(&self) -> String;

    /// Redacted connection summary. Never contains credentials.
    fn details(&self) -> serde_json::Value;

    /// Readiness gate state without waiting.
    fn readiness(&self) -> ReadinessState;

    /// Wait for the readiness gate to resolve.
    async fn await_ready(&self) -> ReadinessState;

    /// Current health of the backend.
    async fn live(&self) -> Result<(), ConnectError>;

    /// Release the native handle.
    async fn shutdown(&self) -> Result<(), ConnectError>;
}
