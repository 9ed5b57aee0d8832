//! Connection bootstrap shared by every backend.
//!
//! # Data Flow
//! ```text
//! Config
//!     → normalize.rs (fill zero-valued knobs)
//!     → Backend::connect (build native handle)
//!         ├─ Ok  → readiness probe spawned (Pending → Ready | Failed)
//!         └─ Err → gate born Failed, probe never runs
//!     → Registry::load (always)
//!     → Connection::connection() waits on the gate, returns the handle
//! ```
//!
//! # Design Decisions
//! - One generic `Connection<B>` carries the lifecycle; backends only supply
//!   construction, liveness and reporting
//! - Construction errors are terminal and short-circuit every later probe
//! - Registration happens at construction, never on first access
//! - Shutdown waits for an in-flight probe and is idempotent

pub mod normalize;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ConnectError;
use crate::health::quorum;
use crate::health::readiness::{ReadinessGate, ReadinessState};
use crate::registry::{Component, Registry};

pub use normalize::Normalize;

/// Backend-specific half of a connector.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Stable registry key.
    const KEY: &'static str;

    type Config: Normalize + Clone + Send + Sync + 'static;
    type Handle: Send + Sync + 'static;

    /// Build the native handle from a normalized config.
    fn connect(config: &Self::Config) -> Result<Self::Handle, ConnectError>;

    /// Check that the backend is reachable through `handle`.
    async fn live(config: &Self::Config, handle: &Self::Handle) -> Result<(), ConnectError>;

    /// Upper bound for the first readiness probe.
    fn readiness_timeout(config: &Self::Config) -> Duration;

    /// Human-readable identity.
    fn name(config: &Self::Config, id: Uuid) -> String;

    /// Redacted summary for the registry.
    fn details(config: &Self::Config) -> serde_json::Value;

    /// Release driver resources held by `handle`.
    async fn close(_handle: &Self::Handle) -> Result<(), ConnectError> {
        Ok(())
    }
}

/// A backend connection and its readiness gate.
pub struct Connection<B: Backend> {
    id: Uuid,
    config: B::Config,
    handle: Option<B::Handle>,
    init_error: Option<ConnectError>,
    readiness: ReadinessGate,
    shut_down: AtomicBool,
}

impl<B: Backend> Connection<B> {
    /// Normalize, construct, register and start the readiness probe.
    ///
    /// The connection is registered whether or not construction succeeded.
    /// Must be called from within a Tokio runtime.
    pub fn bootstrap(config: B::Config, registry: &Registry) -> Arc<Self> {
        let connection = Arc::new(Self::build(config));
        registry.load(connection.clone());
        connection.start_probe();
        connection
    }

    /// Like [`Connection::bootstrap`] without registering anywhere.
    pub fn spawn(config: B::Config) -> Arc<Self> {
        let connection = Arc::new(Self::build(config));
        connection.start_probe();
        connection
    }

    fn build(config: B::Config) -> Self {
        let config = config.normalize();
        let id = Uuid::new_v4();
        match B::connect(&config) {
            Ok(handle) => {
                tracing::debug!(backend = B::KEY, component_id = %id, "Native handle constructed");
                Self {
                    id,
                    config,
                    handle: Some(handle),
                    init_error: None,
                    readiness: ReadinessGate::new(B::KEY),
                    shut_down: AtomicBool::new(false),
                }
            }
            Err(e) => {
                tracing::error!(backend = B::KEY, component_id = %id, error = %e, "Connection construction failed");
                Self {
                    id,
                    config,
                    handle: None,
                    readiness: ReadinessGate::failed(B::KEY, e.clone()),
                    init_error: Some(e),
                    shut_down: AtomicBool::new(false),
                }
            }
        }
    }

    /// Launch the readiness probe (Ping). Returns whether a probe was started.
    pub fn start_probe(self: &Arc<Self>) -> bool {
        if self.handle.is_none() {
            return false;
        }
        let this = Arc::clone(self);
        let timeout = B::readiness_timeout(&self.config);
        self.readiness
            .ping(timeout, move || async move { this.check().await })
    }

    /// Wait for the readiness probe (AwaitPing).
    ///
    /// Returns the construction error immediately if construction failed.
    pub async fn await_ping(&self) -> Result<(), ConnectError> {
        self.readiness.wait().await.into_result()
    }

    /// Obtain the native handle once readiness has resolved.
    ///
    /// The handle is returned even if the probe failed; callers still see
    /// errors from the backend calls they make. Only a connection without a
    /// handle returns its construction error.
    pub async fn connection(&self) -> Result<&B::Handle, ConnectError> {
        let state = self.readiness.wait().await;
        match (&self.handle, &self.init_error) {
            (Some(handle), _) => {
                if let ReadinessState::Failed(e) = &state {
                    tracing::warn!(backend = B::KEY, error = %e, "Handing out connection that failed readiness");
                }
                Ok(handle)
            }
            (None, Some(e)) => Err(e.clone()),
            (None, None) => Err(ConnectError::ShutDown(B::KEY)),
        }
    }

    /// The normalized config this connection was built from.
    pub fn config(&self) -> &B::Config {
        &self.config
    }

    /// The construction error, if any.
    pub fn init_error(&self) -> Option<&ConnectError> {
        self.init_error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.init_error.is_some()
    }

    pub fn readiness_state(&self) -> ReadinessState {
        self.readiness.state()
    }

    async fn check(&self) -> Result<(), ConnectError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ConnectError::ShutDown(B::KEY));
        }
        match (&self.handle, &self.init_error) {
            (Some(handle), _) => quorum::attributed(self.id, B::live(&self.config, handle)).await,
            (None, Some(e)) => Err(e.clone()),
            (None, None) => Err(ConnectError::ShutDown(B::KEY)),
        }
    }
}

#[async_trait]
impl<B: Backend> Component for Connection<B> {
    fn id(&self) -> Uuid {
        self.id
    }

    fn key(&self) -> &'static str {
        B::KEY
    }

    fn name(&self) -> String {
        B::name(&self.config, self.id)
    }

    fn details(&self) -> serde_json::Value {
        B::details(&self.config)
    }

    fn readiness(&self) -> ReadinessState {
        self.readiness.state()
    }

    async fn await_ready(&self) -> ReadinessState {
        self.readiness.wait().await
    }

    async fn live(&self) -> Result<(), ConnectError> {
        self.check().await
    }

    async fn shutdown(&self) -> Result<(), ConnectError> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Let an in-flight probe finish before the handle goes away.
        self.readiness.settle().await;

        match &self.handle {
            Some(handle) => {
                B::close(handle).await?;
                tracing::info!(backend = B::KEY, component_id = %self.id, "Connection closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Connection<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("key", &B::KEY)
            .field("id", &self.id)
            .field("readiness", &self.readiness.state().label())
            .field("init_error", &self.init_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, Default)]
    struct FakeConfig {
        hosts: Vec<String>,
        timeout_ms: u64,
        delay_ms: u64,
        healthy: bool,
        probes: Arc<AtomicUsize>,
        closed_after_probe: Arc<AtomicBool>,
    }

    impl Normalize for FakeConfig {
        fn normalize(mut self) -> Self {
            normalize::fill(&mut self.timeout_ms, 1000);
            self
        }
    }

    struct Fake;

    #[async_trait]
    impl Backend for Fake {
        const KEY: &'static str = "fake";
        type Config = FakeConfig;
        type Handle = FakeConfig;

        fn connect(config: &FakeConfig) -> Result<FakeConfig, ConnectError> {
            if config.hosts.is_empty() {
                return Err(ConnectError::NoHosts(Self::KEY));
            }
            Ok(config.clone())
        }

        async fn live(config: &FakeConfig, _handle: &FakeConfig) -> Result<(), ConnectError> {
            if config.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
            }
            config.probes.fetch_add(1, Ordering::SeqCst);
            if config.healthy {
                Ok(())
            } else {
                Err(ConnectError::liveness(Self::KEY, "down"))
            }
        }

        fn readiness_timeout(config: &FakeConfig) -> Duration {
            Duration::from_millis(config.timeout_ms)
        }

        fn name(config: &FakeConfig, _id: Uuid) -> String {
            format!("name: fake hosts:{}", config.hosts.join(","))
        }

        fn details(config: &FakeConfig) -> serde_json::Value {
            serde_json::json!({ "hosts": config.hosts })
        }

        async fn close(handle: &FakeConfig) -> Result<(), ConnectError> {
            let probed = handle.probes.load(Ordering::SeqCst) > 0;
            handle.closed_after_probe.store(probed, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(healthy: bool) -> FakeConfig {
        FakeConfig {
            hosts: vec!["a".into()],
            healthy,
            ..FakeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_registers_and_resolves_ready() {
        let registry = Registry::new();
        let conn = Connection::<Fake>::bootstrap(config(true), &registry);

        assert_eq!(registry.len(), 1);
        assert!(registry.get(&conn.id()).is_some());
        assert_eq!(conn.await_ping().await, Ok(()));
        assert_eq!(conn.readiness_state(), ReadinessState::Ready);
        assert_eq!(conn.config().timeout_ms, 1000);
        assert!(conn.connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_construction_failure_is_registered_and_short_circuits() {
        let registry = Registry::new();
        let probes = Arc::new(AtomicUsize::new(0));
        let cfg = FakeConfig {
            probes: probes.clone(),
            ..FakeConfig::default()
        };
        let conn = Connection::<Fake>::bootstrap(cfg, &registry);

        assert_eq!(registry.by_key("fake").len(), 1);
        assert!(conn.has_error());
        assert_eq!(conn.await_ping().await, Err(ConnectError::NoHosts("fake")));
        assert_eq!(conn.connection().await.err(), Some(ConnectError::NoHosts("fake")));
        assert_eq!(Component::live(conn.as_ref()).await, Err(ConnectError::NoHosts("fake")));
        assert_eq!(probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_probe_still_hands_out_handle() {
        let conn = Connection::<Fake>::spawn(config(false));
        assert!(conn.await_ping().await.is_err());
        assert!(conn.connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_await_ping_is_stable() {
        let cfg = config(true);
        let probes = cfg.probes.clone();
        let conn = Connection::<Fake>::spawn(cfg);
        let first = conn.await_ping().await;
        let second = conn.await_ping().await;
        assert_eq!(first, second);
        assert!(!conn.start_probe());
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let conn = Connection::<Fake>::spawn(config(true));
        assert!(conn.shutdown().await.is_ok());
        assert!(conn.shutdown().await.is_ok());
        assert_eq!(
            Component::live(conn.as_ref()).await,
            Err(ConnectError::ShutDown("fake"))
        );
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_probe() {
        let cfg = FakeConfig {
            delay_ms: 200,
            ..config(true)
        };
        let probes = cfg.probes.clone();
        let closed_after_probe = cfg.closed_after_probe.clone();
        let conn = Connection::<Fake>::spawn(cfg);
        // Let the probe get past the shutdown check and into `live`.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(conn.readiness_state().is_pending());

        let started = std::time::Instant::now();
        assert!(conn.shutdown().await.is_ok());

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(conn.readiness_state(), ReadinessState::Ready);
        assert_eq!(probes.load(Ordering::SeqCst), 1);
        assert!(closed_after_probe.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_details_and_name() {
        let conn = Connection::<Fake>::spawn(config(true));
        assert_eq!(conn.key(), "fake");
        assert_eq!(conn.name(), "name: fake hosts:a");
        assert_eq!(conn.details(), serde_json::json!({ "hosts": ["a"] }));
    }
}
