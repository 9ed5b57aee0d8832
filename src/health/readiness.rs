//! Readiness gate.
//!
//! # Responsibilities
//! - Run the first liveness probe of a connection off the caller's path
//! - Record the outcome exactly once (`Pending → Ready | Failed`)
//! - Let any number of callers wait for that outcome
//!
//! # Design Decisions
//! - Backed by a `watch` channel used as a single-assignment cell
//! - The probe is bounded by its own timeout; waiting has none
//! - Timeout expiry resolves to `Failed`, same as a returned error

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time;

use crate::error::ConnectError;

/// Readiness of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    /// Probe not resolved yet.
    Pending,
    /// First probe succeeded.
    Ready,
    /// Construction failed or the first probe failed.
    Failed(ConnectError),
}

impl ReadinessState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Short label used in logs, reports and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
        }
    }

    /// Convert a resolved state into the result handed to callers.
    pub fn into_result(self) -> Result<(), ConnectError> {
        match self {
            Self::Failed(err) => Err(err),
            _ => Ok(()),
        }
    }
}

impl Serialize for ReadinessState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// One-shot readiness gate shared by a connection and its waiters.
#[derive(Debug)]
pub struct ReadinessGate {
    backend: &'static str,
    started: AtomicBool,
    tx: Arc<watch::Sender<ReadinessState>>,
}

impl ReadinessGate {
    /// Create a pending gate.
    pub fn new(backend: &'static str) -> Self {
        let (tx, _) = watch::channel(ReadinessState::Pending);
        Self {
            backend,
            started: AtomicBool::new(false),
            tx: Arc::new(tx),
        }
    }

    /// Create a gate already resolved with a construction error.
    ///
    /// Such a gate never runs a probe.
    pub fn failed(backend: &'static str, err: ConnectError) -> Self {
        let (tx, _) = watch::channel(ReadinessState::Failed(err));
        Self {
            backend,
            started: AtomicBool::new(true),
            tx: Arc::new(tx),
        }
    }

    /// Current state without waiting.
    pub fn state(&self) -> ReadinessState {
        self.tx.borrow().clone()
    }

    /// True once a probe has been launched (or the gate was born failed).
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Launch the readiness probe on a background task.
    ///
    /// Only the first call starts a probe; later calls return `false` and do
    /// nothing. Must be called from within a Tokio runtime.
    pub fn ping<F, Fut>(&self, timeout: Duration, probe: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ConnectError>> + Send + 'static,
    {
        if self.started.swap(true, Ordering::AcqRel) {
            return false;
        }

        let tx = Arc::clone(&self.tx);
        let backend = self.backend;
        tokio::spawn(async move {
            let outcome = match time::timeout(timeout, probe()).await {
                Ok(Ok(())) => {
                    tracing::info!(backend, "Connection ready");
                    ReadinessState::Ready
                }
                Ok(Err(e)) => {
                    tracing::warn!(backend, error = %e, "Readiness probe failed");
                    ReadinessState::Failed(e)
                }
                Err(_) => {
                    tracing::warn!(backend, timeout = ?timeout, "Readiness probe timed out");
                    ReadinessState::Failed(ConnectError::Timeout { backend, timeout })
                }
            };
            resolve(&tx, outcome);
        });
        true
    }

    /// Wait until the probe resolves (AwaitPing).
    ///
    /// Returns immediately when already resolved. Never re-triggers the probe.
    pub async fn wait(&self) -> ReadinessState {
        let mut rx = self.tx.subscribe();
        let state = match rx.wait_for(|state| !state.is_pending()).await {
            Ok(state) => state.clone(),
            // Sender is owned by `self`, so this only happens while tearing down.
            Err(_) => self.state(),
        };
        state
    }

    /// Wait for an in-flight probe; returns at once if none was started.
    pub async fn settle(&self) -> ReadinessState {
        if self.is_started() {
            self.wait().await
        } else {
            self.state()
        }
    }
}

/// Store the outcome unless the gate is already resolved.
fn resolve(tx: &watch::Sender<ReadinessState>, outcome: ReadinessState) {
    tx.send_if_modified(|state| {
        if state.is_pending() {
            *state = outcome;
            true
        } else {
            false
        }
    });
}
