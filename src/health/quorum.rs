//! Quorum liveness for multi-host backends.
//!
//! # Algorithm
//! ```text
//! hosts ──┬─▶ check(host 1) ─┐
//!         ├─▶ check(host 2) ─┼─▶ join all ─▶ ratio = 1 - failed/total ─▶ pass iff ratio > 0.6
//!         └─▶ check(host N) ─┘
//! ```
//!
//! # Design Decisions
//! - Every host is checked concurrently; results are gathered, never pushed
//!   into a shared collection
//! - Each check is bounded by the backend's own per-host timeout
//! - The threshold is a fixed policy constant
//! - A degraded but passing quorum is not an error
//! - Dropping the evaluation future cancels all in-flight checks
//! - The failed-host gauge is labelled with the component being checked,
//!   taken from the task-local set by [`attributed`]

use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time;
use uuid::Uuid;

use crate::error::{ConnectError, HostFailure, QuorumError};
use crate::observability::metrics;

/// Minimum success ratio (exclusive) for a multi-host backend to be live.
pub const QUORUM_THRESHOLD: f64 = 0.6;

// QUORUM_THRESHOLD as an exact fraction, so the comparison has no rounding.
const THRESHOLD_NUM: usize = 3;
const THRESHOLD_DEN: usize = 5;

tokio::task_local! {
    static COMPONENT: Uuid;
}

/// Run `fut` with quorum metrics attributed to component `id`.
pub async fn attributed<F: Future>(id: Uuid, fut: F) -> F::Output {
    COMPONENT.scope(id, fut).await
}

fn current_component() -> Option<Uuid> {
    COMPONENT.try_with(|id| *id).ok()
}

/// `1 - failed/total`, or 0.0 for an empty host set.
pub fn success_ratio(total: usize, failed: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    1.0 - failed as f64 / total as f64
}

/// True iff `1 - failed/total > 0.6`.
pub fn quorum_reached(total: usize, failed: usize) -> bool {
    if total == 0 || failed > total {
        return false;
    }
    (total - failed) * THRESHOLD_DEN > total * THRESHOLD_NUM
}

/// Outcome of a passing evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumReport {
    pub total: usize,
    /// Hosts that failed while the quorum still held.
    pub degraded: Vec<HostFailure>,
}

impl QuorumReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Check every host concurrently and derive one verdict.
///
/// `check` is invoked once per host; each call is bounded by `per_host_timeout`.
pub async fn evaluate<F, Fut>(
    backend: &'static str,
    hosts: &[String],
    per_host_timeout: Duration,
    check: F,
) -> Result<QuorumReport, ConnectError>
where
    F: Fn(&str) -> Fut,
    Fut: Future<Output = Result<(), ConnectError>>,
{
    if hosts.is_empty() {
        return Err(ConnectError::NoHosts(backend));
    }

    let checks = hosts.iter().map(|host| {
        let fut = check(host.as_str());
        async move {
            let outcome = match time::timeout(per_host_timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(ConnectError::Timeout {
                    backend,
                    timeout: per_host_timeout,
                }),
            };
            (host, outcome)
        }
    });

    let failures: Vec<HostFailure> = join_all(checks)
        .await
        .into_iter()
        .filter_map(|(host, outcome)| {
            outcome.err().map(|e| HostFailure {
                host: host.clone(),
                reason: e.to_string(),
            })
        })
        .collect();

    let total = hosts.len();
    metrics::record_quorum_failures(backend, current_component().as_ref(), failures.len());
    if quorum_reached(total, failures.len()) {
        if !failures.is_empty() {
            tracing::warn!(
                backend,
                failed = failures.len(),
                total,
                ratio = success_ratio(total, failures.len()),
                "Quorum degraded"
            );
        }
        return Ok(QuorumReport {
            total,
            degraded: failures,
        });
    }

    tracing::warn!(
        backend,
        failed = failures.len(),
        total,
        "Quorum lost"
    );
    Err(QuorumError {
        backend,
        total,
        failures,
    }
    .into())
}
