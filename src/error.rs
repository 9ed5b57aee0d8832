//! Error types shared by every connector.
//!
//! Two classes of failure exist:
//! - construction errors: terminal, recorded once when the native handle is built
//! - liveness errors: transient, re-derived on every `live()` call
//!
//! Payloads are strings so a stored error can be cloned out to every caller
//! waiting on the readiness gate.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while constructing or probing a backend connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The configuration cannot produce a connection.
    #[error("invalid {backend} configuration: {reason}")]
    Config { backend: &'static str, reason: String },

    /// A multi-host backend was configured with an empty host list.
    #[error("{0}: no hosts provided")]
    NoHosts(&'static str),

    /// TLS material could not be loaded.
    #[error("{backend} TLS error: {reason}")]
    Tls { backend: &'static str, reason: String },

    /// The driver refused to build a native handle.
    #[error("failed to build {backend} client: {reason}")]
    Construction { backend: &'static str, reason: String },

    /// A liveness check reached the backend and failed.
    #[error("{backend} liveness check failed: {reason}")]
    Liveness { backend: &'static str, reason: String },

    /// A probe did not finish in time.
    #[error("{backend} health check timed out after {timeout:?}")]
    Timeout { backend: &'static str, timeout: Duration },

    /// Too few hosts of a multi-host backend answered.
    #[error(transparent)]
    Quorum(#[from] QuorumError),

    /// The connection was released by `shutdown()`.
    #[error("{0} connection has been shut down")]
    ShutDown(&'static str),
}

impl ConnectError {
    /// Build a liveness error from anything printable.
    pub fn liveness(backend: &'static str, reason: impl fmt::Display) -> Self {
        Self::Liveness {
            backend,
            reason: reason.to_string(),
        }
    }

    /// Build a construction error from anything printable.
    pub fn construction(backend: &'static str, reason: impl fmt::Display) -> Self {
        Self::Construction {
            backend,
            reason: reason.to_string(),
        }
    }

    /// Build a configuration error.
    pub fn config(backend: &'static str, reason: impl fmt::Display) -> Self {
        Self::Config {
            backend,
            reason: reason.to_string(),
        }
    }

    /// True for errors raised while building the native handle.
    ///
    /// These are terminal: the connection never becomes usable.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::NoHosts(_) | Self::Tls { .. } | Self::Construction { .. }
        )
    }
}

/// One host that failed during a quorum evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFailure {
    pub host: String,
    pub reason: String,
}

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.host, self.reason)
    }
}

/// Composite error listing every host that failed a quorum evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumError {
    pub backend: &'static str,
    pub total: usize,
    pub failures: Vec<HostFailure>,
}

impl QuorumError {
    /// Hosts that failed, in configuration order.
    pub fn failed_hosts(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.host.as_str()).collect()
    }
}

impl fmt::Display for QuorumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} errors: {}/{} hosts failed [",
            self.backend,
            self.failures.len(),
            self.total
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", failure)?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for QuorumError {}

/// Result type for connector operations.
pub type ConnectResult<T> = Result<T, ConnectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_classification() {
        assert!(ConnectError::NoHosts("kafka").is_construction());
        assert!(ConnectError::config("redis", "missing host").is_construction());
        assert!(!ConnectError::liveness("etcd", "refused").is_construction());
        assert!(!ConnectError::Timeout {
            backend: "s3",
            timeout: Duration::from_secs(5)
        }
        .is_construction());
    }

    #[test]
    fn test_quorum_error_display_lists_hosts() {
        let err = QuorumError {
            backend: "etcd",
            total: 5,
            failures: vec![
                HostFailure {
                    host: "d:2379".into(),
                    reason: "connection refused".into(),
                },
                HostFailure {
                    host: "e:2379".into(),
                    reason: "timed out".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("etcd errors: 2/5 hosts failed"));
        assert!(text.contains("d:2379: connection refused"));
        assert!(text.contains("e:2379: timed out"));
        assert_eq!(err.failed_hosts(), vec!["d:2379", "e:2379"]);
    }

    #[test]
    fn test_error_display() {
        let err = ConnectError::NoHosts("kafka");
        assert_eq!(err.to_string(), "kafka: no hosts provided");
    }
}
