//! Network helpers shared by the connectors.
//!
//! # Responsibilities
//! - Turn configured host strings into endpoint URLs
//! - TLS root loading from inline PEM (tls.rs)

pub mod tls;

use std::time::Duration;

use url::Url;

use crate::error::ConnectError;

/// Reject an empty host list or blank entries.
pub fn require_hosts(backend: &'static str, hosts: &[String]) -> Result<(), ConnectError> {
    if hosts.is_empty() {
        return Err(ConnectError::NoHosts(backend));
    }
    if hosts.iter().any(|h| h.trim().is_empty()) {
        return Err(ConnectError::config(backend, "blank host entry"));
    }
    Ok(())
}

/// Build an endpoint URL from `host`, adding a scheme if none is present.
pub fn endpoint_url(backend: &'static str, host: &str, secure: bool) -> Result<Url, ConnectError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ConnectError::config(backend, "host is empty"));
    }
    let raw = if host.contains("://") {
        host.to_string()
    } else {
        let scheme = if secure { "https" } else { "http" };
        format!("{}://{}", scheme, host)
    };
    Url::parse(&raw).map_err(|e| ConnectError::config(backend, format!("invalid host '{}': {}", host, e)))
}

/// Map an HTTP response status to a liveness result.
pub fn check_status(backend: &'static str, url: &Url, status: reqwest::StatusCode) -> Result<(), ConnectError> {
    if status.is_success() {
        return Ok(());
    }
    Err(ConnectError::liveness(
        backend,
        format!("{} returned status {}", url, status.as_u16()),
    ))
}

/// Map a transport error to a liveness error, keeping timeouts distinct.
pub fn request_error(backend: &'static str, timeout: Duration, err: reqwest::Error) -> ConnectError {
    if err.is_timeout() {
        ConnectError::Timeout { backend, timeout }
    } else {
        ConnectError::liveness(backend, err)
    }
}
