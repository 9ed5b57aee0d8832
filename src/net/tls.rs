//! TLS root certificate loading.

use std::sync::Arc;

use crate::error::ConnectError;

/// Parse every certificate from an inline PEM bundle (CA roots).
///
/// Returns DER bytes, one entry per certificate.
pub fn load_ca_pem(backend: &'static str, pem: &str) -> Result<Vec<Vec<u8>>, ConnectError> {
    let mut reader = pem.as_bytes();
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectError::Tls {
            backend,
            reason: format!("invalid PEM: {}", e),
        })?;

    if certs.is_empty() {
        return Err(ConnectError::Tls {
            backend,
            reason: "no certificates found in PEM".to_string(),
        });
    }

    Ok(certs.into_iter().map(|cert| cert.to_vec()).collect())
}

/// Load optional PEM roots; an empty string means "no custom roots".
pub fn optional_roots(backend: &'static str, pem: &str) -> Result<Vec<Vec<u8>>, ConnectError> {
    if pem.trim().is_empty() {
        return Ok(Vec::new());
    }
    load_ca_pem(backend, pem)
}

/// Add DER roots to an HTTP client builder.
pub fn with_roots(
    backend: &'static str,
    mut builder: reqwest::ClientBuilder,
    roots: &[Vec<u8>],
) -> Result<reqwest::ClientBuilder, ConnectError> {
    for der in roots {
        let cert = reqwest::Certificate::from_der(der).map_err(|e| ConnectError::Tls {
            backend,
            reason: e.to_string(),
        })?;
        builder = builder.add_root_certificate(cert);
    }
    Ok(builder)
}

/// Build a rustls client config trusting only `roots`, for drivers that take
/// one directly.
pub fn client_config(
    backend: &'static str,
    roots: &[Vec<u8>],
) -> Result<Arc<rustls::ClientConfig>, ConnectError> {
    let mut store = rustls::RootCertStore::empty();
    for der in roots {
        store
            .add(&rustls::Certificate(der.clone()))
            .map_err(|e| ConnectError::Tls {
                backend,
                reason: format!("invalid CA certificate: {:?}", e),
            })?;
    }
    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(store)
        .with_no_client_auth();
    Ok(Arc::new(config))
}
