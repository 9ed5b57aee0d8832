//! Generic HTTP peer connector.
//!
//! The handle is a client bound to a base URL with default headers. Liveness
//! fetches the configured health path; any status above 400 fails it.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::connector::normalize::{fill, Normalize};
use crate::connector::Backend;
use crate::error::ConnectError;
use crate::net;

const KEY: &str = "http";

const DEFAULT_TIMEOUT_MS: u64 = 3_000;

/// HTTP peer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL every request is resolved against.
    pub url: String,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Health path (or absolute URL) fetched by liveness.
    pub health_host: String,
    pub timeout_ms: u64,
}

impl Normalize for HttpConfig {
    fn normalize(mut self) -> Self {
        fill(&mut self.timeout_ms, DEFAULT_TIMEOUT_MS);
        self
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Serialize)]
struct Details<'a> {
    host: &'a str,
    health_host: &'a str,
    timeout_ms: u64,
}

/// Native HTTP handle.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base: Url,
    health: Url,
}

impl HttpClient {
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve `path` against the base URL.
    pub fn url(&self, path: &str) -> Result<Url, ConnectError> {
        self.base
            .join(path)
            .map_err(|e| ConnectError::config(KEY, format!("invalid path '{}': {}", path, e)))
    }

    async fn health(&self, timeout: Duration) -> Result<(), ConnectError> {
        let response = self
            .http
            .get(self.health.clone())
            .send()
            .await
            .map_err(|e| net::request_error(KEY, timeout, e))?;
        let status = response.status().as_u16();
        // 400 itself counts as reachable.
        if status > 400 {
            return Err(ConnectError::liveness(
                KEY,
                format!("error check component status code: {}", status),
            ));
        }
        Ok(())
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ConnectError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConnectError::config(KEY, format!("header '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ConnectError::config(KEY, format!("header '{}': {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Marker type wiring an HTTP peer into the generic connection lifecycle.
pub struct Http;

#[async_trait]
impl Backend for Http {
    const KEY: &'static str = KEY;
    type Config = HttpConfig;
    type Handle = HttpClient;

    fn connect(config: &HttpConfig) -> Result<HttpClient, ConnectError> {
        let base = net::endpoint_url(KEY, &config.url, false)?;
        let health = base
            .join(&config.health_host)
            .map_err(|e| ConnectError::config(KEY, format!("invalid health_host: {}", e)))?;

        let http = reqwest::Client::builder()
            .default_headers(header_map(&config.headers)?)
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConnectError::construction(KEY, e))?;

        Ok(HttpClient { http, base, health })
    }

    async fn live(config: &HttpConfig, client: &HttpClient) -> Result<(), ConnectError> {
        client.health(config.timeout()).await
    }

    fn readiness_timeout(config: &HttpConfig) -> Duration {
        config.timeout()
    }

    fn name(_config: &HttpConfig, id: Uuid) -> String {
        id.to_string()
    }

    fn details(config: &HttpConfig) -> serde_json::Value {
        serde_json::to_value(Details {
            host: &config.url,
            health_host: &config.health_host,
            timeout_ms: config.timeout_ms,
        })
        .unwrap_or_default()
    }
}
