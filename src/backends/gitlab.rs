//! Code-hosting API (GitLab) connector.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::connector::normalize::{fill, Normalize};
use crate::connector::Backend;
use crate::error::ConnectError;
use crate::net;

const KEY: &str = "gitlab";

const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 5_000;
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// GitLab API configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GitLabConfig {
    /// Instance base URL, e.g. `https://gitlab.example.com`.
    pub host: String,
    /// Personal or project access token.
    pub token: String,
    pub health_timeout_ms: u64,
}

impl Normalize for GitLabConfig {
    fn normalize(mut self) -> Self {
        fill(&mut self.health_timeout_ms, DEFAULT_HEALTH_TIMEOUT_MS);
        self
    }
}

impl GitLabConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

#[derive(Debug, Serialize)]
struct Details<'a> {
    host: &'a str,
}

/// Native GitLab handle: an authenticated client bound to `api/v4/`.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    api: Url,
}

impl GitLabClient {
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// API root (`<host>/api/v4/`).
    pub fn api_url(&self) -> &Url {
        &self.api
    }

    /// List a single user; proves the API answers and the token is accepted.
    pub async fn list_users(&self, timeout: Duration) -> Result<(), ConnectError> {
        let url = self
            .api
            .join("users?per_page=1")
            .map_err(|e| ConnectError::liveness(KEY, e))?;
        let response = self
            .http
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| net::request_error(KEY, timeout, e))?;
        net::check_status(KEY, &url, response.status())
    }
}

/// Marker type wiring GitLab into the generic connection lifecycle.
pub struct GitLab;

#[async_trait]
impl Backend for GitLab {
    const KEY: &'static str = KEY;
    type Config = GitLabConfig;
    type Handle = GitLabClient;

    fn connect(config: &GitLabConfig) -> Result<GitLabClient, ConnectError> {
        let mut base = net::endpoint_url(KEY, &config.host, true)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let api = base
            .join("api/v4/")
            .map_err(|e| ConnectError::config(KEY, e))?;

        let mut headers = HeaderMap::new();
        if !config.token.is_empty() {
            let mut value = HeaderValue::from_str(&config.token)
                .map_err(|_| ConnectError::config(KEY, "token is not a valid header value"))?;
            value.set_sensitive(true);
            headers.insert(TOKEN_HEADER, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConnectError::construction(KEY, e))?;

        Ok(GitLabClient { http, api })
    }

    async fn live(config: &GitLabConfig, client: &GitLabClient) -> Result<(), ConnectError> {
        client.list_users(config.health_timeout()).await
    }

    fn readiness_timeout(config: &GitLabConfig) -> Duration {
        config.health_timeout()
    }

    fn name(config: &GitLabConfig, _id: Uuid) -> String {
        format!("name: {} host:{}", KEY, config.host)
    }

    fn details(config: &GitLabConfig) -> serde_json::Value {
        serde_json::to_value(Details { host: &config.host }).unwrap_or_default()
    }
}
