//! Columnar store (ClickHouse) connector.
//!
//! One `clickhouse::Client` per configured host, each carrying credentials,
//! database, compression and query settings. Hosts are tried in
//! configuration order; the first host that answers `SELECT 1` makes the
//! connector live. Concurrent queries are capped at `max_open_connections`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time;
use url::Url;
use uuid::Uuid;

use crate::connector::normalize::{fill, Normalize};
use crate::connector::Backend;
use crate::error::ConnectError;
use crate::net;

const KEY: &str = "clickhouse";

const DEFAULT_DIAL_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_OPEN_CONNECTIONS: usize = 60;
const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 30;
const DEFAULT_CONN_MAX_LIFETIME_SECS: u64 = 120;

/// Block compression method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Lz4,
}

impl From<Compression> for clickhouse::Compression {
    fn from(method: Compression) -> Self {
        match method {
            Compression::None => clickhouse::Compression::None,
            Compression::Lz4 => clickhouse::Compression::Lz4,
        }
    }
}

/// ClickHouse configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    pub database: String,
    pub login: String,
    pub password: String,
    /// HTTP interface addresses, opened in order.
    pub hosts: Vec<String>,
    pub dial_timeout_ms: u64,
    /// Cap on concurrent queries across all hosts.
    pub max_open_connections: usize,
    /// Idle keep-alive connections kept per host.
    pub max_idle_connections: usize,
    /// Idle keep-alive connections are dropped after this long.
    pub conn_max_lifetime_secs: u64,
    /// Server-side `max_execution_time` in seconds. 0 leaves the server default.
    pub max_exec_time_secs: u64,
    pub compression: Compression,
    pub secure: bool,
}

impl Normalize for ClickHouseConfig {
    fn normalize(mut self) -> Self {
        fill(&mut self.dial_timeout_ms, DEFAULT_DIAL_TIMEOUT_MS);
        fill(&mut self.max_open_connections, DEFAULT_MAX_OPEN_CONNECTIONS);
        fill(&mut self.max_idle_connections, DEFAULT_MAX_IDLE_CONNECTIONS);
        fill(&mut self.conn_max_lifetime_secs, DEFAULT_CONN_MAX_LIFETIME_SECS);
        self
    }
}

impl ClickHouseConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// Query settings sent with every statement.
    pub fn settings(&self) -> Vec<(&'static str, String)> {
        let mut settings = Vec::new();
        if self.max_exec_time_secs > 0 {
            settings.push(("max_execution_time", self.max_exec_time_secs.to_string()));
        }
        settings
    }

    /// Driver client for one endpoint.
    fn client_for(&self, endpoint: &Url) -> clickhouse::Client {
        let base = if self.secure {
            // TLS endpoints use the driver's own rustls transport.
            clickhouse::Client::default()
        } else {
            let mut connector = HttpConnector::new();
            connector.set_connect_timeout(Some(self.dial_timeout()));
            let http = HyperClient::builder(TokioExecutor::new())
                .pool_max_idle_per_host(self.max_idle_connections)
                .pool_idle_timeout(Duration::from_secs(self.conn_max_lifetime_secs))
                .build(connector);
            clickhouse::Client::with_http_client(http)
        };

        let mut client = base
            .with_url(endpoint.as_str())
            .with_compression(self.compression.into());
        if !self.database.is_empty() {
            client = client.with_database(&self.database);
        }
        if !self.login.is_empty() {
            client = client.with_user(&self.login);
        }
        if !self.password.is_empty() {
            client = client.with_password(&self.password);
        }
        for (name, value) in self.settings() {
            client = client.with_option(name, value);
        }
        client
    }
}

#[derive(Debug, Serialize)]
struct Details<'a> {
    hosts: &'a [String],
    database: &'a str,
}

/// Native ClickHouse handle: one driver client per host, in open order.
#[derive(Clone)]
pub struct ClickHouseClient {
    nodes: Vec<(Url, clickhouse::Client)>,
    open: Arc<Semaphore>,
}

impl std::fmt::Debug for ClickHouseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let endpoints: Vec<&str> = self.nodes.iter().map(|(url, _)| url.as_str()).collect();
        f.debug_struct("ClickHouseClient")
            .field("endpoints", &endpoints)
            .field("open_permits", &self.open.available_permits())
            .finish_non_exhaustive()
    }
}

impl ClickHouseClient {
    /// Endpoints in open order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Url> {
        self.nodes.iter().map(|(url, _)| url)
    }

    /// Driver clients in open order.
    pub fn clients(&self) -> impl Iterator<Item = &clickhouse::Client> {
        self.nodes.iter().map(|(_, client)| client)
    }

    /// Reserve one of the `max_open_connections` query slots.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ConnectError> {
        Arc::clone(&self.open)
            .acquire_owned()
            .await
            .map_err(|_| ConnectError::ShutDown(KEY))
    }

    async fn select_one(&self, client: &clickhouse::Client, timeout: Duration) -> Result<(), ConnectError> {
        let _permit = self.acquire().await?;
        match time::timeout(timeout, client.query("SELECT 1").fetch_one::<u8>()).await {
            Ok(Ok(1)) => Ok(()),
            Ok(Ok(other)) => Err(ConnectError::liveness(KEY, format!("SELECT 1 returned {}", other))),
            Ok(Err(e)) => Err(ConnectError::liveness(KEY, e)),
            Err(_) => Err(ConnectError::Timeout { backend: KEY, timeout }),
        }
    }
}

/// Marker type wiring ClickHouse into the generic connection lifecycle.
pub struct ClickHouse;

#[async_trait]
impl Backend for ClickHouse {
    const KEY: &'static str = KEY;
    type Config = ClickHouseConfig;
    type Handle = ClickHouseClient;

    fn connect(config: &ClickHouseConfig) -> Result<ClickHouseClient, ConnectError> {
        net::require_hosts(KEY, &config.hosts)?;
        let nodes = config
            .hosts
            .iter()
            .map(|host| {
                let endpoint = net::endpoint_url(KEY, host, config.secure)?;
                let client = config.client_for(&endpoint);
                Ok((endpoint, client))
            })
            .collect::<Result<Vec<_>, ConnectError>>()?;

        Ok(ClickHouseClient {
            nodes,
            open: Arc::new(Semaphore::new(config.max_open_connections)),
        })
    }

    async fn live(config: &ClickHouseConfig, client: &ClickHouseClient) -> Result<(), ConnectError> {
        let timeout = config.dial_timeout();
        let mut last_error = None;
        for (i, (endpoint, node)) in client.nodes.iter().enumerate() {
            match client.select_one(node, timeout).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(host_idx = i, endpoint = %endpoint, error = %e, "ClickHouse ping failed, trying next host");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(ConnectError::NoHosts(KEY)))
    }

    fn readiness_timeout(config: &ClickHouseConfig) -> Duration {
        config.dial_timeout() * config.hosts.len().max(1) as u32
    }

    fn name(config: &ClickHouseConfig, _id: Uuid) -> String {
        format!("name: {} hosts:{}", KEY, config.hosts.join(","))
    }

    fn details(config: &ClickHouseConfig) -> serde_json::Value {
        serde_json::to_value(Details {
            hosts: &config.hosts,
            database: &config.database,
        })
        .unwrap_or_default()
    }
}
