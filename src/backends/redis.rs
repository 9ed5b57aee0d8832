//! Key/value cache (Redis) connector, standalone or behind Sentinel.
//!
//! Liveness opens a connection through the `redis` driver (AUTH and SELECT
//! happen during connection setup) and issues `PING`. Behind Sentinel the
//! master for `master_name` is resolved first and the `PING` goes to it, so a
//! topology without a master is never live.

use std::time::Duration;

use async_trait::async_trait;
use redis::sentinel::{Sentinel, SentinelNodeConnectionInfo};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::{Deserialize, Serialize};
use tokio::time;
use url::Url;
use uuid::Uuid;

use crate::connector::normalize::{fill, Normalize};
use crate::connector::Backend;
use crate::error::ConnectError;

const KEY: &str = "redis";

const DEFAULT_PORT: u16 = 6379;
const DEFAULT_SENTINEL_PORT: u16 = 26379;

const DEFAULT_DIAL_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5_000;

/// Redis configuration. A non-empty `sentinel_hosts` selects Sentinel mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Standalone server `host:port`.
    pub host: String,
    /// ACL user; empty uses the legacy single-password AUTH.
    pub login: String,
    pub password: String,
    pub database: u32,
    pub sentinel_hosts: Vec<String>,
    pub master_name: String,
    pub dial_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Normalize for RedisConfig {
    fn normalize(mut self) -> Self {
        fill(&mut self.dial_timeout_ms, DEFAULT_DIAL_TIMEOUT_MS);
        fill(&mut self.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
        fill(&mut self.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS);
        self
    }
}

impl RedisConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// Bound on one command: write the request, read the reply.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms + self.read_timeout_ms)
    }

    pub fn is_sentinel(&self) -> bool {
        !self.sentinel_hosts.is_empty()
    }
}

#[derive(Debug, Serialize)]
struct Details<'a> {
    host: &'a str,
    database: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    sentinel_hosts: &'a [String],
    #[serde(skip_serializing_if = "str::is_empty")]
    master_name: &'a str,
}

/// Where the client connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    Standalone { addr: String },
    Sentinel { master: String, sentinels: Vec<String> },
}

/// Parse `host:port` (or `redis://host:port`) into a driver address.
fn tcp_addr(host: &str, default_port: u16) -> Result<ConnectionAddr, ConnectError> {
    let host = host.trim();
    let raw = if host.contains("://") {
        host.to_string()
    } else {
        format!("redis://{}", host)
    };
    let url = Url::parse(&raw)
        .map_err(|e| ConnectError::config(KEY, format!("invalid host '{}': {}", host, e)))?;
    let name = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ConnectError::config(KEY, format!("invalid host '{}'", host)))?;
    Ok(ConnectionAddr::Tcp(
        name.to_string(),
        url.port().unwrap_or(default_port),
    ))
}

/// Native Redis handle.
#[derive(Clone)]
pub struct RedisClient {
    topology: Topology,
    /// Auth and database applied to the data node.
    node: RedisConnectionInfo,
    /// Standalone server; `None` behind Sentinel.
    client: Option<redis::Client>,
    sentinels: Vec<ConnectionInfo>,
    dial_timeout: Duration,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("topology", &self.topology)
            .field("username", &self.node.username)
            .field("database", &self.node.db)
            .finish_non_exhaustive()
    }
}

impl RedisClient {
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn database(&self) -> i64 {
        self.node.db
    }

    /// The standalone driver client. `None` behind Sentinel; use [`RedisClient::master`].
    pub fn client(&self) -> Option<&redis::Client> {
        self.client.as_ref()
    }

    /// Resolve the current master through the sentinels.
    pub async fn master(&self, name: &str) -> Result<redis::Client, ConnectError> {
        let mut sentinel = Sentinel::build(self.sentinels.clone())
            .map_err(|e| ConnectError::liveness(KEY, e))?;
        let node = SentinelNodeConnectionInfo {
            redis_connection_info: Some(self.node.clone()),
            ..SentinelNodeConnectionInfo::default()
        };
        match time::timeout(
            self.dial_timeout + self.command_timeout,
            sentinel.async_master_for(name, Some(&node)),
        )
        .await
        {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(e)) => Err(ConnectError::liveness(
                KEY,
                format!("resolve master '{}': {}", name, e),
            )),
            Err(_) => Err(ConnectError::Timeout {
                backend: KEY,
                timeout: self.dial_timeout + self.command_timeout,
            }),
        }
    }

    /// Connect (authenticating and selecting the database) and `PING`.
    pub async fn ping(&self, client: &redis::Client) -> Result<(), ConnectError> {
        let mut conn = match time::timeout(self.dial_timeout, client.get_multiplexed_async_connection()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(ConnectError::liveness(KEY, e)),
            Err(_) => {
                return Err(ConnectError::Timeout {
                    backend: KEY,
                    timeout: self.dial_timeout,
                })
            }
        };

        let reply: String = match time::timeout(self.command_timeout, redis::cmd("PING").query_async(&mut conn)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(ConnectError::liveness(KEY, e)),
            Err(_) => {
                return Err(ConnectError::Timeout {
                    backend: KEY,
                    timeout: self.command_timeout,
                })
            }
        };
        if reply != "PONG" {
            return Err(ConnectError::liveness(KEY, format!("unexpected PING reply '{}'", reply)));
        }
        Ok(())
    }
}

/// Marker type wiring Redis into the generic connection lifecycle.
pub struct Redis;

#[async_trait]
impl Backend for Redis {
    const KEY: &'static str = KEY;
    type Config = RedisConfig;
    type Handle = RedisClient;

    fn connect(config: &RedisConfig) -> Result<RedisClient, ConnectError> {
        let node = RedisConnectionInfo {
            db: i64::from(config.database),
            username: (!config.login.is_empty()).then(|| config.login.clone()),
            password: (!config.password.is_empty()).then(|| config.password.clone()),
            ..RedisConnectionInfo::default()
        };

        let (topology, client, sentinels) = if config.is_sentinel() {
            crate::net::require_hosts(KEY, &config.sentinel_hosts)?;
            if config.master_name.is_empty() {
                return Err(ConnectError::config(KEY, "master_name is required with sentinel_hosts"));
            }
            let sentinels = config
                .sentinel_hosts
                .iter()
                .map(|host| {
                    Ok(ConnectionInfo {
                        addr: tcp_addr(host, DEFAULT_SENTINEL_PORT)?,
                        redis: RedisConnectionInfo::default(),
                    })
                })
                .collect::<Result<Vec<_>, ConnectError>>()?;
            let topology = Topology::Sentinel {
                master: config.master_name.clone(),
                sentinels: config.sentinel_hosts.clone(),
            };
            (topology, None, sentinels)
        } else {
            if config.host.trim().is_empty() {
                return Err(ConnectError::NoHosts(KEY));
            }
            let info = ConnectionInfo {
                addr: tcp_addr(&config.host, DEFAULT_PORT)?,
                redis: node.clone(),
            };
            let client = redis::Client::open(info).map_err(|e| ConnectError::construction(KEY, e))?;
            let topology = Topology::Standalone {
                addr: config.host.clone(),
            };
            (topology, Some(client), Vec::new())
        };

        Ok(RedisClient {
            topology,
            node,
            client,
            sentinels,
            dial_timeout: config.dial_timeout(),
            command_timeout: config.command_timeout(),
        })
    }

    async fn live(config: &RedisConfig, client: &RedisClient) -> Result<(), ConnectError> {
        let outcome = match (client.client(), client.topology()) {
            (Some(standalone), _) => client.ping(standalone).await,
            (None, Topology::Sentinel { master, .. }) => match client.master(master).await {
                Ok(master) => client.ping(&master).await,
                Err(e) => Err(e),
            },
            (None, Topology::Standalone { .. }) => Err(ConnectError::NoHosts(KEY)),
        };
        if let Err(e) = &outcome {
            tracing::debug!(backend = KEY, sentinel = config.is_sentinel(), error = %e, "Redis ping failed");
        }
        outcome
    }

    fn readiness_timeout(config: &RedisConfig) -> Duration {
        if config.is_sentinel() {
            // Master lookup, then dial and PING the master.
            2 * (config.dial_timeout() + config.command_timeout())
        } else {
            config.dial_timeout() + config.command_timeout()
        }
    }

    fn name(config: &RedisConfig, _id: Uuid) -> String {
        if config.is_sentinel() {
            format!(
                "name: {} master:{} sentinels:{} database:{}",
                KEY,
                config.master_name,
                config.sentinel_hosts.join(","),
                config.database
            )
        } else {
            format!("name: {} host:{} database:{}", KEY, config.host, config.database)
        }
    }

    fn details(config: &RedisConfig) -> serde_json::Value {
        serde_json::to_value(Details {
            host: &config.host,
            database: config.database,
            sentinel_hosts: &config.sentinel_hosts,
            master_name: &config.master_name,
        })
        .unwrap_or_default()
    }
}
