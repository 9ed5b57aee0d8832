//! Relational store (PostgreSQL) connector backed by an `sqlx` pool.
//!
//! The pool is created lazily, so construction never touches the network;
//! the readiness probe makes the first connection.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use uuid::Uuid;

use crate::connector::normalize::{fill, Normalize};
use crate::connector::Backend;
use crate::error::ConnectError;
use crate::net::tls;

const KEY: &str = "postgres";

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_MAX_OPEN_CONNECTIONS: u32 = 60;
const DEFAULT_CONN_MAX_LIFETIME_SECS: u64 = 120;
const DEFAULT_CONN_MAX_IDLE_TIME_SECS: u64 = 20;
const DEFAULT_SSL_MODE: &str = "disable";
const DEFAULT_QUERY_EXEC_MODE: &str = "simple_protocol";
const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_STATEMENT_CACHE: usize = 100;

/// How statements are sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryExecMode {
    /// No prepared statement cache.
    SimpleProtocol,
    /// Prepared statements cached per connection.
    CacheStatement,
}

impl FromStr for QueryExecMode {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple_protocol" | "exec" => Ok(Self::SimpleProtocol),
            "cache_statement" | "cache_describe" | "describe_exec" => Ok(Self::CacheStatement),
            other => Err(ConnectError::config(KEY, format!("unknown query_exec_mode '{}'", other))),
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    pub database: String,
    /// libpq-style mode: disable, allow, prefer, require, verify-ca, verify-full.
    pub ssl_mode: String,
    /// Inline CA bundle for `verify-ca` / `verify-full`.
    pub pem: String,
    pub query_exec_mode: String,
    pub max_open_connections: u32,
    pub conn_max_lifetime_secs: u64,
    pub conn_max_idle_time_secs: u64,
    pub health_timeout_ms: u64,
}

impl Normalize for PostgresConfig {
    fn normalize(mut self) -> Self {
        fill(&mut self.port, DEFAULT_PORT);
        fill(&mut self.max_open_connections, DEFAULT_MAX_OPEN_CONNECTIONS);
        fill(&mut self.conn_max_lifetime_secs, DEFAULT_CONN_MAX_LIFETIME_SECS);
        fill(&mut self.conn_max_idle_time_secs, DEFAULT_CONN_MAX_IDLE_TIME_SECS);
        fill(&mut self.ssl_mode, DEFAULT_SSL_MODE.to_string());
        fill(&mut self.query_exec_mode, DEFAULT_QUERY_EXEC_MODE.to_string());
        fill(&mut self.health_timeout_ms, DEFAULT_HEALTH_TIMEOUT_MS);
        self
    }
}

impl PostgresConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    fn connect_options(&self) -> Result<PgConnectOptions, ConnectError> {
        if self.host.trim().is_empty() {
            return Err(ConnectError::NoHosts(KEY));
        }
        let ssl_mode = PgSslMode::from_str(&self.ssl_mode)
            .map_err(|e| ConnectError::config(KEY, format!("ssl_mode '{}': {}", self.ssl_mode, e)))?;
        let exec_mode: QueryExecMode = self.query_exec_mode.parse()?;

        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.login)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(ssl_mode)
            .statement_cache_capacity(match exec_mode {
                QueryExecMode::SimpleProtocol => 0,
                QueryExecMode::CacheStatement => DEFAULT_STATEMENT_CACHE,
            });

        if !tls::optional_roots(KEY, &self.pem)?.is_empty() {
            options = options.ssl_root_cert_from_pem(self.pem.as_bytes().to_vec());
        }
        Ok(options)
    }
}

#[derive(Debug, Serialize)]
struct Details<'a> {
    host: &'a str,
    port: u16,
    database: &'a str,
}

/// Marker type wiring PostgreSQL into the generic connection lifecycle.
pub struct Postgres;

#[async_trait]
impl Backend for Postgres {
    const KEY: &'static str = KEY;
    type Config = PostgresConfig;
    type Handle = PgPool;

    fn connect(config: &PostgresConfig) -> Result<PgPool, ConnectError> {
        let options = config.connect_options()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_open_connections)
            .max_lifetime(Duration::from_secs(config.conn_max_lifetime_secs))
            .idle_timeout(Duration::from_secs(config.conn_max_idle_time_secs))
            .acquire_timeout(config.health_timeout())
            .connect_lazy_with(options);
        Ok(pool)
    }

    async fn live(_config: &PostgresConfig, pool: &PgPool) -> Result<(), ConnectError> {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map(drop)
            .map_err(|e| ConnectError::liveness(KEY, e))
    }

    fn readiness_timeout(config: &PostgresConfig) -> Duration {
        config.health_timeout()
    }

    fn name(config: &PostgresConfig, _id: Uuid) -> String {
        format!(
            "name: {} host:{}:{} database:{}",
            KEY, config.host, config.port, config.database
        )
    }

    fn details(config: &PostgresConfig) -> serde_json::Value {
        serde_json::to_value(Details {
            host: &config.host,
            port: config.port,
            database: &config.database,
        })
        .unwrap_or_default()
    }

    async fn close(pool: &PgPool) -> Result<(), ConnectError> {
        pool.close().await;
        Ok(())
    }
}
