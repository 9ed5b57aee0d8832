//! Message queue (Kafka) producer connector.
//!
//! The native handle builds `rskafka` clients with the configured SASL PLAIN
//! credentials and TLS roots. Liveness bootstraps a client against every
//! broker on its own (handshake, authentication and a metadata round trip)
//! and passes on quorum. Writer tuning is applied by [`BrokerSet::produce`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rskafka::client::partition::{Compression as WireCompression, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder, SaslConfig};
use rskafka::record::Record;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::time;
use uuid::Uuid;

use crate::connector::normalize::{fill, Normalize};
use crate::connector::Backend;
use crate::error::ConnectError;
use crate::health::{quorum, QUORUM_PROBE_GRACE};
use crate::net::{self, tls};

const KEY: &str = "kafka-producer";

const DEFAULT_DIAL_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_BATCH_BYTES: usize = 1_048_576;
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_WRITE_BACKOFF_MIN_MS: u64 = 100;
const DEFAULT_WRITE_BACKOFF_MAX_MS: u64 = 1_000;

/// Message compression codec used by the writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
    #[default]
    Snappy,
    Lz4,
    Zstd,
}

impl From<Compression> for WireCompression {
    fn from(codec: Compression) -> Self {
        match codec {
            Compression::None => WireCompression::NoCompression,
            Compression::Gzip => WireCompression::Gzip,
            Compression::Snappy => WireCompression::Snappy,
            Compression::Lz4 => WireCompression::Lz4,
            Compression::Zstd => WireCompression::Zstd,
        }
    }
}

/// Kafka producer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Bootstrap brokers (`host:port`).
    pub hosts: Vec<String>,
    /// Topic every message is written to.
    pub topic: String,
    /// Wait for an unknown topic to appear instead of failing the write.
    pub allow_auto_topic_creation: bool,
    pub max_attempts: u32,
    pub write_backoff_min_ms: u64,
    pub write_backoff_max_ms: u64,
    /// Records per produce request.
    pub batch_size: usize,
    /// Largest message the client will send or accept, in bytes.
    pub batch_bytes: usize,
    /// Bound on one produce attempt.
    pub write_timeout_ms: u64,
    pub compression: Compression,
    /// Bound on reaching one broker (TLS and SASL included).
    pub dial_timeout_ms: u64,
    /// SASL PLAIN login; empty disables SASL.
    pub login: String,
    pub password: String,
    pub pem: String,
}

impl Normalize for KafkaConfig {
    fn normalize(mut self) -> Self {
        fill(&mut self.dial_timeout_ms, DEFAULT_DIAL_TIMEOUT_MS);
        fill(&mut self.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS);
        fill(&mut self.batch_size, DEFAULT_BATCH_SIZE);
        fill(&mut self.batch_bytes, DEFAULT_BATCH_BYTES);
        fill(&mut self.max_attempts, DEFAULT_MAX_ATTEMPTS);
        fill(&mut self.write_backoff_min_ms, DEFAULT_WRITE_BACKOFF_MIN_MS);
        fill(&mut self.write_backoff_max_ms, DEFAULT_WRITE_BACKOFF_MAX_MS);
        self
    }
}

impl KafkaConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }
}

#[derive(Debug, Serialize)]
struct Details<'a> {
    hosts: &'a [String],
    topic: &'a str,
}

/// SASL PLAIN credentials.
#[derive(Clone)]
pub struct SaslPlain {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SaslPlain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaslPlain")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Writer tuning applied by [`BrokerSet::produce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterSettings {
    pub topic: String,
    pub compression: Compression,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub write_timeout: Duration,
    pub unknown_topic_wait: bool,
}

impl WriterSettings {
    /// Backoff before retry number `attempt` (1-based): doubles from the
    /// minimum, capped at the maximum.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_min
            .checked_mul(factor)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }
}

/// Native Kafka handle: broker set, security settings and a lazily
/// bootstrapped cluster client.
pub struct BrokerSet {
    brokers: Vec<String>,
    dial_timeout: Duration,
    max_message_size: usize,
    sasl: Option<SaslPlain>,
    tls: Option<Arc<rustls::ClientConfig>>,
    writer: WriterSettings,
    client: OnceCell<Arc<Client>>,
}

impl std::fmt::Debug for BrokerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSet")
            .field("brokers", &self.brokers)
            .field("sasl", &self.sasl)
            .field("tls", &self.tls.is_some())
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

impl BrokerSet {
    pub fn brokers(&self) -> &[String] {
        &self.brokers
    }

    pub fn sasl(&self) -> Option<&SaslPlain> {
        self.sasl.as_ref()
    }

    pub fn uses_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn writer(&self) -> &WriterSettings {
        &self.writer
    }

    fn builder(&self, brokers: Vec<String>) -> ClientBuilder {
        let mut builder = ClientBuilder::new(brokers).max_message_size(self.max_message_size);
        if let Some(sasl) = &self.sasl {
            builder = builder.sasl_config(SaslConfig::Plain {
                username: sasl.username.clone(),
                password: sasl.password.clone(),
            });
        }
        if let Some(tls) = &self.tls {
            builder = builder.tls_config(Arc::clone(tls));
        }
        builder
    }

    async fn bootstrap(&self, brokers: Vec<String>) -> Result<Client, ConnectError> {
        match time::timeout(self.dial_timeout, self.builder(brokers).build()).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(e)) => Err(ConnectError::liveness(KEY, e)),
            Err(_) => Err(ConnectError::Timeout {
                backend: KEY,
                timeout: self.dial_timeout,
            }),
        }
    }

    /// Reach one broker: connect, authenticate and fetch metadata.
    pub async fn check(&self, broker: &str) -> Result<(), ConnectError> {
        let client = self.bootstrap(vec![broker.to_string()]).await?;
        client
            .list_topics()
            .await
            .map(drop)
            .map_err(|e| ConnectError::liveness(KEY, format!("{}: {}", broker, e)))
    }

    /// The cluster client, bootstrapped on first use from every broker.
    pub async fn client(&self) -> Result<Arc<Client>, ConnectError> {
        self.client
            .get_or_try_init(|| async { self.bootstrap(self.brokers.clone()).await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Write `records` to `partition` of the configured topic in batches of
    /// `batch_size`, retrying each batch up to `max_attempts` times.
    /// Returns the assigned offsets.
    pub async fn produce(&self, partition: i32, records: Vec<Record>) -> Result<Vec<i64>, ConnectError> {
        let writer = &self.writer;
        if writer.topic.is_empty() {
            return Err(ConnectError::config(KEY, "produce requires a topic"));
        }
        let unknown_topic = if writer.unknown_topic_wait {
            UnknownTopicHandling::Retry
        } else {
            UnknownTopicHandling::Error
        };
        let partition_client = self
            .client()
            .await?
            .partition_client(writer.topic.clone(), partition, unknown_topic)
            .await
            .map_err(|e| ConnectError::liveness(KEY, e))?;

        let mut offsets = Vec::with_capacity(records.len());
        for batch in records.chunks(writer.batch_size.max(1)) {
            let mut attempt = 1;
            loop {
                let sent = time::timeout(
                    writer.write_timeout,
                    partition_client.produce(batch.to_vec(), writer.compression.into()),
                )
                .await;
                let error = match sent {
                    Ok(Ok(batch_offsets)) => {
                        offsets.extend(batch_offsets);
                        break;
                    }
                    Ok(Err(e)) => ConnectError::liveness(KEY, e),
                    Err(_) => ConnectError::Timeout {
                        backend: KEY,
                        timeout: writer.write_timeout,
                    },
                };
                if attempt >= writer.max_attempts {
                    return Err(error);
                }
                tracing::warn!(backend = KEY, attempt, error = %error, "Produce failed, retrying");
                time::sleep(writer.backoff(attempt)).await;
                attempt += 1;
            }
        }
        Ok(offsets)
    }
}

/// Marker type wiring Kafka into the generic connection lifecycle.
pub struct Kafka;

#[async_trait]
impl Backend for Kafka {
    const KEY: &'static str = KEY;
    type Config = KafkaConfig;
    type Handle = BrokerSet;

    fn connect(config: &KafkaConfig) -> Result<BrokerSet, ConnectError> {
        net::require_hosts(KEY, &config.hosts)?;
        if config.write_backoff_min_ms > config.write_backoff_max_ms {
            return Err(ConnectError::config(
                KEY,
                "write_backoff_min_ms exceeds write_backoff_max_ms",
            ));
        }
        let roots = tls::optional_roots(KEY, &config.pem)?;
        let tls = if roots.is_empty() {
            None
        } else {
            Some(tls::client_config(KEY, &roots)?)
        };
        let sasl = (!config.login.is_empty()).then(|| SaslPlain {
            username: config.login.clone(),
            password: config.password.clone(),
        });

        Ok(BrokerSet {
            brokers: config.hosts.clone(),
            dial_timeout: config.dial_timeout(),
            max_message_size: config.batch_bytes,
            sasl,
            tls,
            writer: WriterSettings {
                topic: config.topic.clone(),
                compression: config.compression,
                batch_size: config.batch_size,
                max_attempts: config.max_attempts,
                backoff_min: Duration::from_millis(config.write_backoff_min_ms),
                backoff_max: Duration::from_millis(config.write_backoff_max_ms),
                write_timeout: Duration::from_millis(config.write_timeout_ms),
                unknown_topic_wait: config.allow_auto_topic_creation,
            },
            client: OnceCell::new(),
        })
    }

    async fn live(config: &KafkaConfig, brokers: &BrokerSet) -> Result<(), ConnectError> {
        quorum::evaluate(KEY, &config.hosts, config.dial_timeout(), |host| {
            let host = host.to_string();
            async move { brokers.check(&host).await }
        })
        .await
        .map(|_| ())
    }

    fn readiness_timeout(config: &KafkaConfig) -> Duration {
        config.dial_timeout() + QUORUM_PROBE_GRACE
    }

    fn name(config: &KafkaConfig, _id: Uuid) -> String {
        format!("name: {} hosts:{} topic:{}", KEY, config.hosts.join(","), config.topic)
    }

    fn details(config: &KafkaConfig) -> serde_json::Value {
        serde_json::to_value(Details {
            hosts: &config.hosts,
            topic: &config.topic,
        })
        .unwrap_or_default()
    }
}
