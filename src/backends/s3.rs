//! Object store (S3 / MinIO) connector.
//!
//! The handle carries an `aws_sdk_s3::Client` configured for the endpoint
//! (path-style addressing, static credentials, `max_retries` extra attempts)
//! for callers issuing object operations. Liveness stays on the server
//! health endpoint, which needs neither a bucket nor a signature.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::connector::normalize::{fill, Normalize};
use crate::connector::Backend;
use crate::error::ConnectError;
use crate::net;

const KEY: &str = "s3";

const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_RETRIES: u32 = 10;
// MinIO ignores the region but request signing needs one.
const SIGNING_REGION: &str = "us-east-1";

/// S3 configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct S3Config {
    /// Endpoint `host:port`.
    pub host: String,
    pub login: String,
    pub password: String,
    /// Session token for temporary credentials.
    pub token: String,
    /// Use https.
    pub ssl: bool,
    pub max_retries: u32,
    pub health_timeout_ms: u64,
}

impl Normalize for S3Config {
    fn normalize(mut self) -> Self {
        fill(&mut self.health_timeout_ms, DEFAULT_HEALTH_TIMEOUT_MS);
        fill(&mut self.max_retries, DEFAULT_MAX_RETRIES);
        self
    }
}

impl S3Config {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    fn sdk_client(&self, endpoint: &Url, credentials: Option<&StaticCredentials>) -> aws_sdk_s3::Client {
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(self.health_timeout())
            .build();
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(SIGNING_REGION))
            .endpoint_url(endpoint.as_str().trim_end_matches('/'))
            .force_path_style(true)
            .retry_config(RetryConfig::standard().with_max_attempts(self.max_retries + 1))
            .timeout_config(timeouts);
        if let Some(creds) = credentials {
            builder = builder.credentials_provider(Credentials::new(
                creds.access_key.clone(),
                creds.secret_key.clone(),
                creds.session_token.clone(),
                None,
                "infra-connect",
            ));
        }
        aws_sdk_s3::Client::from_conf(builder.build())
    }
}

#[derive(Debug, Serialize)]
struct Details<'a> {
    host: &'a str,
    ssl: bool,
}

/// Static V4 credentials.
#[derive(Clone)]
pub struct StaticCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

/// Native S3 handle.
#[derive(Clone)]
pub struct S3Client {
    sdk: aws_sdk_s3::Client,
    http: reqwest::Client,
    endpoint: Url,
    credentials: Option<StaticCredentials>,
    max_retries: u32,
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("endpoint", &self.endpoint.as_str())
            .field("credentials", &self.credentials)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl S3Client {
    /// SDK client for object operations.
    pub fn sdk(&self) -> &aws_sdk_s3::Client {
        &self.sdk
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// `None` means anonymous access.
    pub fn credentials(&self) -> Option<&StaticCredentials> {
        self.credentials.as_ref()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Query the server liveness endpoint.
    pub async fn health_check(&self, timeout: Duration) -> Result<(), ConnectError> {
        let url = self
            .endpoint
            .join("minio/health/live")
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

/// Marker type wiring S3 into the generic connection lifecycle.
pub struct S3;

#[async_trait]
impl Backend for S3 {
    const KEY: &'static str = KEY;
    type Config = S3Config;
    type Handle = S3Client;

    fn connect(config: &S3Config) -> Result<S3Client, ConnectError> {
        let endpoint = net::endpoint_url(KEY, &config.host, config.ssl)?;
        let credentials = (!config.login.is_empty()).then(|| StaticCredentials {
            access_key: config.login.clone(),
            secret_key: config.password.clone(),
            session_token: (!config.token.is_empty()).then(|| config.token.clone()),
        });
        let http = reqwest::Client::builder()
            .connect_timeout(config.health_timeout())
            .build()
            .map_err(|e| ConnectError::construction(KEY, e))?;

        let sdk = config.sdk_client(&endpoint, credentials.as_ref());

        Ok(S3Client {
            sdk,
            http,
            endpoint,
            credentials,
            max_retries: config.max_retries,
        })
    }

    async fn live(config: &S3Config, client: &S3Client) -> Result<(), ConnectError> {
        client.health_check(config.health_timeout()).await
    }

    fn readiness_timeout(config: &S3Config) -> Duration {
        config.health_timeout()
    }

    fn name(config: &S3Config, _id: Uuid) -> String {
        format!("name: {} host:{}", KEY, config.host)
    }

    fn details(config: &S3Config) -> serde_json::Value {
        serde_json::to_value(Details {
            host: &config.host,
            ssl: config.ssl,
        })
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            host: "minio.local:9000".into(),
            login: "access".into(),
            password: "very-secret".into(),
            ..S3Config::default()
        }
        .normalize()
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let cfg = config();
        assert_eq!(cfg.health_timeout_ms, 5_000);
        assert_eq!(cfg.max_retries, 10);

        let explicit = S3Config {
            max_retries: 3,
            ..S3Config::default()
        }
        .normalize();
        assert_eq!(explicit.max_retries, 3);
    }

    #[tokio::test]
    async fn test_scheme_follows_ssl() {
        let client = S3::connect(&config()).unwrap();
        assert_eq!(client.endpoint().scheme(), "http");

        let mut cfg = config();
        cfg.ssl = true;
        assert_eq!(S3::connect(&cfg).unwrap().endpoint().scheme(), "https");
    }

    #[tokio::test]
    async fn test_credentials_redacted_in_debug_and_details() {
        let client = S3::connect(&config()).unwrap();
        assert_eq!(client.credentials().map(|c| c.access_key.as_str()), Some("access"));
        assert!(client.credentials().unwrap().session_token.is_none());
        assert!(!format!("{:?}", client).contains("very-secret"));
        assert!(!S3::details(&config()).to_string().contains("very-secret"));
    }

    #[tokio::test]
    async fn test_sdk_client_carries_retries_and_credentials() {
        let client = S3::connect(&config()).unwrap();
        let sdk = client.sdk().config();
        assert_eq!(sdk.retry_config().map(|r| r.max_attempts()), Some(11));
        assert_eq!(sdk.region().map(|r| r.as_ref()), Some("us-east-1"));
        assert!(sdk.credentials_provider().is_some());

        let anonymous = S3::connect(&S3Config {
            login: String::new(),
            max_retries: 2,
            ..config()
        })
        .unwrap();
        let sdk = anonymous.sdk().config();
        assert_eq!(sdk.retry_config().map(|r| r.max_attempts()), Some(3));
        assert!(sdk.credentials_provider().is_none());
    }

    #[tokio::test]
    async fn test_session_token_is_kept() {
        let client = S3::connect(&S3Config {
            token: "session".into(),
            ..config()
        })
        .unwrap();
        assert_eq!(
            client.credentials().and_then(|c| c.session_token.as_deref()),
            Some("session")
        );
    }

    #[test]
    fn test_empty_host_rejected() {
        let err = S3::connect(&S3Config::default().normalize()).unwrap_err();
        assert!(err.is_construction());
    }

    #[test]
    fn test_name() {
        assert_eq!(S3::name(&config(), Uuid::nil()), "name: s3 host:minio.local:9000");
    }
}
