//! Distributed coordinator (etcd) connector.
//!
//! Liveness asks every endpoint for its maintenance status over the JSON
//! gateway and passes when the quorum holds. With a login configured, each
//! status call carries a token obtained from `v3/auth/authenticate`. Failed
//! calls are retried `max_unary_retries` times, `backoff_wait_between_ms`
//! apart, and request and response bodies are held to the configured
//! message size limits.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time;
use url::Url;
use uuid::Uuid;

use crate::connector::normalize::{fill, Normalize};
use crate::connector::Backend;
use crate::error::ConnectError;
use crate::health::{quorum, QUORUM_PROBE_GRACE};
use crate::net::{self, tls};

const KEY: &str = "etcd";

const DEFAULT_DIAL_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_CALL_SEND_MSG_SIZE: usize = 2 * 1024 * 1024;
const DEFAULT_MAX_CALL_RECV_MSG_SIZE: usize = i32::MAX as usize;
const DEFAULT_BACKOFF_WAIT_BETWEEN_MS: u64 = 25;

/// etcd client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EtcdConfig {
    /// Client endpoints (`host:port` or full URLs).
    pub hosts: Vec<String>,
    pub login: String,
    pub password: String,
    /// Inline CA bundle; enables TLS verification against these roots.
    pub pem: String,
    /// Timeout for establishing a connection, also bounds each call.
    pub dial_timeout_ms: u64,
    /// Keep-alive ping interval for idle transports. 0 disables.
    pub dial_keep_alive_time_secs: u64,
    /// Client-side request size limit in bytes.
    pub max_call_send_msg_size: usize,
    /// Client-side response size limit in bytes.
    pub max_call_recv_msg_size: usize,
    /// Extra attempts for a failed call. 0 disables retries.
    pub max_unary_retries: u32,
    pub backoff_wait_between_ms: u64,
}

impl Normalize for EtcdConfig {
    fn normalize(mut self) -> Self {
        fill(&mut self.dial_timeout_ms, DEFAULT_DIAL_TIMEOUT_MS);
        fill(&mut self.max_call_send_msg_size, DEFAULT_MAX_CALL_SEND_MSG_SIZE);
        fill(&mut self.max_call_recv_msg_size, DEFAULT_MAX_CALL_RECV_MSG_SIZE);
        fill(&mut self.backoff_wait_between_ms, DEFAULT_BACKOFF_WAIT_BETWEEN_MS);
        self
    }
}

impl EtcdConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_wait_between_ms)
    }

    /// Upper bound for one endpoint check, retries and backoff included.
    pub fn check_deadline(&self) -> Duration {
        let calls = if self.login.is_empty() { 1 } else { 2 };
        let attempts = self.max_unary_retries + 1;
        (self.dial_timeout() * calls) * attempts + self.backoff() * self.max_unary_retries
    }
}

#[derive(Debug, Serialize)]
struct Details<'a> {
    hosts: &'a [String],
    tls: bool,
}

#[derive(Serialize)]
struct AuthenticateRequest<'a> {
    name: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthenticateResponse {
    #[serde(default)]
    token: String,
}

/// Per-call limits copied from the configuration.
#[derive(Debug, Clone, Copy)]
struct CallLimits {
    timeout: Duration,
    max_send: usize,
    max_recv: usize,
    retries: u32,
    backoff: Duration,
}

/// Native etcd handle: an HTTP transport bound to every configured endpoint.
#[derive(Clone)]
pub struct EtcdClient {
    http: reqwest::Client,
    endpoints: Vec<(String, Url)>,
    credentials: Option<(String, String)>,
    limits: CallLimits,
}

impl std::fmt::Debug for EtcdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let endpoints: Vec<&str> = self.endpoints.iter().map(|(_, url)| url.as_str()).collect();
        f.debug_struct("EtcdClient")
            .field("endpoints", &endpoints)
            .field("login", &self.credentials.as_ref().map(|(login, _)| login))
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl EtcdClient {
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Endpoint URLs in configuration order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Url> {
        self.endpoints.iter().map(|(_, url)| url)
    }

    /// Login and password, when authentication is configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.credentials
            .as_ref()
            .map(|(login, password)| (login.as_str(), password.as_str()))
    }

    fn endpoint(&self, host: &str) -> Option<&Url> {
        self.endpoints
            .iter()
            .find(|(h, _)| h == host)
            .map(|(_, url)| url)
    }

    /// One gateway call with the size limits applied to both bodies.
    async fn call<T: Serialize>(
        &self,
        endpoint: &Url,
        path: &str,
        body: &T,
        token: Option<&str>,
    ) -> Result<Vec<u8>, ConnectError> {
        let limits = self.limits;
        let url = endpoint.join(path).map_err(|e| ConnectError::liveness(KEY, e))?;
        let payload = serde_json::to_vec(body).map_err(|e| ConnectError::liveness(KEY, e))?;
        if payload.len() > limits.max_send {
            return Err(ConnectError::liveness(
                KEY,
                format!("request of {} bytes exceeds send limit {}", payload.len(), limits.max_send),
            ));
        }

        let mut request = self
            .http
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);
        if let Some(token) = token {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| net::request_error(KEY, limits.timeout, e))?;
        net::check_status(KEY, &url, response.status())?;

        let too_large = |len: usize| {
            ConnectError::liveness(
                KEY,
                format!("response of {} bytes exceeds receive limit {}", len, limits.max_recv),
            )
        };
        if let Some(len) = response.content_length() {
            if len as usize > limits.max_recv {
                return Err(too_large(len as usize));
            }
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| net::request_error(KEY, limits.timeout, e))?;
        if bytes.len() > limits.max_recv {
            return Err(too_large(bytes.len()));
        }
        Ok(bytes.to_vec())
    }

    /// Exchange the configured login for a gateway token.
    pub async fn authenticate(&self, endpoint: &Url) -> Result<Option<String>, ConnectError> {
        let Some((name, password)) = self.credentials() else {
            return Ok(None);
        };
        let raw = self
            .call(endpoint, "v3/auth/authenticate", &AuthenticateRequest { name, password }, None)
            .await?;
        let response: AuthenticateResponse =
            serde_json::from_slice(&raw).map_err(|e| ConnectError::liveness(KEY, e))?;
        if response.token.is_empty() {
            return Err(ConnectError::liveness(KEY, "authenticate returned no token"));
        }
        Ok(Some(response.token))
    }

    async fn status_once(&self, endpoint: &Url) -> Result<(), ConnectError> {
        let token = self.authenticate(endpoint).await?;
        self.call(endpoint, "v3/maintenance/status", &serde_json::json!({}), token.as_deref())
            .await
            .map(|_| ())
    }

    /// Ask one endpoint for its maintenance status, retrying failed calls.
    pub async fn status(&self, endpoint: &Url) -> Result<(), ConnectError> {
        let mut attempt = 0;
        loop {
            match self.status_once(endpoint).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.limits.retries => {
                    attempt += 1;
                    tracing::debug!(endpoint = %endpoint, attempt, error = %e, "etcd status failed, retrying");
                    time::sleep(self.limits.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Marker type wiring etcd into the generic connection lifecycle.
pub struct Etcd;

#[async_trait]
impl Backend for Etcd {
    const KEY: &'static str = KEY;
    type Config = EtcdConfig;
    type Handle = EtcdClient;

    fn connect(config: &EtcdConfig) -> Result<EtcdClient, ConnectError> {
        net::require_hosts(KEY, &config.hosts)?;
        let roots = tls::optional_roots(KEY, &config.pem)?;
        let secure = !roots.is_empty();

        let endpoints = config
            .hosts
            .iter()
            .map(|host| Ok((host.clone(), net::endpoint_url(KEY, host, secure)?)))
            .collect::<Result<Vec<_>, ConnectError>>()?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.dial_timeout())
            .timeout(config.dial_timeout());
        if config.dial_keep_alive_time_secs > 0 {
            builder = builder.tcp_keepalive(Duration::from_secs(config.dial_keep_alive_time_secs));
        }
        let builder = tls::with_roots(KEY, builder, &roots)?;
        let http = builder
            .build()
            .map_err(|e| ConnectError::construction(KEY, e))?;

        let credentials = (!config.login.is_empty())
            .then(|| (config.login.clone(), config.password.clone()));

        Ok(EtcdClient {
            http,
            endpoints,
            credentials,
            limits: CallLimits {
                timeout: config.dial_timeout(),
                max_send: config.max_call_send_msg_size,
                max_recv: config.max_call_recv_msg_size,
                retries: config.max_unary_retries,
                backoff: config.backoff(),
            },
        })
    }

    async fn live(config: &EtcdConfig, client: &EtcdClient) -> Result<(), ConnectError> {
        quorum::evaluate(KEY, &config.hosts, config.check_deadline(), |host| {
            let endpoint = client.endpoint(host).cloned();
            async move {
                match endpoint {
                    Some(endpoint) => client.status(&endpoint).await,
                    None => Err(ConnectError::liveness(KEY, "unknown endpoint")),
                }
            }
        })
        .await
        .map(|_| ())
    }

    fn readiness_timeout(config: &EtcdConfig) -> Duration {
        config.check_deadline() + QUORUM_PROBE_GRACE
    }

    fn name(config: &EtcdConfig, _id: Uuid) -> String {
        format!("name: {} hosts:{}", KEY, config.hosts.join(","))
    }

    fn details(config: &EtcdConfig) -> serde_json::Value {
        serde_json::to_value(Details {
            hosts: &config.hosts,
            tls: !config.pem.trim().is_empty(),
        })
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn config(hosts: &[&str]) -> EtcdConfig {
        EtcdConfig {
            hosts: hosts.iter().map(|s| s.to_string()).collect(),
            login: "root".into(),
            password: "secret".into(),
            ..EtcdConfig::default()
        }
        .normalize()
    }

    /// Request seen by the fake gateway.
    #[derive(Debug, Clone)]
    struct Seen {
        path: String,
        authorization: Option<String>,
        body: String,
    }

    type Reply = Arc<dyn Fn(&Seen) -> (u16, String) + Send + Sync>;

    /// Minimal HTTP/1.1 gateway answering one request per connection.
    async fn gateway(reply: Reply) -> (String, Arc<Mutex<Vec<Seen>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let reply = reply.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut reader = BufReader::new(read);
                    let mut line = String::new();
                    if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                        return;
                    }
                    let path = line.split_whitespace().nth(1).unwrap_or("").trim_start_matches('/').to_string();
                    let mut authorization = None;
                    let mut length = 0usize;
                    loop {
                        let mut header = String::new();
                        reader.read_line(&mut header).await.unwrap();
                        let header = header.trim_end();
                        if header.is_empty() {
                            break;
                        }
                        if let Some((name, value)) = header.split_once(':') {
                            match name.to_ascii_lowercase().as_str() {
                                "authorization" => authorization = Some(value.trim().to_string()),
                                "content-length" => length = value.trim().parse().unwrap_or(0),
                                _ => {}
                            }
                        }
                    }
                    let mut body = vec![0u8; length];
                    reader.read_exact(&mut body).await.unwrap();
                    let request = Seen {
                        path,
                        authorization,
                        body: String::from_utf8_lossy(&body).into_owned(),
                    };
                    let (status, payload) = reply(&request);
                    log.lock().unwrap().push(request);
                    let response = format!(
                        "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        payload.len(),
                        payload
                    );
                    let _ = write.write_all(response.as_bytes()).await;
                });
            }
        });
        (addr, seen)
    }

    fn token_gateway() -> Reply {
        Arc::new(|req: &Seen| match req.path.as_str() {
            "v3/auth/authenticate" if req.body.contains("\"secret\"") => {
                (200, r#"{"header":{},"token":"tok-1"}"#.to_string())
            }
            "v3/auth/authenticate" => (400, r#"{"error":"authentication failed"}"#.to_string()),
            "v3/maintenance/status" if req.authorization.as_deref() == Some("tok-1") => {
                (200, r#"{"version":"3.5.9"}"#.to_string())
            }
            _ => (401, "{}".to_string()),
        })
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let cfg = config(&["a:2379"]);
        assert_eq!(cfg.dial_timeout_ms, 5_000);
        assert_eq!(cfg.max_call_send_msg_size, 2 * 1024 * 1024);
        assert_eq!(cfg.max_call_recv_msg_size, i32::MAX as usize);
        assert_eq!(cfg.backoff_wait_between_ms, 25);
        assert_eq!(cfg.max_unary_retries, 0);
    }

    #[test]
    fn test_normalize_keeps_explicit_and_is_idempotent() {
        let cfg = EtcdConfig {
            dial_timeout_ms: 250,
            ..EtcdConfig::default()
        }
        .normalize();
        assert_eq!(cfg.dial_timeout_ms, 250);
        assert_eq!(cfg.clone().normalize(), cfg);
    }

    #[test]
    fn test_check_deadline_covers_retries() {
        let mut cfg = config(&["a:2379"]);
        cfg.dial_timeout_ms = 100;
        assert_eq!(cfg.check_deadline(), Duration::from_millis(200));

        cfg.max_unary_retries = 2;
        cfg.backoff_wait_between_ms = 10;
        assert_eq!(cfg.check_deadline(), Duration::from_millis(620));

        cfg.login.clear();
        assert_eq!(cfg.check_deadline(), Duration::from_millis(320));
    }

    #[test]
    fn test_zero_hosts_rejected_at_construction() {
        let err = Etcd::connect(&config(&[])).unwrap_err();
        assert_eq!(err, ConnectError::NoHosts("etcd"));
    }

    #[test]
    fn test_invalid_pem_is_construction_error() {
        let mut cfg = config(&["a:2379"]);
        cfg.pem = "garbage".into();
        let err = Etcd::connect(&cfg).unwrap_err();
        assert!(err.is_construction());
    }

    #[test]
    fn test_details_are_redacted() {
        let details = Etcd::details(&config(&["a:2379", "b:2379"]));
        let text = details.to_string();
        assert!(text.contains("a:2379"));
        assert!(!text.contains("secret"));
        assert!(!text.contains("root"));
    }

    #[test]
    fn test_name_lists_hosts() {
        let cfg = config(&["a:2379", "b:2379"]);
        assert_eq!(Etcd::name(&cfg, Uuid::nil()), "name: etcd hosts:a:2379,b:2379");
    }

    #[tokio::test]
    async fn test_client_exposes_endpoints_and_credentials() {
        let client = Etcd::connect(&config(&["a:2379", "https://b:2379"])).unwrap();
        let urls: Vec<_> = client.endpoints().map(|u| u.as_str().to_string()).collect();
        assert_eq!(urls, vec!["http://a:2379/", "https://b:2379/"]);
        assert_eq!(client.credentials(), Some(("root", "secret")));
        assert!(!format!("{:?}", client).contains("secret"));
    }

    #[tokio::test]
    async fn test_status_carries_authenticate_token() {
        let (addr, seen) = gateway(token_gateway()).await;
        let cfg = config(&[&addr]);
        let client = Etcd::connect(&cfg).unwrap();

        Etcd::live(&cfg, &client).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        let paths: Vec<_> = seen.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["v3/auth/authenticate", "v3/maintenance/status"]);
        assert!(seen[0].body.contains("\"name\":\"root\""));
        assert_eq!(seen[1].authorization.as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn test_rejected_login_is_not_live() {
        let (addr, seen) = gateway(token_gateway()).await;
        let mut cfg = config(&[&addr]);
        cfg.password = "wrong".into();
        let client = Etcd::connect(&cfg).unwrap();

        assert!(Etcd::live(&cfg, &client).await.is_err());
        let seen = seen.lock().unwrap();
        assert!(seen.iter().all(|s| s.path != "v3/maintenance/status"));
    }

    #[tokio::test]
    async fn test_anonymous_status_sends_no_token() {
        let (addr, seen) = gateway(Arc::new(|req: &Seen| match req.authorization {
            None => (200, "{}".to_string()),
            Some(_) => (400, "{}".to_string()),
        }))
        .await;
        let mut cfg = config(&[&addr]);
        cfg.login.clear();
        let client = Etcd::connect(&cfg).unwrap();

        Etcd::live(&cfg, &client).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_calls_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let (addr, _) = gateway(Arc::new(move |_: &Seen| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, "{}".to_string())
            } else {
                (200, "{}".to_string())
            }
        }))
        .await;

        let mut cfg = config(&[&addr]);
        cfg.login.clear();
        cfg.max_unary_retries = 1;
        let client = Etcd::connect(&cfg).unwrap();
        assert!(Etcd::live(&cfg, &client).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cfg.max_unary_retries = 2;
        let client = Etcd::connect(&cfg).unwrap();
        Etcd::live(&cfg, &client).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_oversized_response_is_rejected() {
        let (addr, _) = gateway(Arc::new(|_: &Seen| (200, format!("{{\"pad\":\"{}\"}}", "x".repeat(64))))).await;
        let mut cfg = config(&[&addr]);
        cfg.login.clear();
        cfg.max_call_recv_msg_size = 32;
        let client = Etcd::connect(&cfg).unwrap();

        let endpoint = client.endpoints().next().unwrap().clone();
        let err = client.status(&endpoint).await.unwrap_err();
        assert!(err.to_string().contains("receive limit"), "{}", err);
    }

    #[tokio::test]
    async fn test_oversized_request_never_leaves_client() {
        let (addr, seen) = gateway(token_gateway()).await;
        let mut cfg = config(&[&addr]);
        cfg.max_call_send_msg_size = 8;
        let client = Etcd::connect(&cfg).unwrap();

        let endpoint = client.endpoints().next().unwrap().clone();
        let err = client.authenticate(&endpoint).await.unwrap_err();
        assert!(err.to_string().contains("send limit"), "{}", err);
        assert!(seen.lock().unwrap().is_empty());
    }
}
