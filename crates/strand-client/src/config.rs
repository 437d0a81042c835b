// Client defaults and environment/YAML overrides.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::time::Duration;
use strand_transport::{DEFAULT_ALPN, TransportConfig};

use crate::client::RequestPolicy;

pub(crate) const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub(crate) const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub(crate) const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;
pub(crate) const DEFAULT_CONCURRENCY_LIMIT: usize = 64;
pub(crate) const DEFAULT_CONN_POOL: usize = 1;
pub(crate) const DEFAULT_EVENT_FEED_DEPTH: usize = 1024;

/// Cap on any single frame a peer may announce. Override with `STRAND_MAX_FRAME_BYTES`.
pub(crate) const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// ALPN advertised by `Client::connect` unless the target names its own.
pub(crate) fn default_alpn() -> Vec<String> {
    vec![String::from_utf8_lossy(DEFAULT_ALPN).into_owned()]
}

pub const DEFAULT_USER_AGENT: &str = concat!("strand/", env!("CARGO_PKG_VERSION"));

/// Client settings.
///
/// ```
/// use strand_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::default();
/// assert_eq!(config.conn_pool, 1);
/// assert_eq!(config.policy().timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub concurrency_limit: usize,
    /// Connections opened by `Client::connect` when no source addresses are given.
    pub conn_pool: usize,
    /// One connection per address, replacing `conn_pool` when non-empty.
    pub source_addresses: Vec<IpAddr>,
    pub event_feed_depth: usize,
    pub max_frame_bytes: usize,
    pub user_agent: String,
    /// Handshake protocols, in preference order. Must overlap with the server's.
    pub alpn: Vec<String>,
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            conn_pool: DEFAULT_CONN_POOL,
            source_addresses: Vec::new(),
            event_feed_depth: DEFAULT_EVENT_FEED_DEPTH,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            alpn: default_alpn(),
            transport: TransportConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct ClientConfigOverride {
    request_timeout_ms: Option<u64>,
    max_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
    concurrency_limit: Option<usize>,
    conn_pool: Option<usize>,
    source_addresses: Option<Vec<IpAddr>>,
    event_feed_depth: Option<usize>,
    max_frame_bytes: Option<usize>,
    user_agent: Option<String>,
    alpn: Option<Vec<String>>,
    max_streams: Option<u32>,
    idle_timeout_ms: Option<u64>,
}

impl ClientConfig {
    /// Defaults, then `STRAND_*` environment variables, then the YAML file at
    /// `config_path` (or `STRAND_CLIENT_CONFIG`).
    pub fn from_env_or_yaml(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::from_env();
        let override_path = config_path
            .map(|value| value.to_string())
            .or_else(|| std::env::var("STRAND_CLIENT_CONFIG").ok());
        if let Some(path) = override_path.as_deref() {
            let contents =
                fs::read_to_string(path).with_context(|| format!("read client config: {path}"))?;
            let override_cfg: ClientConfigOverride =
                serde_yaml::from_str(&contents).context("parse client config yaml")?;
            override_cfg.apply(&mut config);
        }
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = read_u64_env("STRAND_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = value;
        }
        if let Some(value) = read_u64_env("STRAND_MAX_ATTEMPTS") {
            config.max_attempts = u32::try_from(value).unwrap_or(u32::MAX);
        }
        if let Some(value) = read_u64_env("STRAND_RETRY_BACKOFF_MS") {
            config.retry_backoff_ms = value;
        }
        if let Some(value) = read_usize_env("STRAND_CONCURRENCY_LIMIT") {
            config.concurrency_limit = value;
        }
        if let Some(value) = read_usize_env("STRAND_CONN_POOL") {
            config.conn_pool = value;
        }
        if let Some(value) = read_addrs_env("STRAND_SOURCE_ADDRESSES") {
            config.source_addresses = value;
        }
        if let Some(value) = read_usize_env("STRAND_EVENT_FEED_DEPTH") {
            config.event_feed_depth = value;
        }
        if let Some(value) = read_usize_env("STRAND_MAX_FRAME_BYTES") {
            config.max_frame_bytes = value;
        }
        if let Ok(value) = std::env::var("STRAND_USER_AGENT")
            && !value.is_empty()
        {
            config.user_agent = value;
        }
        if let Some(value) = read_list_env("STRAND_ALPN") {
            config.alpn = value;
        }
        if let Some(value) = read_u64_env("STRAND_MAX_STREAMS") {
            config.transport.max_streams = u32::try_from(value).unwrap_or(u32::MAX);
        }
        if let Some(value) = read_u64_env("STRAND_IDLE_TIMEOUT_MS") {
            config.transport.idle_timeout_ms = value;
        }
        config
    }

    pub fn policy(&self) -> RequestPolicy {
        RequestPolicy {
            timeout: Duration::from_millis(self.request_timeout_ms),
            max_attempts: self.max_attempts.max(1),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

impl ClientConfigOverride {
    fn apply(self, config: &mut ClientConfig) {
        if let Some(value) = self.request_timeout_ms
            && value > 0
        {
            config.request_timeout_ms = value;
        }
        if let Some(value) = self.max_attempts
            && value > 0
        {
            config.max_attempts = value;
        }
        if let Some(value) = self.retry_backoff_ms
            && value > 0
        {
            config.retry_backoff_ms = value;
        }
        if let Some(value) = self.concurrency_limit
            && value > 0
        {
            config.concurrency_limit = value;
        }
        if let Some(value) = self.conn_pool
            && value > 0
        {
            config.conn_pool = value;
        }
        if let Some(value) = self.source_addresses
            && !value.is_empty()
        {
            config.source_addresses = value;
        }
        if let Some(value) = self.event_feed_depth
            && value > 0
        {
            config.event_feed_depth = value;
        }
        if let Some(value) = self.max_frame_bytes
            && value > 0
        {
            config.max_frame_bytes = value;
        }
        if let Some(value) = self.user_agent
            && !value.is_empty()
        {
            config.user_agent = value;
        }
        if let Some(value) = self.alpn
            && !value.is_empty()
        {
            config.alpn = value;
        }
        if let Some(value) = self.max_streams
            && value > 0
        {
            config.transport.max_streams = value;
        }
        if let Some(value) = self.idle_timeout_ms
            && value > 0
        {
            config.transport.idle_timeout_ms = value;
        }
    }
}

fn read_u64_env(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
}

fn read_usize_env(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
}

fn read_list_env(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    (!items.is_empty()).then_some(items)
}

// Comma-separated; any unparsable entry discards the whole variable.
fn read_addrs_env(key: &str) -> Option<Vec<IpAddr>> {
    let raw = std::env::var(key).ok()?;
    let addrs = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<IpAddr>())
        .collect::<Result<Vec<_>, _>>();
    match addrs {
        Ok(addrs) if !addrs.is_empty() => Some(addrs),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(key, error = %err, "ignoring invalid source address list");
            None
        }
    }
}
