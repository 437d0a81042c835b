//! Pooled QUIC client for benchmark traffic.
//!
//! # Purpose
//! Opens the connection pool, wraps each connection with its own routing
//! table and dispatcher, and exposes request and fan-out calls that spread
//! work across the pool.
//!
//! # Design notes
//! Connections never share routing state. A request is bound to one
//! connection for all its attempts, so stream ids are only ever compared
//! within the connection that issued them.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use strand_transport::{ConnectError, ConnectTarget, open_connection};

use super::fanout;
use super::orchestrator::{self, RequestPolicy};
use super::quic::QuicStreamTransport;
use crate::config::ClientConfig;
use crate::counters::StreamCountersSnapshot;
use crate::request::{OutboundRequest, RequestOutcome};
use crate::transport::{MuxConnection, event_feed};

const DEFAULT_HTTPS_PORT: u16 = 443;

/// Client over a pool of multiplexed QUIC connections to one origin.
pub struct Client {
    connections: Vec<Arc<MuxConnection<QuicStreamTransport>>>,
    authority: String,
    policy: RequestPolicy,
    concurrency_limit: usize,
    user_agent: String,
    next_connection: AtomicUsize,
}

impl Client {
    /// Open `conn_pool` connections, or one per configured source address.
    ///
    /// Any connection failure fails the whole call; connect errors are never
    /// retried here. A target without ALPN protocols advertises `config.alpn`.
    pub async fn connect(target: ConnectTarget, config: ClientConfig) -> Result<Self, ConnectError> {
        let target = if target.alpn.is_empty() {
            target.with_alpn(config.alpn.iter().map(String::as_bytes))
        } else {
            target
        };
        let targets: Vec<ConnectTarget> = if config.source_addresses.is_empty() {
            (0..config.conn_pool.max(1)).map(|_| target.clone()).collect()
        } else {
            config
                .source_addresses
                .iter()
                .map(|addr| target.clone().with_local_bind(*addr))
                .collect()
        };
        let mut connections = Vec::with_capacity(targets.len());
        for target in &targets {
            let connection = open_connection(target, &config.transport).await?;
            tracing::info!(
                host = %target.host,
                local = ?target.local_bind,
                connection_id = connection.info().id.0,
                "pool connection ready"
            );
            let (feed, events) = event_feed(config.event_feed_depth);
            let transport = QuicStreamTransport::new(connection, feed, config.max_frame_bytes);
            connections.push(Arc::new(MuxConnection::new(transport, events)));
        }
        Ok(Self {
            connections,
            authority: authority(&target.host, target.port),
            policy: config.policy(),
            concurrency_limit: config.concurrency_limit.max(1),
            user_agent: config.user_agent,
            next_connection: AtomicUsize::new(0),
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    /// GET for `path` on this client's origin, with the configured user agent.
    pub fn get(&self, path: &str) -> OutboundRequest {
        OutboundRequest::get("https", self.authority.clone(), path)
            .with_header("user-agent", self.user_agent.clone())
    }

    pub async fn request(&self, request: OutboundRequest) -> RequestOutcome {
        let index = self.next_connection.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        orchestrator::request(&self.connections[index], &request, &self.policy).await
    }

    pub async fn fan_out(&self, requests: Vec<OutboundRequest>) -> Vec<RequestOutcome> {
        fanout::fan_out(
            &self.connections,
            requests,
            self.concurrency_limit,
            &self.policy,
        )
        .await
    }

    /// Open stream count per pooled connection.
    pub fn open_streams(&self) -> Vec<usize> {
        self.connections
            .iter()
            .map(|conn| conn.open_streams())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Diagnostic counters summed over the pool.
    pub fn counters(&self) -> StreamCountersSnapshot {
        self.connections
            .iter()
            .map(|conn| conn.counters().snapshot())
            .fold(StreamCountersSnapshot::default(), |total, next| total + next)
    }

    pub fn close(&self) {
        for conn in &self.connections {
            conn.transport().connection().close("client closed");
        }
    }
}

fn authority(host: &str, port: u16) -> String {
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    if port == DEFAULT_HTTPS_PORT {
        host
    } else {
        format!("{host}:{port}")
    }
}
