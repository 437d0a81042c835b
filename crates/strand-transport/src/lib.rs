// QUIC transport configuration and primitives.
use anyhow::{Context, Result, anyhow};
use quinn::{ClientConfig, Connection, Endpoint, RecvStream, SendStream, ServerConfig};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

pub mod tls;

pub use tls::{DEFAULT_ALPN, SecurityPolicy};

/// Transport-level configuration defaults.
///
/// ```
/// use strand_transport::TransportConfig;
///
/// let config = TransportConfig::default();
/// assert!(config.max_streams > 0);
/// ```
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub max_streams: u32,
    pub idle_timeout_ms: u64,
    pub keep_alive_ms: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_streams: 1024,
            idle_timeout_ms: 30_000,
            keep_alive_ms: Some(5_000),
        }
    }
}

impl TransportConfig {
    fn quinn_transport_config(&self) -> quinn::TransportConfig {
        let mut config = quinn::TransportConfig::default();
        let streams = quinn::VarInt::from_u32(self.max_streams);
        config.max_concurrent_bidi_streams(streams);
        config.max_concurrent_uni_streams(streams);
        let idle = Duration::from_millis(self.idle_timeout_ms);
        config.max_idle_timeout(idle.try_into().ok());
        config.keep_alive_interval(self.keep_alive_ms.map(Duration::from_millis));
        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Stable connection identifier used for tracing/logging.
pub struct ConnectionId(pub u64);

#[derive(Debug, Clone)]
/// Metadata about a live QUIC connection.
///
/// ```
/// use strand_transport::{ConnectionId, ConnectionInfo};
/// use std::net::SocketAddr;
///
/// let info = ConnectionInfo {
///     id: ConnectionId(42),
///     peer_addr: "127.0.0.1:4433".parse::<SocketAddr>().expect("addr"),
///     local_ip: None,
/// };
/// assert_eq!(info.id.0, 42);
/// ```
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub local_ip: Option<IpAddr>,
}

/// Failure to establish a connection. Never retried by the request core.
#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no usable address for {0}")]
    NoAddress(String),
    #[error("bind local endpoint {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("tls setup: {0}")]
    Tls(String),
    #[error("initiate connection to {addr}: {source}")]
    Initiate {
        addr: SocketAddr,
        #[source]
        source: quinn::ConnectError,
    },
    #[error("handshake with {addr}: {source}")]
    Handshake {
        addr: SocketAddr,
        #[source]
        source: quinn::ConnectionError,
    },
}

/// Where and how to open a connection.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    /// TLS server name; defaults to `host`.
    pub server_name: Option<String>,
    /// Local source address to bind (port is always ephemeral).
    pub local_bind: Option<IpAddr>,
    pub policy: SecurityPolicy,
    /// ALPN protocols to advertise; empty advertises none.
    pub alpn: Vec<Vec<u8>>,
}

impl ConnectTarget {
    pub fn new(host: impl Into<String>, port: u16, policy: SecurityPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            server_name: None,
            local_bind: None,
            policy,
            alpn: Vec::new(),
        }
    }

    pub fn with_local_bind(mut self, local: IpAddr) -> Self {
        self.local_bind = Some(local);
        self
    }

    /// Protocols to advertise during the handshake, in preference order.
    pub fn with_alpn<I, P>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        self.alpn = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn server_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.host)
    }
}

/// Resolve, bind and handshake one connection for `target`.
pub async fn open_connection(
    target: &ConnectTarget,
    transport: &TransportConfig,
) -> std::result::Result<QuicConnection, ConnectError> {
    let remote = resolve(target).await?;
    let bind_ip = target.local_bind.unwrap_or(match remote {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    });
    let bind_addr = SocketAddr::new(bind_ip, 0);
    let client_config = tls::client_config(&target.policy, &target.alpn)?;
    let endpoint = client_endpoint(bind_addr, client_config, transport).map_err(|source| {
        ConnectError::Bind {
            addr: bind_addr,
            source,
        }
    })?;
    let connecting = endpoint
        .connect(remote, target.server_name())
        .map_err(|source| ConnectError::Initiate {
            addr: remote,
            source,
        })?;
    let connection = connecting.await.map_err(|source| ConnectError::Handshake {
        addr: remote,
        source,
    })?;
    tracing::info!(
        peer = %remote,
        local = %bind_addr,
        verify = target.policy.verifies_peer(),
        "quic connection established"
    );
    Ok(QuicConnection::with_endpoint(connection, endpoint))
}

async fn resolve(target: &ConnectTarget) -> std::result::Result<SocketAddr, ConnectError> {
    let addrs = tokio::net::lookup_host((target.host.as_str(), target.port))
        .await
        .map_err(|source| ConnectError::Resolve {
            host: target.host.clone(),
            source,
        })?
        .collect::<Vec<_>>();
    // With a source bind the remote address must share its family.
    let picked = match target.local_bind {
        Some(local) => addrs
            .iter()
            .find(|addr| addr.is_ipv4() == local.is_ipv4())
            .copied(),
        None => addrs.first().copied(),
    };
    picked.ok_or_else(|| ConnectError::NoAddress(target.host.clone()))
}

/// QUIC server endpoint wrapper.
#[derive(Debug)]
pub struct QuicServer {
    endpoint: Endpoint,
    _transport: TransportConfig,
}

impl QuicServer {
    pub fn bind(
        addr: SocketAddr,
        mut server_config: ServerConfig,
        transport: TransportConfig,
    ) -> Result<Self> {
        let quinn_transport = transport.quinn_transport_config();
        server_config.transport_config(Arc::new(quinn_transport));
        let endpoint = Endpoint::server(server_config, addr).context("bind QUIC server")?;
        Ok(Self {
            endpoint,
            _transport: transport,
        })
    }

    pub async fn accept(&self) -> Result<QuicConnection> {
        let connecting = self
            .endpoint
            .accept()
            .await
            .ok_or_else(|| anyhow!("no incoming QUIC connections"))?;
        let connection = connecting.await.context("accept QUIC connection")?;
        Ok(QuicConnection::new(connection))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.endpoint
            .local_addr()
            .context("read QUIC local address")
    }
}

fn client_endpoint(
    addr: SocketAddr,
    mut client_config: ClientConfig,
    transport: &TransportConfig,
) -> std::io::Result<Endpoint> {
    client_config.transport_config(Arc::new(transport.quinn_transport_config()));
    let mut endpoint = Endpoint::client(addr)?;
    endpoint.set_default_client_config(client_config);
    Ok(endpoint)
}

/// Active QUIC connection wrapper with convenience helpers.
#[derive(Debug, Clone)]
pub struct QuicConnection {
    inner: Connection,
    info: ConnectionInfo,
    // Client connections keep their endpoint alive for as long as any clone exists.
    _endpoint: Option<Endpoint>,
}

impl QuicConnection {
    fn new(connection: Connection) -> Self {
        let info = ConnectionInfo {
            id: ConnectionId(connection.stable_id() as u64),
            peer_addr: connection.remote_address(),
            local_ip: connection.local_ip(),
        };
        Self {
            inner: connection,
            info,
            _endpoint: None,
        }
    }

    fn with_endpoint(connection: Connection, endpoint: Endpoint) -> Self {
        let mut wrapped = Self::new(connection);
        wrapped._endpoint = Some(endpoint);
        wrapped
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Open a bidirectional stream to the peer.
    pub async fn open_bi(&self) -> Result<(SendStream, RecvStream)> {
        self.inner.open_bi().await.context("open bidi stream")
    }

    /// Accept the next bidirectional stream from the peer.
    pub async fn accept_bi(&self) -> Result<(SendStream, RecvStream)> {
        self.inner.accept_bi().await.context("accept bidi stream")
    }

    /// Close the connection with application code 0.
    pub fn close(&self, reason: &str) {
        self.inner.close(quinn::VarInt::from_u32(0), reason.as_bytes());
    }

    /// Resolves once the connection has been closed for any reason.
    pub async fn closed(&self) -> quinn::ConnectionError {
        self.inner.closed().await
    }
}
