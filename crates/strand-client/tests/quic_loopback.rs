// End-to-end requests against a loopback QUIC server speaking the strand frame format.
use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use quinn::ServerConfig;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use std::net::SocketAddr;
use strand_client::{Client, ClientConfig, ErrorKind};
use strand_transport::{
    ConnectError, ConnectTarget, DEFAULT_ALPN, QuicConnection, QuicServer, SecurityPolicy, TransportConfig, tls,
};
use strand_wire::{Frame, FrameDecoder, HeaderField, PSEUDO_PATH, PSEUDO_STATUS};

const MAX_FRAME: usize = 1024 * 1024;

fn server_config() -> Result<(ServerConfig, CertificateDer<'static>)> {
    let cert = generate_simple_self_signed(vec!["localhost".into()])
        .context("generate self-signed cert")?;
    let cert_der = CertificateDer::from(cert.serialize_der()?);
    let key_der = PrivatePkcs8KeyDer::from(cert.get_key_pair().serialize_der());
    let config = tls::server_config(
        vec![cert_der.clone()],
        key_der.into(),
        &[DEFAULT_ALPN.to_vec()],
    )
    .context("build server config")?;
    Ok((config, cert_der))
}

async fn start_server() -> Result<(SocketAddr, CertificateDer<'static>)> {
    let (config, cert) = server_config()?;
    let server = QuicServer::bind("127.0.0.1:0".parse()?, config, TransportConfig::default())?;
    let addr = server.local_addr()?;
    tokio::spawn(async move {
        while let Ok(connection) = server.accept().await {
            tokio::spawn(serve_connection(connection));
        }
    });
    Ok((addr, cert))
}

async fn serve_connection(connection: QuicConnection) {
    while let Ok((send, recv)) = connection.accept_bi().await {
        tokio::spawn(async move {
            let _ = serve_stream(send, recv).await;
        });
    }
}

async fn serve_stream(mut send: quinn::SendStream, mut recv: quinn::RecvStream) -> Result<()> {
    let request = recv.read_to_end(MAX_FRAME).await?;
    let mut decoder = FrameDecoder::new(MAX_FRAME);
    decoder.extend(&request);
    let mut path = String::from("/");
    while let Some(frame) = decoder.next_frame()? {
        if let Frame::Headers(fields) = frame
            && let Some(field) = fields
                .iter()
                .find(|field| field.name.as_ref() == PSEUDO_PATH.as_bytes())
        {
            path = field.value_str()?.to_string();
        }
    }

    match path.as_str() {
        "/reset" => {
            send.reset(quinn::VarInt::from_u32(7))?;
            return Ok(());
        }
        "/no-headers" => {
            send.finish()?;
            return Ok(());
        }
        "/truncated" => {
            let mut out = BytesMut::new();
            Frame::Headers(vec![HeaderField::new(PSEUDO_STATUS, "200")]).encode(&mut out)?;
            // DATA frame announcing 5 bytes, only one of which is sent.
            out.extend_from_slice(&[0x00, 0x05, b'a']);
            send.write_all(&out).await?;
            send.finish()?;
            return Ok(());
        }
        _ => {}
    }
    let (status, body) = match path.as_str() {
        "/missing" => ("404", Bytes::from_static(b"not found")),
        "/large" => ("200", Bytes::from(vec![b'z'; 200 * 1024])),
        other => ("200", Bytes::from(format!("hello from {other}"))),
    };
    let mut out = BytesMut::new();
    Frame::Headers(vec![
        HeaderField::new(PSEUDO_STATUS, status),
        HeaderField::new("content-length", body.len().to_string()),
    ])
    .encode(&mut out)?;
    // Split the body so the client sees several DATA frames.
    for chunk in body.chunks(64 * 1024) {
        Frame::Data(Bytes::copy_from_slice(chunk)).encode(&mut out)?;
    }
    send.write_all(&out).await?;
    send.finish()?;
    Ok(())
}

async fn connect(
    addr: SocketAddr,
    cert: CertificateDer<'static>,
    config: ClientConfig,
) -> Result<Client> {
    let policy = SecurityPolicy::verify_with([cert])?;
    let target =
        ConnectTarget::new("127.0.0.1", addr.port(), policy).with_server_name("localhost");
    Ok(Client::connect(target, config).await?)
}

#[tokio::test]
async fn request_round_trip() -> Result<()> {
    let (addr, cert) = start_server().await?;
    let client = connect(addr, cert, ClientConfig::default()).await?;
    assert_eq!(client.authority(), format!("127.0.0.1:{}", addr.port()));

    let outcome = client.request(client.get("/hello")).await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.status(), Some(200));
    assert_eq!(outcome.response.text_lossy(), "hello from /hello");
    assert_eq!(outcome.response.header("content-length"), Some("17"));
    assert!(outcome.timing.rtt.is_some());

    let missing = client.request(client.get("/missing")).await;
    assert!(missing.is_success());
    assert_eq!(missing.status(), Some(404));

    let large = client.request(client.get("/large")).await;
    assert_eq!(large.response.body.len(), 200 * 1024);
    assert!(large.timing.throughput_bps > 0.0);

    assert_eq!(client.open_streams(), vec![0]);
    client.close();
    Ok(())
}

#[tokio::test]
async fn fan_out_over_pool() -> Result<()> {
    let (addr, cert) = start_server().await?;
    let config = ClientConfig {
        conn_pool: 2,
        concurrency_limit: 4,
        ..ClientConfig::default()
    };
    let client = connect(addr, cert, config).await?;
    assert_eq!(client.connection_count(), 2);

    let requests = (0..20)
        .map(|i| client.get(&format!("/asset/{i}.js")))
        .collect();
    let outcomes = client.fan_out(requests).await;
    assert_eq!(outcomes.len(), 20);
    for (i, outcome) in outcomes.iter().enumerate() {
        assert!(outcome.is_success(), "index {i}: {:?}", outcome.error);
        assert_eq!(outcome.response.text_lossy(), format!("hello from /asset/{i}.js"));
    }
    assert_eq!(client.open_streams(), vec![0, 0]);
    assert_eq!(client.counters().dropped_events, 0);
    client.close();
    Ok(())
}

#[tokio::test]
async fn reset_stream_is_retried_then_reported() -> Result<()> {
    let (addr, cert) = start_server().await?;
    let config = ClientConfig {
        max_attempts: 2,
        retry_backoff_ms: 10,
        ..ClientConfig::default()
    };
    let client = connect(addr, cert, config).await?;
    let outcome = client.request(client.get("/reset")).await;
    assert_eq!(outcome.attempts, 2);
    assert_eq!(
        outcome.error.as_ref().map(|err| err.kind),
        Some(ErrorKind::Transport)
    );
    assert_eq!(client.counters().retries, 1);

    // The connection stays usable.
    let outcome = client.request(client.get("/after")).await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    client.close();
    Ok(())
}

#[tokio::test]
async fn stream_without_headers_is_a_protocol_violation() -> Result<()> {
    let (addr, cert) = start_server().await?;
    let config = ClientConfig {
        max_attempts: 3,
        retry_backoff_ms: 10,
        ..ClientConfig::default()
    };
    let client = connect(addr, cert, config).await?;
    let outcome = client.request(client.get("/no-headers")).await;
    assert_eq!(
        outcome.error.as_ref().map(|err| err.kind),
        Some(ErrorKind::ProtocolViolation)
    );
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.status(), None);
    let counters = client.counters();
    assert_eq!(counters.retries, 0);
    assert_eq!(counters.protocol_violations, 1);
    assert_eq!(client.open_streams(), vec![0]);
    client.close();
    Ok(())
}

#[tokio::test]
async fn truncated_frame_is_retried_as_transport_failure() -> Result<()> {
    let (addr, cert) = start_server().await?;
    let config = ClientConfig {
        max_attempts: 2,
        retry_backoff_ms: 10,
        ..ClientConfig::default()
    };
    let client = connect(addr, cert, config).await?;
    let outcome = client.request(client.get("/truncated")).await;
    let error = outcome.error.as_ref().expect("truncated response fails");
    assert_eq!(error.kind, ErrorKind::Transport);
    assert!(error.message.contains("mid-frame"), "{error}");
    assert_eq!(outcome.attempts, 2);
    // Headers arrived before the stream broke off.
    assert_eq!(outcome.status(), Some(200));
    assert!(outcome.response.body.is_empty());
    let counters = client.counters();
    assert_eq!(counters.retries, 1);
    assert_eq!(counters.transport_errors, 2);
    assert_eq!(client.open_streams(), vec![0]);
    client.close();
    Ok(())
}

#[tokio::test]
async fn configured_alpn_must_match_the_server() -> Result<()> {
    let (addr, cert) = start_server().await?;
    let config = ClientConfig {
        alpn: vec!["h3-29".to_string()],
        ..ClientConfig::default()
    };
    let policy = SecurityPolicy::verify_with([cert])?;
    let target =
        ConnectTarget::new("127.0.0.1", addr.port(), policy).with_server_name("localhost");
    let err = Client::connect(target, config.clone())
        .await
        .err()
        .context("connect should fail")?;
    assert!(matches!(err, ConnectError::Handshake { .. }), "{err}");

    // A failed handshake ends that server's accept loop, so use a fresh one.
    // A protocol set on the target wins over the configured one.
    let (addr, cert) = start_server().await?;
    let policy = SecurityPolicy::verify_with([cert])?;
    let target = ConnectTarget::new("127.0.0.1", addr.port(), policy)
        .with_server_name("localhost")
        .with_alpn([DEFAULT_ALPN]);
    let client = Client::connect(target, config).await?;
    let outcome = client.request(client.get("/alpn")).await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    client.close();
    Ok(())
}

#[tokio::test]
async fn oversized_frame_resets_the_stream() -> Result<()> {
    let (addr, cert) = start_server().await?;
    let config = ClientConfig {
        max_attempts: 2,
        retry_backoff_ms: 10,
        max_frame_bytes: 1024,
        ..ClientConfig::default()
    };
    let client = connect(addr, cert, config).await?;
    let outcome = client.request(client.get("/large")).await;
    let error = outcome.error.as_ref().expect("oversized frame fails");
    assert_eq!(error.kind, ErrorKind::Transport);
    assert!(error.message.contains("decode response"), "{error}");
    assert_eq!(outcome.attempts, 2);
    assert_eq!(client.counters().retries, 1);

    let outcome = client.request(client.get("/small")).await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(client.open_streams(), vec![0]);
    client.close();
    Ok(())
}
