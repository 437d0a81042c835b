// Page loads against a loopback QUIC origin, and segment fetches against a loopback HTTP server.
use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use quinn::ServerConfig;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use std::net::SocketAddr;
use std::time::Duration;
use strand_bench::links::LinkExtractor;
use strand_bench::page::run_page_loads;
use strand_bench::segments::{SegmentPlan, http_client, run_segments};
use strand_client::{Client, ClientConfig};
use strand_transport::{
    ConnectTarget, DEFAULT_ALPN, QuicConnection, QuicServer, SecurityPolicy, TransportConfig, tls,
};
use strand_wire::{Frame, FrameDecoder, HeaderField, PSEUDO_PATH, PSEUDO_STATUS};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

const MAX_FRAME: usize = 1024 * 1024;

const INDEX: &str = r#"<html><head>
<link rel="stylesheet" href="/style.css">
<script src="app.js"></script>
<script src="https://cdn.example.net/lib.js"></script>
</head><body><img src="/logo.png"><img src="/gone.png"></body></html>"#;

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

async fn start_origin() -> Result<(SocketAddr, CertificateDer<'static>)> {
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

    let (status, body) = match path.as_str() {
        "/index.html" => ("200", Bytes::from_static(INDEX.as_bytes())),
        "/style.css" => ("200", Bytes::from(vec![b'c'; 1024])),
        "/app.js" => ("200", Bytes::from(vec![b'j'; 2048])),
        "/logo.png" => ("200", Bytes::from(vec![b'p'; 4096])),
        _ => ("404", Bytes::from_static(b"not found")),
    };
    let mut out = BytesMut::new();
    Frame::Headers(vec![HeaderField::new(PSEUDO_STATUS, status)]).encode(&mut out)?;
    Frame::Data(body).encode(&mut out)?;
    send.write_all(&out).await?;
    send.finish()?;
    Ok(())
}

#[tokio::test]
async fn page_loads_fetch_same_origin_resources() -> Result<()> {
    let (addr, cert) = start_origin().await?;
    let target = ConnectTarget::new("127.0.0.1", addr.port(), SecurityPolicy::verify_with([cert])?)
        .with_server_name("localhost");
    let config = ClientConfig {
        conn_pool: 2,
        concurrency_limit: 2,
        ..ClientConfig::default()
    };
    let client = Client::connect(target, config).await?;
    let extractor = LinkExtractor::new()?;
    let page = Url::parse(&format!("https://127.0.0.1:{}/index.html", addr.port()))?;

    let report = run_page_loads(&client, &extractor, &page, 3).await;
    assert_eq!(report.requested, 3);
    assert_eq!(report.completed, 3, "{:?}", report.failures);
    assert_eq!(report.failed, 0);
    for load in &report.loads {
        assert_eq!(load.status, Some(200));
        assert_eq!(load.resources, 4);
        assert_eq!(load.failed_resources, 0);
        assert_eq!(load.cross_origin_skipped, 1);
        // 404 bodies still count toward the page size.
        let expected = (INDEX.len() + 1024 + 2048 + 4096 + b"not found".len()) as f64 / 1024.0;
        assert!((load.total_size_kb - expected).abs() < 1e-9);
    }
    let averages = report.averages.expect("averages");
    assert!(averages.rtt_ms > 0.0);
    assert_eq!(report.resources.attempted, 12);
    assert_eq!(report.resources.status_counts.get(&404), Some(&3));
    assert_eq!(report.counters.dropped_events, 0);
    assert_eq!(client.open_streams(), vec![0, 0]);
    client.close();
    Ok(())
}

async fn start_segment_server() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut read = 0;
                while !buf[..read].windows(4).any(|w| w == &b"\r\n\r\n"[..]) {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => read += n,
                    }
                }
                let head = String::from_utf8_lossy(&buf[..read]);
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = if path.ends_with("segment_002.mp4") {
                    ("404 Not Found", Vec::new())
                } else {
                    ("200 OK", vec![0u8; 2048])
                };
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    Ok(addr)
}

#[tokio::test]
async fn segments_are_fetched_in_order() -> Result<()> {
    let addr = start_segment_server().await?;
    let plan = SegmentPlan {
        base_url: format!("http://{addr}/output"),
        start: 1,
        end: 3,
        source_ip: Some("127.0.0.1".parse()?),
        timeout: Duration::from_secs(5),
        user_agent: "strand-bench-test".to_string(),
    };
    let client = http_client(&plan)?;
    let mut seen = Vec::new();
    let report = run_segments(&client, &plan, |result| seen.push(result.url.clone())).await;

    assert_eq!(seen, plan.urls());
    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.segments[1].status, Some(404));
    assert_eq!(report.avg_size_kb, 2.0);
    Ok(())
}
