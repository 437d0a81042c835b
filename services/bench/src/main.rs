// strand-bench entry point.
mod observability;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use rustls::pki_types::CertificateDer;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use strand_bench::links::LinkExtractor;
use strand_bench::page::run_page_loads;
use strand_bench::report::{self, Format};
use strand_bench::segments::{SegmentPlan, http_client, run_segments};
use strand_client::{Client, ClientConfig, DEFAULT_USER_AGENT};
use strand_transport::{ConnectTarget, SecurityPolicy};
use tracing::info;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "strand-bench")]
#[command(about = "Page-load and segment benchmarks for strand")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Concurrent page loads over multiplexed QUIC connections
    Quic(QuicArgs),
    /// Sequential media segment fetches over HTTP
    Segments(SegmentArgs),
}

#[derive(Args, Debug)]
struct QuicArgs {
    /// Page to load (https URL)
    #[arg(long)]
    url: Url,

    /// Local address to bind; one pooled connection per address
    #[arg(long = "source-ip")]
    source_ip: Vec<IpAddr>,

    /// Number of concurrent page loads
    #[arg(long, default_value = "10")]
    requests: usize,

    /// In-flight sub-resource requests per fan-out (overrides config)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Disable certificate validation (for self-signed certs)
    #[arg(long)]
    insecure: bool,

    /// DER-encoded root certificate to trust
    #[arg(long = "ca-cert")]
    ca_cert: Vec<PathBuf>,

    /// TLS server name, when it differs from the URL host
    #[arg(long)]
    server_name: Option<String>,

    /// ALPN protocol to offer; repeat for several (overrides config, default h3)
    #[arg(long)]
    alpn: Vec<String>,

    /// YAML client config
    #[arg(long)]
    config: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SegmentArgs {
    /// Directory URL holding segment_NNN.mp4 files
    #[arg(long)]
    base_url: String,

    /// First segment index; numbering starts at segment_000
    #[arg(long, default_value = "0")]
    start: u32,

    #[arg(long)]
    end: u32,

    /// Local address to bind
    #[arg(long = "source-ip")]
    source_ip: Option<IpAddr>,

    /// Per-segment timeout
    #[arg(long, default_value = "10000")]
    timeout_ms: u64,

    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    match Cli::parse().command {
        Command::Quic(args) => run_quic(args).await,
        Command::Segments(args) => run_segment_fetches(args).await,
    }
}

async fn run_quic(args: QuicArgs) -> Result<()> {
    let mut config = ClientConfig::from_env_or_yaml(args.config.as_deref())?;
    if !args.source_ip.is_empty() {
        config.source_addresses = args.source_ip.clone();
    }
    if let Some(limit) = args.concurrency.filter(|limit| *limit > 0) {
        config.concurrency_limit = limit;
    }
    if !args.alpn.is_empty() {
        config.alpn = args.alpn.clone();
    }

    let policy = security_policy(args.insecure, &args.ca_cert)?;
    let target = connect_target(&args.url, policy, args.server_name.as_deref())?;
    info!(
        url = %args.url,
        requests = args.requests,
        conn_pool = config.conn_pool,
        source_addresses = config.source_addresses.len(),
        concurrency_limit = config.concurrency_limit,
        alpn = ?config.alpn,
        "starting page loads"
    );
    let client = Client::connect(target, config)
        .await
        .context("connect to page origin")?;
    let extractor = LinkExtractor::new().context("compile link pattern")?;
    let report = run_page_loads(&client, &extractor, &args.url, args.requests).await;
    client.close();

    match Format::from_json_flag(args.json) {
        Format::Json => println!("{}", report::to_json(&report)?),
        Format::Text => print!("{}", report::render_quic(&report)),
    }
    Ok(())
}

async fn run_segment_fetches(args: SegmentArgs) -> Result<()> {
    let plan = SegmentPlan {
        base_url: args.base_url,
        start: args.start,
        end: args.end,
        source_ip: args.source_ip,
        timeout: Duration::from_millis(args.timeout_ms),
        user_agent: args.user_agent,
    };
    let client = http_client(&plan).context("build http client")?;
    let format = Format::from_json_flag(args.json);
    info!(base_url = %plan.base_url, start = plan.start, end = plan.end, "fetching segments");

    let report = run_segments(&client, &plan, |result| {
        if format == Format::Text {
            println!("{}", report::segment_line(result));
        }
    })
    .await;

    match format {
        Format::Json => println!("{}", report::to_json(&report)?),
        Format::Text => print!("\n{}", report::render_segment_recap(&report)),
    }
    Ok(())
}

fn security_policy(insecure: bool, ca_certs: &[PathBuf]) -> Result<SecurityPolicy> {
    if insecure {
        if !ca_certs.is_empty() {
            bail!("--insecure and --ca-cert are mutually exclusive");
        }
        return Ok(SecurityPolicy::AcceptAnyCertificate);
    }
    if ca_certs.is_empty() {
        bail!("certificate verification needs at least one --ca-cert (or pass --insecure)");
    }
    let mut certs = Vec::with_capacity(ca_certs.len());
    for path in ca_certs {
        let der = std::fs::read(path)
            .with_context(|| format!("read ca certificate: {}", path.display()))?;
        certs.push(CertificateDer::from(der));
    }
    SecurityPolicy::verify_with(certs).context("load ca certificates")
}

fn connect_target(
    url: &Url,
    policy: SecurityPolicy,
    server_name: Option<&str>,
) -> Result<ConnectTarget> {
    if url.scheme() != "https" {
        bail!("page url must be https: {url}");
    }
    let Some(host) = url.host_str() else {
        bail!("page url has no host: {url}");
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = url.port_or_known_default().unwrap_or(443);
    let target = ConnectTarget::new(host, port, policy);
    Ok(match server_name {
        Some(name) => target.with_server_name(name),
        None => target,
    })
}
