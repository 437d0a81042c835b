//! Page-load benchmark over a pooled strand client.
//!
//! A page load fetches the document, discovers its same-origin
//! sub-resources and fans them out on the connections the document used.
//! Cross-origin references are counted but never fetched.
use futures::future::join_all;
use serde::Serialize;
use strand_client::{Client, RequestError, RequestOutcome, StreamCountersSnapshot, Summary, summarize};
use tokio::time::Instant;
use url::Url;

use crate::links::{LinkExtractor, request_path};

const BYTES_PER_KB: f64 = 1024.0;

/// Measurements for one page load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageLoad {
    pub status: Option<u16>,
    /// Time to fetch the document.
    pub rtt_ms: f64,
    /// Document plus fetched sub-resources.
    pub total_size_kb: f64,
    /// `total_size_kb` over the sub-resource phase.
    pub throughput_kbps: f64,
    /// Duration of the sub-resource phase.
    pub latency_ms: f64,
    pub resources: usize,
    pub failed_resources: usize,
    pub cross_origin_skipped: usize,
}

#[derive(Debug, Clone)]
pub struct LoadedPage {
    pub load: PageLoad,
    pub resources: Vec<RequestOutcome>,
}

pub async fn load_page(
    client: &Client,
    extractor: &LinkExtractor,
    page: &Url,
) -> Result<LoadedPage, RequestError> {
    let started = Instant::now();
    let document = client.request(client.get(&request_path(page))).await;
    let rtt = started.elapsed();
    if let Some(error) = document.error {
        return Err(error);
    }

    let links = extractor.partition(&document.response.text_lossy(), page);
    tracing::debug!(
        page = %page,
        same_origin = links.same_origin.len(),
        cross_origin = links.cross_origin.len(),
        "discovered sub-resources"
    );
    let requests = links
        .same_origin
        .iter()
        .map(|url| client.get(&request_path(url)))
        .collect();

    let fetch_started = Instant::now();
    let resources = client.fan_out(requests).await;
    let fetch_time = fetch_started.elapsed();

    let resource_bytes: usize = resources
        .iter()
        .filter(|outcome| outcome.is_success())
        .map(|outcome| outcome.response.body.len())
        .sum();
    let total_size_kb = (document.response.body.len() + resource_bytes) as f64 / BYTES_PER_KB;
    let seconds = fetch_time.as_secs_f64();
    let throughput_kbps = if seconds > 0.0 {
        total_size_kb / seconds
    } else {
        0.0
    };

    Ok(LoadedPage {
        load: PageLoad {
            status: document.response.status,
            rtt_ms: millis(rtt.as_secs_f64()),
            total_size_kb,
            throughput_kbps,
            latency_ms: millis(seconds),
            resources: resources.len(),
            failed_resources: resources.iter().filter(|o| !o.is_success()).count(),
            cross_origin_skipped: links.cross_origin.len(),
        },
        resources,
    })
}

fn millis(seconds: f64) -> f64 {
    seconds * 1000.0
}

/// Means over completed page loads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageAverages {
    pub rtt_ms: f64,
    pub total_size_kb: f64,
    pub throughput_kbps: f64,
    pub latency_ms: f64,
}

impl PageAverages {
    pub fn from_loads(loads: &[PageLoad]) -> Option<Self> {
        if loads.is_empty() {
            return None;
        }
        let n = loads.len() as f64;
        let mean = |field: fn(&PageLoad) -> f64| loads.iter().map(field).sum::<f64>() / n;
        Some(Self {
            rtt_ms: mean(|load| load.rtt_ms),
            total_size_kb: mean(|load| load.total_size_kb),
            throughput_kbps: mean(|load| load.throughput_kbps),
            latency_ms: mean(|load| load.latency_ms),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuicReport {
    pub url: String,
    pub requested: usize,
    pub completed: usize,
    pub failed: usize,
    pub averages: Option<PageAverages>,
    pub loads: Vec<PageLoad>,
    pub failures: Vec<RequestError>,
    /// All sub-resource requests across the run.
    pub resources: Summary,
    pub counters: StreamCountersSnapshot,
}

/// Run `count` page loads of `page` concurrently on the client's pool.
pub async fn run_page_loads(
    client: &Client,
    extractor: &LinkExtractor,
    page: &Url,
    count: usize,
) -> QuicReport {
    let results = join_all((0..count).map(|_| load_page(client, extractor, page))).await;

    let mut loads = Vec::new();
    let mut failures = Vec::new();
    let mut resources = Vec::new();
    for result in results {
        match result {
            Ok(loaded) => {
                loads.push(loaded.load);
                resources.extend(loaded.resources);
            }
            Err(error) => {
                tracing::warn!(page = %page, error = %error, "page load failed");
                failures.push(error);
            }
        }
    }

    QuicReport {
        url: page.to_string(),
        requested: count,
        completed: loads.len(),
        failed: failures.len(),
        averages: PageAverages::from_loads(&loads),
        resources: summarize(&resources),
        counters: client.counters(),
        loads,
        failures,
    }
}
