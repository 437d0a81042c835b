// Reduce a batch of outcomes into report statistics.
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ErrorKind;
use crate::request::RequestOutcome;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Attempts across all requests, retries included.
    pub total_attempts: u64,
    pub failures_by_kind: BTreeMap<ErrorKind, usize>,
    /// Successful responses by status code.
    pub status_counts: BTreeMap<u16, usize>,
    /// Successful responses without a usable status.
    pub unknown_status: usize,
    pub total_bytes: u64,
    pub avg_body_bytes: f64,
    pub avg_rtt_ms: f64,
    pub avg_latency_ms: f64,
    pub avg_throughput_bps: f64,
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_p999_ms: f64,
}

/// Averages and percentiles cover successful outcomes only, and are zero
/// when there are none.
///
/// ```
/// use strand_client::summarize;
///
/// let summary = summarize(&[]);
/// assert_eq!(summary.attempted, 0);
/// assert_eq!(summary.avg_latency_ms, 0.0);
/// ```
pub fn summarize(outcomes: &[RequestOutcome]) -> Summary {
    let mut summary = Summary {
        attempted: outcomes.len(),
        ..Summary::default()
    };
    let mut latencies = Vec::with_capacity(outcomes.len());
    let mut rtt_total = 0.0;
    let mut rtt_samples = 0usize;
    let mut throughput_total = 0.0;

    for outcome in outcomes {
        summary.total_attempts += u64::from(outcome.attempts);
        if let Some(error) = &outcome.error {
            summary.failed += 1;
            *summary.failures_by_kind.entry(error.kind).or_default() += 1;
            continue;
        }
        summary.succeeded += 1;
        match outcome.response.status {
            Some(code) => *summary.status_counts.entry(code).or_default() += 1,
            None => summary.unknown_status += 1,
        }
        summary.total_bytes += outcome.timing.body_bytes as u64;
        latencies.push(millis(outcome.timing.latency));
        if let Some(rtt) = outcome.timing.rtt {
            rtt_total += millis(rtt);
            rtt_samples += 1;
        }
        throughput_total += outcome.timing.throughput_bps;
    }

    if summary.succeeded > 0 {
        let count = summary.succeeded as f64;
        summary.avg_body_bytes = summary.total_bytes as f64 / count;
        summary.avg_latency_ms = latencies.iter().sum::<f64>() / count;
        summary.avg_throughput_bps = throughput_total / count;
    }
    if rtt_samples > 0 {
        summary.avg_rtt_ms = rtt_total / rtt_samples as f64;
    }
    latencies.sort_by(f64::total_cmp);
    summary.latency_p50_ms = percentile(&latencies, 0.50);
    summary.latency_p99_ms = percentile(&latencies, 0.99);
    summary.latency_p999_ms = percentile(&latencies, 0.999);
    summary
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (quantile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
