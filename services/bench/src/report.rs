// Text and JSON rendering for bench reports.
use serde::Serialize;
use std::fmt::Write;

use crate::page::{PageLoad, QuicReport};
use crate::segments::{SegmentReport, SegmentResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl Format {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

pub fn to_json<T: Serialize>(report: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

fn status_text(status: Option<u16>) -> String {
    status.map_or_else(|| "-".to_string(), |status| status.to_string())
}

pub fn page_line(index: usize, load: &PageLoad) -> String {
    format!(
        "load {index}: status {} | rtt {:.2} ms | size {:.2} KB | throughput {:.2} KB/s | latency {:.2} ms | resources {} ({} failed, {} cross-origin skipped)",
        status_text(load.status),
        load.rtt_ms,
        load.total_size_kb,
        load.throughput_kbps,
        load.latency_ms,
        load.resources,
        load.failed_resources,
        load.cross_origin_skipped,
    )
}

pub fn render_quic(report: &QuicReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "page loads for {}", report.url);
    for (index, load) in report.loads.iter().enumerate() {
        let _ = writeln!(out, "  {}", page_line(index, load));
    }
    for error in &report.failures {
        let _ = writeln!(out, "  failed: {error}");
    }
    let _ = writeln!(
        out,
        "completed {}/{} ({} failed)",
        report.completed, report.requested, report.failed
    );
    match &report.averages {
        Some(avg) => {
            let _ = writeln!(out, "average rtt: {:.2} ms", avg.rtt_ms);
            let _ = writeln!(out, "average size: {:.2} KB", avg.total_size_kb);
            let _ = writeln!(out, "average throughput: {:.2} KB/s", avg.throughput_kbps);
            let _ = writeln!(out, "average latency: {:.2} ms", avg.latency_ms);
        }
        None => {
            let _ = writeln!(out, "no page load completed");
        }
    }
    let resources = &report.resources;
    if resources.attempted > 0 {
        let _ = writeln!(
            out,
            "sub-resources: {} ok, {} failed, p50 {:.2} ms, p99 {:.2} ms",
            resources.succeeded, resources.failed, resources.latency_p50_ms, resources.latency_p99_ms
        );
        for (kind, count) in &resources.failures_by_kind {
            let _ = writeln!(out, "  {kind}: {count}");
        }
    }
    let counters = &report.counters;
    if counters.dropped_events + counters.protocol_violations + counters.decode_errors > 0 {
        let _ = writeln!(
            out,
            "diagnostics: {} dropped events, {} protocol violations, {} decode errors",
            counters.dropped_events, counters.protocol_violations, counters.decode_errors
        );
    }
    out
}

pub fn segment_line(result: &SegmentResult) -> String {
    match &result.error {
        Some(error) => format!("{} | error: {error}", result.url),
        None => format!(
            "{} | Status: {} | RTT: {:.2} ms | Size: {:.2} KB",
            result.url,
            status_text(result.status),
            result.rtt_ms,
            result.size_kb
        ),
    }
}

pub fn render_segment_recap(report: &SegmentReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "successful segments: {}/{}", report.succeeded, report.total);
    if report.succeeded > 0 {
        let _ = writeln!(out, "average RTT: {:.2} ms", report.avg_rtt_ms);
        let _ = writeln!(out, "average size: {:.2} KB", report.avg_size_kb);
    } else {
        let _ = writeln!(out, "no segment was fetched successfully");
    }
    out
}
