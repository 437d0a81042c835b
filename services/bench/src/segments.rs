//! Sequential media-segment fetches over pooled HTTP.
use serde::Serialize;
use std::net::IpAddr;
use std::time::{Duration, Instant};

const BYTES_PER_KB: f64 = 1024.0;
const MAX_IDLE_PER_HOST: usize = 8;

#[derive(Debug, Clone)]
pub struct SegmentPlan {
    pub base_url: String,
    pub start: u32,
    pub end: u32,
    pub source_ip: Option<IpAddr>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl SegmentPlan {
    /// Segment URLs from `start` to `end`, both inclusive.
    pub fn urls(&self) -> Vec<String> {
        (self.start..=self.end)
            .map(|index| segment_url(&self.base_url, index))
            .collect()
    }
}

pub fn segment_url(base: &str, index: u32) -> String {
    format!("{}/segment_{index:03}.mp4", base.trim_end_matches('/'))
}

pub fn http_client(plan: &SegmentPlan) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .local_address(plan.source_ip)
        .timeout(plan.timeout)
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .user_agent(plan.user_agent.clone())
        .build()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentResult {
    pub url: String,
    pub status: Option<u16>,
    pub rtt_ms: f64,
    pub size_kb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SegmentResult {
    pub fn is_success(&self) -> bool {
        self.status == Some(200)
    }
}

pub async fn fetch_segment(client: &reqwest::Client, url: &str) -> SegmentResult {
    let started = Instant::now();
    let fetched = async {
        let response = client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok::<_, reqwest::Error>((status, body.len()))
    }
    .await;
    let rtt_ms = started.elapsed().as_secs_f64() * 1000.0;
    match fetched {
        Ok((status, size)) => SegmentResult {
            url: url.to_string(),
            status: Some(status),
            rtt_ms,
            size_kb: size as f64 / BYTES_PER_KB,
            error: None,
        },
        Err(err) => {
            tracing::warn!(url, error = %err, "segment fetch failed");
            SegmentResult {
                url: url.to_string(),
                status: err.status().map(|status| status.as_u16()),
                rtt_ms,
                size_kb: 0.0,
                error: Some(err.to_string()),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentReport {
    pub total: usize,
    pub succeeded: usize,
    /// Means over segments answered with 200.
    pub avg_rtt_ms: f64,
    pub avg_size_kb: f64,
    pub segments: Vec<SegmentResult>,
}

impl SegmentReport {
    pub fn from_results(segments: Vec<SegmentResult>) -> Self {
        let ok: Vec<&SegmentResult> = segments.iter().filter(|s| s.is_success()).collect();
        let (avg_rtt_ms, avg_size_kb) = if ok.is_empty() {
            (0.0, 0.0)
        } else {
            let n = ok.len() as f64;
            (
                ok.iter().map(|s| s.rtt_ms).sum::<f64>() / n,
                ok.iter().map(|s| s.size_kb).sum::<f64>() / n,
            )
        };
        Self {
            total: segments.len(),
            succeeded: ok.len(),
            avg_rtt_ms,
            avg_size_kb,
            segments,
        }
    }
}

/// Fetch every segment in order, calling `on_segment` as each one lands.
pub async fn run_segments(
    client: &reqwest::Client,
    plan: &SegmentPlan,
    mut on_segment: impl FnMut(&SegmentResult),
) -> SegmentReport {
    let mut results = Vec::new();
    for url in plan.urls() {
        let result = fetch_segment(client, &url).await;
        on_segment(&result);
        results.push(result);
    }
    SegmentReport::from_results(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(base: &str, start: u32, end: u32) -> SegmentPlan {
        SegmentPlan {
            base_url: base.to_string(),
            start,
            end,
            source_ip: None,
            timeout: Duration::from_secs(10),
            user_agent: "strand-test".to_string(),
        }
    }

    fn result(status: Option<u16>, rtt_ms: f64, size_kb: f64) -> SegmentResult {
        SegmentResult {
            url: "http://media.test/segment_000.mp4".to_string(),
            status,
            rtt_ms,
            size_kb,
            error: None,
        }
    }

    #[test]
    fn segment_urls_are_zero_padded_and_inclusive() {
        let urls = plan("http://media.test/video/", 9, 11).urls();
        assert_eq!(
            urls,
            vec![
                "http://media.test/video/segment_009.mp4",
                "http://media.test/video/segment_010.mp4",
                "http://media.test/video/segment_011.mp4",
            ]
        );
        assert!(plan("http://media.test", 3, 2).urls().is_empty());
        assert_eq!(segment_url("http://m", 1234), "http://m/segment_1234.mp4");
    }

    #[test]
    fn recap_counts_only_ok_segments() {
        let report = SegmentReport::from_results(vec![
            result(Some(200), 10.0, 100.0),
            result(Some(404), 1.0, 0.5),
            result(None, 0.0, 0.0),
            result(Some(200), 30.0, 300.0),
        ]);
        assert_eq!(report.total, 4);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.avg_rtt_ms, 20.0);
        assert_eq!(report.avg_size_kb, 200.0);
    }

    #[test]
    fn empty_recap_is_zero() {
        let report = SegmentReport::from_results(Vec::new());
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.avg_rtt_ms, 0.0);
    }
}
