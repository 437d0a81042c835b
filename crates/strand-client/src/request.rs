// Request, response and outcome types shared by the orchestrator and reporting.
use bytes::Bytes;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;
use strand_wire::{HeaderField, PSEUDO_AUTHORITY, PSEUDO_METHOD, PSEUDO_PATH, PSEUDO_SCHEME};

use crate::error::RequestError;

/// A request to send on a fresh stream. Not modified once dispatched; retries
/// resend the same value.
///
/// ```
/// use strand_client::OutboundRequest;
///
/// let request = OutboundRequest::get("https", "example.test", "/index.html")
///     .with_header("User-Agent", "strand-bench")
///     .with_header("user-agent", "strand-bench/2");
/// assert_eq!(request.headers().len(), 1);
/// let fields = request.header_fields();
/// assert_eq!(fields[0].name.as_ref(), b":method");
/// assert_eq!(fields[4].value.as_ref(), b"strand-bench/2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    method: String,
    scheme: String,
    authority: String,
    path: String,
    headers: BTreeMap<String, String>,
    body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn new(
        method: impl Into<String>,
        scheme: impl Into<String>,
        authority: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self {
            method: method.into(),
            scheme: scheme.into(),
            authority: authority.into(),
            path: if path.is_empty() { "/".to_string() } else { path },
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(
        scheme: impl Into<String>,
        authority: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::new("GET", scheme, authority, path)
    }

    /// Set a regular header. Names are stored lower-case; a repeated name
    /// replaces the earlier value. Pseudo-header names are ignored since the
    /// request line fields own them.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        if name.starts_with(':') {
            tracing::debug!(name, "ignoring pseudo-header set as a regular header");
            return self;
        }
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Header list as sent: the four request pseudo-headers first, then the rest.
    pub fn header_fields(&self) -> Vec<HeaderField> {
        let mut fields = Vec::with_capacity(4 + self.headers.len());
        fields.push(HeaderField::new(PSEUDO_METHOD, self.method.clone()));
        fields.push(HeaderField::new(PSEUDO_SCHEME, self.scheme.clone()));
        fields.push(HeaderField::new(PSEUDO_AUTHORITY, self.authority.clone()));
        fields.push(HeaderField::new(PSEUDO_PATH, self.path.clone()));
        fields.extend(
            self.headers
                .iter()
                .map(|(name, value)| HeaderField::new(name.clone(), value.clone())),
        );
        fields
    }
}

/// Assembled response. Partial when attached to a failed outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// `None` when no status arrived or it could not be decoded.
    pub status: Option<u16>,
    pub headers: Vec<HeaderField>,
    pub body: Bytes,
}

impl Response {
    /// First header with this name (ASCII case-insensitive) whose value is text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .filter(|field| field.name.eq_ignore_ascii_case(name.as_bytes()))
            .find_map(|field| field.value_str().ok())
    }

    pub fn text_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.headers.is_empty() && self.body.is_empty()
    }
}

/// Bytes per second; zero when either side is zero.
pub fn throughput(bytes: usize, elapsed: Duration) -> f64 {
    if bytes == 0 || elapsed.is_zero() {
        return 0.0;
    }
    bytes as f64 / elapsed.as_secs_f64()
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timing {
    /// Dispatch to first inbound event; `None` if nothing arrived.
    pub rtt: Option<Duration>,
    /// Dispatch to completion (or to failure).
    pub latency: Duration,
    pub body_bytes: usize,
    /// Bytes per second over `latency`; zero for failed attempts.
    pub throughput_bps: f64,
}

impl Timing {
    pub fn measured(rtt: Option<Duration>, latency: Duration, body_bytes: usize) -> Self {
        Self {
            rtt,
            latency,
            body_bytes,
            throughput_bps: throughput(body_bytes, latency),
        }
    }

    pub fn failed(rtt: Option<Duration>, latency: Duration, body_bytes: usize) -> Self {
        Self {
            rtt,
            latency,
            body_bytes,
            throughput_bps: 0.0,
        }
    }
}

/// Final result of one logical request, across all its attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub attempts: u32,
    /// Complete on success; partial (possibly empty) on failure.
    pub response: Response,
    pub timing: Timing,
    pub error: Option<RequestError>,
}

impl RequestOutcome {
    pub fn success(response: Response, attempts: u32, timing: Timing) -> Self {
        Self {
            attempts,
            response,
            timing,
            error: None,
        }
    }

    pub fn failure(error: RequestError, attempts: u32, partial: Response, timing: Timing) -> Self {
        Self {
            attempts,
            response: partial,
            timing,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self) -> Option<u16> {
        self.response.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn header_fields_put_pseudo_headers_first() {
        let request = OutboundRequest::new("POST", "https", "example.test:4433", "/upload")
            .with_header("X-Trace", "1")
            .with_header("accept", "*/*")
            .with_body(Bytes::from_static(b"payload"));
        let names: Vec<_> = request
            .header_fields()
            .into_iter()
            .map(|field| String::from_utf8(field.name.to_vec()).expect("utf8"))
            .collect();
        assert_eq!(
            names,
            vec![":method", ":scheme", ":authority", ":path", "accept", "x-trace"]
        );
        assert_eq!(request.body(), Some(&Bytes::from_static(b"payload")));
    }

    #[test]
    fn pseudo_header_overrides_are_ignored_and_empty_path_is_root() {
        let request = OutboundRequest::get("https", "example.test", "").with_header(":path", "/x");
        assert_eq!(request.path(), "/");
        assert!(request.headers().is_empty());
    }

    #[test]
    fn response_header_lookup_is_case_insensitive() {
        let response = Response {
            status: Some(200),
            headers: vec![
                HeaderField::new("content-type", Bytes::from_static(&[0xff])),
                HeaderField::new("Content-Type", "text/html"),
            ],
            body: Bytes::from_static(b"<p>hi</p>"),
        };
        assert_eq!(response.header("CONTENT-TYPE"), Some("text/html"));
        assert_eq!(response.header("missing"), None);
        assert_eq!(response.text_lossy(), "<p>hi</p>");
        assert!(Response::default().is_empty());
    }

    #[test]
    fn throughput_guards_zero_values() {
        assert_eq!(throughput(0, Duration::from_secs(1)), 0.0);
        assert_eq!(throughput(100, Duration::ZERO), 0.0);
        assert_eq!(throughput(1024, Duration::from_millis(500)), 2048.0);
        let timing = Timing::failed(None, Duration::from_secs(1), 10);
        assert_eq!(timing.throughput_bps, 0.0);
    }

    #[test]
    fn outcome_constructors() {
        let ok = RequestOutcome::success(Response::default(), 1, Timing::default());
        assert!(ok.is_success());
        let failed = RequestOutcome::failure(
            RequestError::new(ErrorKind::Timeout, "late"),
            3,
            Response::default(),
            Timing::default(),
        );
        assert!(!failed.is_success());
        assert_eq!(failed.attempts, 3);
        assert_eq!(failed.status(), None);
    }
}
