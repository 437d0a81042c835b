// One logical request: open a stream, send, assemble, retry on timeout or transport failure.
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ErrorKind, RequestError};
use crate::request::{OutboundRequest, RequestOutcome, Response, Timing};
use crate::stream::{Progress, ResponseAssembler, StreamId};
use crate::transport::{MuxConnection, StreamTransport};

/// Per-request timeout and retry budget.
///
/// ```
/// use strand_client::RequestPolicy;
/// use std::time::Duration;
///
/// let policy = RequestPolicy::default();
/// assert_eq!(policy.timeout, Duration::from_secs(10));
/// assert_eq!(policy.max_attempts, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPolicy {
    pub timeout: Duration,
    /// Total attempts including the first; values below 1 act as 1.
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

struct AttemptFailure {
    error: RequestError,
    partial: Response,
    timing: Timing,
}

/// Run `request` on `conn` until it succeeds or the attempt budget runs out.
///
/// Never returns an error: failures are described by the outcome.
pub async fn request<T: StreamTransport>(
    conn: &MuxConnection<T>,
    request: &OutboundRequest,
    policy: &RequestPolicy,
) -> RequestOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match attempt_once(conn, request, policy.timeout).await {
            Ok((response, timing)) => {
                t_histogram!("strand_client_request_latency_ms")
                    .record(timing.latency.as_secs_f64() * 1_000.0);
                return RequestOutcome::success(response, attempt, timing);
            }
            Err(failure) => {
                let retry = failure.error.kind.is_retryable() && attempt < max_attempts;
                if !retry {
                    tracing::warn!(
                        path = request.path(),
                        attempts = attempt,
                        error = %failure.error,
                        "request failed"
                    );
                    return RequestOutcome::failure(
                        failure.error,
                        attempt,
                        failure.partial,
                        failure.timing,
                    );
                }
                tracing::debug!(
                    path = request.path(),
                    attempt,
                    error = %failure.error,
                    "retrying request"
                );
                conn.counters().record_retry();
                if !policy.retry_backoff.is_zero() {
                    tokio::time::sleep(policy.retry_backoff).await;
                }
            }
        }
    }
}

// Retires the stream and closes it at the transport when the attempt ends,
// including when the caller drops the request future mid-flight.
struct StreamGuard<'a, T: StreamTransport> {
    conn: &'a MuxConnection<T>,
    stream_id: StreamId,
}

impl<T: StreamTransport> Drop for StreamGuard<'_, T> {
    fn drop(&mut self) {
        self.conn.demux().retire(self.stream_id);
        self.conn.transport().close_stream(self.stream_id);
    }
}

async fn attempt_once<T: StreamTransport>(
    conn: &MuxConnection<T>,
    request: &OutboundRequest,
    timeout: Duration,
) -> Result<(Response, Timing), AttemptFailure> {
    let (stream_id, mut sink) = conn.demux().open_stream();
    let _guard = StreamGuard { conn, stream_id };
    let mut assembler = ResponseAssembler::new(stream_id);
    let mut first_event: Option<Instant> = None;
    let started = Instant::now();

    let exchange = async {
        let sent = conn
            .transport()
            .send_frame(
                stream_id,
                request.header_fields(),
                request.body().cloned(),
                true,
            )
            .await;
        if let Err(err) = sent {
            return Err(err);
        }
        loop {
            let Some(event) = sink.recv().await else {
                return Err(RequestError::transport("event route closed"));
            };
            first_event.get_or_insert_with(Instant::now);
            match assembler.apply(event) {
                Ok(Progress::Pending) => {}
                Ok(Progress::Complete) => return Ok(()),
                Ok(Progress::Failed) => {
                    return Err(assembler
                        .failure()
                        .cloned()
                        .unwrap_or_else(|| RequestError::transport("stream failed")));
                }
                Err(violation) => {
                    conn.counters().record_protocol_violation();
                    tracing::debug!(error = %violation, "protocol violation");
                }
            }
        }
    };
    let result = match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(RequestError::timeout(timeout)),
    };

    let latency = started.elapsed();
    let rtt = first_event.map(|at| at.duration_since(started));
    conn.counters().record_decode_errors(assembler.decode_errors());
    match result {
        Ok(()) => {
            let response = assembler.finish();
            let timing = Timing::measured(rtt, latency, response.body.len());
            tracing::debug!(
                stream_id = %stream_id,
                status = ?response.status,
                bytes = response.body.len(),
                latency_ms = latency.as_millis() as u64,
                "response complete"
            );
            Ok((response, timing))
        }
        Err(error) => {
            match error.kind {
                ErrorKind::Timeout => conn.counters().record_timeout(),
                ErrorKind::Transport => conn.counters().record_transport_error(),
                ErrorKind::ProtocolViolation => conn.counters().record_protocol_violation(),
                _ => {}
            }
            assembler.fail(error.clone());
            let partial = assembler.finish();
            let timing = Timing::failed(rtt, latency, partial.body.len());
            Err(AttemptFailure {
                error,
                partial,
                timing,
            })
        }
    }
}
