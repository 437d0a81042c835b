// Concurrent fan-out of independent requests over a connection pool.
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::orchestrator::{self, RequestPolicy};
use crate::error::{ErrorKind, RequestError};
use crate::request::{OutboundRequest, RequestOutcome, Response, Timing};
use crate::transport::{MuxConnection, StreamTransport};

/// Run every request concurrently, at most `concurrency_limit` at a time,
/// spreading them round-robin over `pool`.
///
/// The result has one outcome per request, at the request's original index.
pub async fn fan_out<T: StreamTransport>(
    pool: &[Arc<MuxConnection<T>>],
    requests: Vec<OutboundRequest>,
    concurrency_limit: usize,
    policy: &RequestPolicy,
) -> Vec<RequestOutcome> {
    let total = requests.len();
    if pool.is_empty() {
        tracing::warn!(requests = total, "fan-out with an empty connection pool");
        return (0..total)
            .map(|_| missing_outcome(ErrorKind::Connect, "no connection available"))
            .collect();
    }
    // At most one permit per request; stays under Semaphore::MAX_PERMITS.
    let permits = Arc::new(Semaphore::new(concurrency_limit.clamp(1, total.max(1))));
    let mut tasks = JoinSet::new();
    for (index, request) in requests.into_iter().enumerate() {
        let conn = Arc::clone(&pool[index % pool.len()]);
        let permits = Arc::clone(&permits);
        let policy = policy.clone();
        tasks.spawn(async move {
            // The permit is held until the outcome exists, so it bounds open streams.
            let Ok(_permit) = permits.acquire_owned().await else {
                return (
                    index,
                    missing_outcome(ErrorKind::Transport, "fan-out limiter closed"),
                );
            };
            t_gauge!("strand_client_fanout_inflight").increment(1.0);
            let outcome = orchestrator::request(&conn, &request, &policy).await;
            t_gauge!("strand_client_fanout_inflight").decrement(1.0);
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<RequestOutcome>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(err) => tracing::warn!(error = %err, "fan-out task did not finish"),
        }
    }
    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| missing_outcome(ErrorKind::Transport, "request task aborted"))
        })
        .collect()
}

fn missing_outcome(kind: ErrorKind, message: &str) -> RequestOutcome {
    RequestOutcome::failure(
        RequestError::new(kind, message),
        0,
        Response::default(),
        Timing::default(),
    )
}
