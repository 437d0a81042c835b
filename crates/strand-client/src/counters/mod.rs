// Per-connection diagnostic counters for stream routing and assembly.
//
// These are always maintained (unlike the `telemetry` metrics) because the
// dropped/violation counts are part of what a benchmark run reports.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StreamCounters {
    dropped_events: AtomicU64,
    protocol_violations: AtomicU64,
    decode_errors: AtomicU64,
    timeouts: AtomicU64,
    transport_errors: AtomicU64,
    retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamCountersSnapshot {
    pub dropped_events: u64,
    pub protocol_violations: u64,
    pub decode_errors: u64,
    pub timeouts: u64,
    pub transport_errors: u64,
    pub retries: u64,
}

impl StreamCounters {
    pub(crate) fn record_dropped_event(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
        t_counter!("strand_client_dropped_events_total").increment(1);
    }

    pub(crate) fn record_protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
        t_counter!("strand_client_protocol_violations_total").increment(1);
    }

    pub(crate) fn record_decode_errors(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.decode_errors.fetch_add(count, Ordering::Relaxed);
        t_counter!("strand_client_decode_errors_total").increment(count);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        t_counter!("strand_client_attempt_failures_total", "kind" => "timeout").increment(1);
    }

    pub(crate) fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
        t_counter!("strand_client_attempt_failures_total", "kind" => "transport").increment(1);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        t_counter!("strand_client_retries_total").increment(1);
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StreamCountersSnapshot {
        StreamCountersSnapshot {
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

impl std::ops::Add for StreamCountersSnapshot {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            dropped_events: self.dropped_events + other.dropped_events,
            protocol_violations: self.protocol_violations + other.protocol_violations,
            decode_errors: self.decode_errors + other.decode_errors,
            timeouts: self.timeouts + other.timeouts,
            transport_errors: self.transport_errors + other.transport_errors,
            retries: self.retries + other.retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_values() {
        let counters = StreamCounters::default();
        counters.record_dropped_event();
        counters.record_dropped_event();
        counters.record_protocol_violation();
        counters.record_decode_errors(0);
        counters.record_decode_errors(3);
        counters.record_timeout();
        counters.record_retry();
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.dropped_events, 2);
        assert_eq!(counters.dropped_events(), 2);
        assert_eq!(snapshot.protocol_violations, 1);
        assert_eq!(snapshot.decode_errors, 3);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.transport_errors, 0);
        assert_eq!(snapshot.retries, 1);
    }

    #[test]
    fn snapshots_sum_across_connections() {
        let a = StreamCountersSnapshot {
            dropped_events: 1,
            retries: 2,
            ..Default::default()
        };
        let b = StreamCountersSnapshot {
            dropped_events: 4,
            timeouts: 1,
            ..Default::default()
        };
        let total = a + b;
        assert_eq!(total.dropped_events, 5);
        assert_eq!(total.retries, 2);
        assert_eq!(total.timeouts, 1);
    }
}
