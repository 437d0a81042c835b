// Metric macro wrappers; no-ops unless the `telemetry` feature is on.
#[cfg(feature = "telemetry")]
#[allow(unused_macros)]
macro_rules! t_counter {
    ($($tt:tt)*) => {
        metrics::counter!($($tt)*)
    };
}

#[cfg(not(feature = "telemetry"))]
#[allow(unused_macros)]
macro_rules! t_counter {
    ($($tt:tt)*) => {
        $crate::macros::NoopCounter
    };
}

#[cfg(feature = "telemetry")]
#[allow(unused_macros)]
macro_rules! t_histogram {
    ($($tt:tt)*) => {
        metrics::histogram!($($tt)*)
    };
}

#[cfg(not(feature = "telemetry"))]
#[allow(unused_macros)]
macro_rules! t_histogram {
    ($($tt:tt)*) => {
        $crate::macros::NoopHistogram
    };
}

#[cfg(feature = "telemetry")]
#[allow(unused_macros)]
macro_rules! t_gauge {
    ($($tt:tt)*) => {
        metrics::gauge!($($tt)*)
    };
}

#[cfg(not(feature = "telemetry"))]
#[allow(unused_macros)]
macro_rules! t_gauge {
    ($($tt:tt)*) => {
        $crate::macros::NoopGauge
    };
}

#[cfg(not(feature = "telemetry"))]
#[allow(dead_code)]
#[derive(Copy, Clone)]
pub(crate) struct NoopCounter;

#[cfg(not(feature = "telemetry"))]
impl NoopCounter {
    pub(crate) fn increment(&self, _value: u64) {}
}

#[cfg(not(feature = "telemetry"))]
#[allow(dead_code)]
#[derive(Copy, Clone)]
pub(crate) struct NoopHistogram;

#[cfg(not(feature = "telemetry"))]
impl NoopHistogram {
    pub(crate) fn record(&self, _value: f64) {}
}

#[cfg(not(feature = "telemetry"))]
#[allow(dead_code)]
#[derive(Copy, Clone)]
pub(crate) struct NoopGauge;

#[cfg(not(feature = "telemetry"))]
impl NoopGauge {
    pub(crate) fn increment(&self, _value: f64) {}

    pub(crate) fn decrement(&self, _value: f64) {}
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(feature = "telemetry"))]
    fn noop_metrics_do_not_panic() {
        t_counter!("strand_test_total").increment(1);
        t_histogram!("strand_test_ns").record(10.0);
        t_gauge!("strand_test_inflight").increment(1.0);
        t_gauge!("strand_test_inflight").decrement(1.0);
    }

    #[test]
    #[cfg(feature = "telemetry")]
    fn metrics_without_recorder_do_not_panic() {
        // The metrics facade falls back to a no-op recorder when none is installed.
        t_counter!("strand_test_total").increment(1);
        t_histogram!("strand_test_ns").record(10.0);
        t_gauge!("strand_test_inflight").increment(1.0);
    }
}
