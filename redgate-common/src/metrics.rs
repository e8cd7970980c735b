//! Latency metrics shared by dispatch and scheduler code.
//!
//! Handler latencies are recorded in microseconds and clamped to the histogram range so one
//! stalled flush cannot skew aggregate statistics past the configured ceiling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::containers::HotMap;

/// Upper bound of recordable latency, in microseconds.
pub const MAX_LATENCY_MICROS: u64 = 60_000_000;

/// One microsecond latency histogram handle.
///
/// Handles are cheap to clone through `Arc` and are stored inside command table entries, so
/// recording on the hot path never goes through the registry lock.
#[derive(Debug)]
pub struct LatencyHistogram {
    name: String,
    count: AtomicU64,
    sum_micros: AtomicU64,
    min_micros: AtomicU64,
    max_micros: AtomicU64,
}

/// Point-in-time copy of one histogram's aggregate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySnapshot {
    /// Number of recorded observations.
    pub count: u64,
    /// Sum of all observations in microseconds.
    pub sum_micros: u64,
    /// Smallest observation in microseconds, `u64::MAX` when empty.
    pub min_micros: u64,
    /// Largest observation in microseconds, zero when empty.
    pub max_micros: u64,
}

impl LatencySnapshot {
    /// Mean observation in microseconds, zero when empty.
    #[must_use]
    pub fn mean_micros(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.sum_micros / self.count
        }
    }
}

impl LatencyHistogram {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            count: AtomicU64::new(0),
            sum_micros: AtomicU64::new(0),
            min_micros: AtomicU64::new(u64::MAX),
            max_micros: AtomicU64::new(0),
        }
    }

    /// Registered metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records one observation, clamped to [`MAX_LATENCY_MICROS`].
    pub fn record_micros(&self, micros: u64) {
        let micros = micros.min(MAX_LATENCY_MICROS);
        let _ = self.count.fetch_add(1, Ordering::Relaxed);
        let _ = self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        let _ = self.min_micros.fetch_min(micros, Ordering::Relaxed);
        let _ = self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    /// Returns the current aggregate state.
    #[must_use]
    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum_micros: self.sum_micros.load(Ordering::Relaxed),
            min_micros: self.min_micros.load(Ordering::Relaxed),
            max_micros: self.max_micros.load(Ordering::Relaxed),
        }
    }
}

/// Process-wide registry of latency histograms, keyed by metric name.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    histograms: RwLock<HotMap<String, Arc<LatencyHistogram>>>,
}

impl MetricsRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the histogram registered under `name`, creating it on first use.
    #[must_use]
    pub fn latency_histogram(&self, name: &str) -> Arc<LatencyHistogram> {
        let histograms = self
            .histograms
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(histogram) = histograms.get(name) {
            return Arc::clone(histogram);
        }
        drop(histograms);

        let mut histograms = self
            .histograms
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            histograms
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(LatencyHistogram::new(name))),
        )
    }

    /// Names of all registered histograms.
    #[must_use]
    pub fn histogram_names(&self) -> Vec<String> {
        self.histograms
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_LATENCY_MICROS, MetricsRegistry};
    use googletest::prelude::*;
    use rstest::rstest;

    #[rstest]
    fn histogram_tracks_count_sum_and_bounds() {
        let registry = MetricsRegistry::new();
        let histogram = registry.latency_histogram("redgate.service.handler_latency.get");

        histogram.record_micros(10);
        histogram.record_micros(30);
        histogram.record_micros(20);

        let snapshot = histogram.snapshot();
        assert_that!(snapshot.count, eq(3_u64));
        assert_that!(snapshot.sum_micros, eq(60_u64));
        assert_that!(snapshot.min_micros, eq(10_u64));
        assert_that!(snapshot.max_micros, eq(30_u64));
        assert_that!(snapshot.mean_micros(), eq(20_u64));
    }

    #[rstest]
    fn histogram_clamps_to_configured_ceiling() {
        let registry = MetricsRegistry::new();
        let histogram = registry.latency_histogram("redgate.service.handler_latency.set");

        histogram.record_micros(u64::MAX);
        assert_that!(histogram.snapshot().max_micros, eq(MAX_LATENCY_MICROS));
    }

    #[rstest]
    fn registry_returns_one_shared_handle_per_name() {
        let registry = MetricsRegistry::new();
        let first = registry.latency_histogram("redgate.service.handler_latency.error");
        let second = registry.latency_histogram("redgate.service.handler_latency.error");

        first.record_micros(5);
        assert_that!(second.snapshot().count, eq(1_u64));
        assert_that!(registry.histogram_names().len(), eq(1_usize));
    }
}
