//! Metric aggregator — per-target windowed accumulation of samples.
//!
//! Keeps four windows per target (stable and panic, for concurrency and
//! for request rate). Both metric streams are always aggregated; the
//! target's configured scaling metric only selects which pair a read
//! returns, so flipping the metric annotation does not restart from an
//! empty window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use scaleflow_core::{BUCKET_SIZE, Sample, ScalingMetric, TargetKey, WindowSpec};

use crate::window_buckets::{TimedBuckets, WindowReading};

/// Stable and panic reads for one metric of one target, taken at the
/// same instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricReadings {
    pub stable: WindowReading,
    pub panic: WindowReading,
}

struct WindowPair {
    stable: TimedBuckets,
    panic: TimedBuckets,
}

impl WindowPair {
    fn new(windows: &WindowSpec) -> Self {
        Self {
            stable: TimedBuckets::new(windows.stable_window, BUCKET_SIZE),
            panic: TimedBuckets::new(windows.panic_window, BUCKET_SIZE),
        }
    }

    /// Returns false if the sample predated the stable window.
    fn record(&mut self, at: SystemTime, value: f64) -> bool {
        let retained = self.stable.record(at, value);
        self.panic.record(at, value);
        retained
    }

    fn read(&self, now: SystemTime) -> MetricReadings {
        MetricReadings {
            stable: self.stable.read(now),
            panic: self.panic.read(now),
        }
    }
}

struct TargetWindows {
    windows: WindowSpec,
    concurrency: WindowPair,
    rps: WindowPair,
}

/// Aggregates scrape samples per target.
///
/// The registry is shared between the scraper-facing ingestion path and
/// the decision engine: registry reads take a read lock, each target's
/// buckets their own mutex, so recording never blocks decisions for
/// other targets.
pub struct MetricAggregator {
    targets: RwLock<HashMap<TargetKey, Arc<Mutex<TargetWindows>>>>,
}

impl Default for MetricAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricAggregator {
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
        }
    }

    /// Register a target with its resolved windows. A no-op when the
    /// target is already registered with the same windows; changed
    /// windows rebuild the buckets (accumulated samples restart).
    pub async fn register(&self, key: &TargetKey, windows: &WindowSpec) {
        let mut targets = self.targets.write().await;
        if let Some(existing) = targets.get(key)
            && existing.lock().await.windows == *windows
        {
            return;
        }
        targets.insert(
            key.clone(),
            Arc::new(Mutex::new(TargetWindows {
                windows: *windows,
                concurrency: WindowPair::new(windows),
                rps: WindowPair::new(windows),
            })),
        );
        debug!(target = %key, ?windows, "registered target for aggregation");
    }

    /// Discard a target's accumulated state.
    pub async fn remove(&self, key: &TargetKey) {
        let mut targets = self.targets.write().await;
        if targets.remove(key).is_some() {
            debug!(target = %key, "removed target from aggregation");
        }
    }

    /// Record one scrape sample. Recording to an unknown target is a
    /// no-op; malformed and stale samples are dropped.
    pub async fn record(&self, key: &TargetKey, sample: &Sample) {
        if !sample.is_well_formed() {
            debug!(target = %key, ?sample, "dropping malformed sample");
            return;
        }

        let entry = {
            let targets = self.targets.read().await;
            targets.get(key).cloned()
        };
        let Some(entry) = entry else {
            return;
        };

        let mut windows = entry.lock().await;
        let retained = windows
            .concurrency
            .record(sample.timestamp, sample.avg_concurrency);
        windows.rps.record(sample.timestamp, sample.request_rate);
        if !retained {
            debug!(target = %key, at = ?sample.timestamp, "dropping out-of-order sample");
        }
    }

    /// Current stable and panic readings for the given metric.
    ///
    /// `None` when the target is unknown or has never produced a sample;
    /// callers must treat that distinctly from a reading whose window is
    /// currently empty.
    pub async fn readings(
        &self,
        key: &TargetKey,
        metric: ScalingMetric,
        now: SystemTime,
    ) -> Option<MetricReadings> {
        let entry = {
            let targets = self.targets.read().await;
            targets.get(key).cloned()
        };
        let windows = entry?;
        let windows = windows.lock().await;
        let pair = match metric {
            ScalingMetric::Concurrency => &windows.concurrency,
            ScalingMetric::Rps => &windows.rps,
        };
        if !pair.stable.ever_recorded() {
            return None;
        }
        Some(pair.read(now))
    }

    /// Keys of all registered targets.
    pub async fn registered(&self) -> Vec<TargetKey> {
        let targets = self.targets.read().await;
        targets.keys().cloned().collect()
    }
}
