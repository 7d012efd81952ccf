//! scaleflow-metrics — windowed aggregation of scrape samples.
//!
//! Accumulates the scraper's `(timestamp, concurrency, rps)` stream into
//! fixed-granularity time buckets per target and answers the decision
//! engine's "what was the average over the stable / panic window ending
//! now" reads.
//!
//! # Architecture
//!
//! ```text
//! MetricAggregator
//!   ├── register()  ← reconciler, on MetricSpec create/update
//!   ├── record()    ← scraper, per sample
//!   ├── readings()  → stable + panic WindowReading for the decider
//!   └── remove()    ← reconciler, on target deletion
//!
//! TimedBuckets (4 per target: stable/panic × concurrency/rps)
//!   circular buffer of {sum, count} buckets, lazy eviction
//! ```
//!
//! Ingestion and decision reads run concurrently: the registry is behind
//! a read lock, each target's windows behind their own short-lived
//! mutex, so recording for one target never blocks reads for another.

pub mod collector;
pub mod window_buckets;

pub use collector::{MetricAggregator, MetricReadings};
pub use window_buckets::{TimedBuckets, WindowReading};
