//! scaleflow-core — shared types and configuration for the ScaleFlow
//! autoscaling decision core.
//!
//! Holds the domain model exchanged with the platform's reconciler and
//! scraper (target snapshots, scrape samples, metric specs), the
//! cluster-wide default configuration, and the pure window-resolution
//! logic that turns per-target annotation overrides plus defaults into
//! concrete stable/panic averaging windows.
//!
//! Everything here is deliberately free of I/O and background tasks:
//! the reconciler passes immutable snapshots in, records come out.

pub mod config;
pub mod error;
pub mod metric_spec;
pub mod types;
pub mod window;

pub use config::{
    BUCKET_SIZE, ClusterDefaults, PANIC_WINDOW_PERCENTAGE_ANNOTATION, WINDOW_ANNOTATION,
};
pub use error::{ConfigError, ConfigResult};
pub use metric_spec::{MetricSpec, OwnerRef, make_metric_spec};
pub use types::{Sample, ScalingMetric, ScalingTarget, TargetKey};
pub use window::{WindowSpec, parse_duration, resolve_window_spec};
