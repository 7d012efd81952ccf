//! Window resolution — per-target overrides plus cluster defaults into
//! concrete stable/panic averaging windows.
//!
//! Resolution is pure and total: an override that fails to parse, or
//! parses to an unusable value, falls back to the cluster default rather
//! than erroring. The resolved spec always satisfies
//! `BUCKET_SIZE <= panic_window <= stable_window`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{
    BUCKET_SIZE, ClusterDefaults, PANIC_WINDOW_PERCENTAGE_ANNOTATION, WINDOW_ANNOTATION,
};

/// Resolved averaging windows for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub stable_window: Duration,
    pub panic_window: Duration,
}

/// Parse a duration string like "30s", "5m", "1h" or a bare number of
/// seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Effective stable window: annotation override if it parses to a
/// duration of at least one bucket, else the cluster default.
pub fn resolve_stable_window(
    annotations: &BTreeMap<String, String>,
    defaults: &ClusterDefaults,
) -> Duration {
    annotations
        .get(WINDOW_ANNOTATION)
        .and_then(|s| parse_duration(s))
        .filter(|d| *d >= BUCKET_SIZE)
        .unwrap_or(defaults.stable_window)
}

/// Effective panic-window percentage: annotation override if it parses
/// to a percent in (0, 100], else the cluster default.
pub fn resolve_panic_window_percentage(
    annotations: &BTreeMap<String, String>,
    defaults: &ClusterDefaults,
) -> f64 {
    annotations
        .get(PANIC_WINDOW_PERCENTAGE_ANNOTATION)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|p| p.is_finite() && *p > 0.0 && *p <= 100.0)
        .unwrap_or(defaults.panic_window_percentage)
}

/// Resolve both windows for one target.
pub fn resolve_window_spec(
    annotations: &BTreeMap<String, String>,
    defaults: &ClusterDefaults,
) -> WindowSpec {
    let stable_window = resolve_stable_window(annotations, defaults);
    let percentage = resolve_panic_window_percentage(annotations, defaults);
    WindowSpec {
        stable_window,
        panic_window: panic_window(stable_window, percentage),
    }
}

/// Panic window from a stable window and percentage: rounded half-up to
/// whole seconds, then raised to one bucket if the result would fall
/// below the aggregator's granularity.
fn panic_window(stable_window: Duration, percentage: f64) -> Duration {
    // f64::round is round-half-away-from-zero, which is half-up for the
    // non-negative values possible here: 51% of 60s -> 30.6 -> 31.
    let secs = (stable_window.as_secs_f64() * percentage / 100.0).round() as u64;
    Duration::from_secs(secs)
        .max(BUCKET_SIZE)
        .min(stable_window.max(BUCKET_SIZE))
}
