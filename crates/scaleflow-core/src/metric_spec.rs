//! Metric-spec construction — the persisted windowing record consumed by
//! the aggregator, the decision engine, and the external scraper.
//!
//! Construction must be deterministic: the reconciler diffs the built
//! record against the persisted one, so the same target, scrape name and
//! defaults must always produce a byte-identical result. Annotations are
//! therefore held in a `BTreeMap` (stable iteration order) and copied
//! verbatim so downstream consumers can re-derive the windows from an
//! explicit override without re-resolving defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::ClusterDefaults;
use crate::types::{ScalingTarget, TargetKey};
use crate::window::resolve_window_spec;

/// Reference back to the source target. The reconciliation layer uses it
/// to garbage-collect the record when the target is deleted; the core
/// only stamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub namespace: String,
    pub name: String,
}

/// Persisted windowing specification for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub namespace: String,
    pub name: String,
    /// Scaling annotations copied verbatim from the target.
    pub annotations: BTreeMap<String, String>,
    pub owner: OwnerRef,
    /// Service/endpoint name the scraper should poll.
    pub scrape_target: String,
    pub stable_window: Duration,
    pub panic_window: Duration,
}

/// Prefix identifying scaling-relevant annotations.
const ANNOTATION_PREFIX: &str = "autoscaling.scaleflow.dev/";

/// Build the metric spec for a target.
pub fn make_metric_spec(
    target: &ScalingTarget,
    scrape_target: &str,
    defaults: &ClusterDefaults,
) -> MetricSpec {
    let windows = resolve_window_spec(&target.annotations, defaults);
    let TargetKey { namespace, name } = target.key.clone();
    MetricSpec {
        annotations: scaling_annotations(&target.annotations),
        owner: OwnerRef {
            namespace: namespace.clone(),
            name: name.clone(),
        },
        namespace,
        name,
        scrape_target: scrape_target.to_string(),
        stable_window: windows.stable_window,
        panic_window: windows.panic_window,
    }
}

fn scaling_annotations(annotations: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    annotations
        .iter()
        .filter(|(k, _)| k.starts_with(ANNOTATION_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BUCKET_SIZE, PANIC_WINDOW_PERCENTAGE_ANNOTATION, WINDOW_ANNOTATION,
    };
    use crate::types::ScalingMetric;

    fn target(annotations: &[(&str, &str)]) -> ScalingTarget {
        let mut t = ScalingTarget::with_defaults(
            TargetKey::new("test-namespace", "test-name"),
            ScalingMetric::Concurrency,
            &ClusterDefaults::default(),
        );
        t.annotations = annotations
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        t
    }

    #[test]
    fn defaults() {
        let spec = make_metric_spec(&target(&[]), "ik", &ClusterDefaults::default());
        assert_eq!(spec.scrape_target, "ik");
        assert_eq!(spec.stable_window, Duration::from_secs(60));
        assert_eq!(spec.panic_window, Duration::from_secs(6));
        assert_eq!(spec.owner.namespace, "test-namespace");
        assert_eq!(spec.owner.name, "test-name");
        assert!(spec.annotations.is_empty());
    }

    #[test]
    fn too_short_panic_window_raised_to_bucket() {
        let t = target(&[
            (WINDOW_ANNOTATION, "10s"),
            (PANIC_WINDOW_PERCENTAGE_ANNOTATION, "10"),
        ]);
        let spec = make_metric_spec(&t, "wil", &ClusterDefaults::default());
        assert_eq!(spec.stable_window, Duration::from_secs(10));
        assert_eq!(spec.panic_window, BUCKET_SIZE);
    }

    #[test]
    fn longer_stable_window_defaults_to_ten_percent_panic() {
        let t = target(&[(WINDOW_ANNOTATION, "10m")]);
        let spec = make_metric_spec(&t, "nu", &ClusterDefaults::default());
        assert_eq!(spec.stable_window, Duration::from_secs(600));
        assert_eq!(spec.panic_window, Duration::from_secs(60));
    }

    #[test]
    fn longer_panic_window_percentage() {
        let t = target(&[(PANIC_WINDOW_PERCENTAGE_ANNOTATION, "50")]);
        let spec = make_metric_spec(&t, "dansen", &ClusterDefaults::default());
        assert_eq!(spec.panic_window, Duration::from_secs(30));
    }

    #[test]
    fn panic_window_percentage_rounding() {
        let t = target(&[(PANIC_WINDOW_PERCENTAGE_ANNOTATION, "51")]);
        let spec = make_metric_spec(&t, "dansen", &ClusterDefaults::default());
        assert_eq!(spec.panic_window, Duration::from_secs(31));
    }

    #[test]
    fn annotations_copied_verbatim() {
        let t = target(&[
            (WINDOW_ANNOTATION, "90s"),
            (PANIC_WINDOW_PERCENTAGE_ANNOTATION, "20"),
            ("unrelated.example.com/team", "platform"),
        ]);
        let spec = make_metric_spec(&t, "svc", &ClusterDefaults::default());
        assert_eq!(
            spec.annotations.get(WINDOW_ANNOTATION).map(String::as_str),
            Some("90s")
        );
        assert_eq!(
            spec.annotations
                .get(PANIC_WINDOW_PERCENTAGE_ANNOTATION)
                .map(String::as_str),
            Some("20")
        );
        // Non-scaling annotations are not carried.
        assert!(!spec.annotations.contains_key("unrelated.example.com/team"));
    }

    #[test]
    fn construction_is_deterministic() {
        let defaults = ClusterDefaults::default();
        let t = target(&[
            (WINDOW_ANNOTATION, "90s"),
            (PANIC_WINDOW_PERCENTAGE_ANNOTATION, "20"),
        ]);

        let a = make_metric_spec(&t, "svc", &defaults);
        let b = make_metric_spec(&t, "svc", &defaults);
        assert_eq!(a, b);

        // Byte-identical once serialized, which is what reconciliation
        // diffing relies on.
        let a_bytes = serde_json::to_vec(&a).unwrap();
        let b_bytes = serde_json::to_vec(&b).unwrap();
        assert_eq!(a_bytes, b_bytes);
    }
}
