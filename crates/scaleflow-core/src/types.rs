//! Domain types for the ScaleFlow decision core.
//!
//! These are the in-memory records exchanged with the platform's
//! reconciler (target snapshots in, decisions out) and scraper (samples
//! in). The reconciler owns target lifecycle; the core only ever sees an
//! immutable snapshot per evaluation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use crate::config::ClusterDefaults;

/// Namespace-scoped identity of an autoscaled workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetKey {
    pub namespace: String,
    pub name: String,
}

impl TargetKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Which metric a target scales on. The two are mutually exclusive per
/// target; both streams are still aggregated so flipping the annotation
/// does not restart from an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMetric {
    #[default]
    Concurrency,
    Rps,
}

/// Immutable snapshot of one autoscaled workload.
///
/// Produced by the reconciler from the workload's declared scaling
/// intent plus cluster defaults; consumed by the decision engine and the
/// metric-spec builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingTarget {
    pub key: TargetKey,
    /// Metric the target scales on.
    pub metric: ScalingMetric,
    /// Desired average concurrency per replica (> 0).
    pub concurrency_target: f64,
    /// Desired average requests per second per replica (> 0).
    pub rps_target: f64,
    /// Fraction of the target treated as usable capacity, in (0, 1].
    pub target_utilization: f64,
    /// Hard per-container concurrency limit. 0 means unlimited.
    pub container_concurrency: u32,
    pub scale_to_zero_enabled: bool,
    /// Replica bounds. `min_replicas` of 0 only takes effect when
    /// scale-to-zero is enabled.
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Raw scaling annotations (window override, panic-window-percentage
    /// override). Copied verbatim onto the MetricSpec.
    pub annotations: BTreeMap<String, String>,
}

impl ScalingTarget {
    /// Build a target snapshot with all scaling parameters taken from
    /// cluster defaults.
    pub fn with_defaults(key: TargetKey, metric: ScalingMetric, defaults: &ClusterDefaults) -> Self {
        Self {
            key,
            metric,
            concurrency_target: defaults.container_concurrency_target_default,
            rps_target: defaults.rps_target_default,
            target_utilization: defaults.target_utilization,
            container_concurrency: 0,
            scale_to_zero_enabled: defaults.enable_scale_to_zero,
            min_replicas: 0,
            max_replicas: u32::MAX,
            annotations: BTreeMap::new(),
        }
    }

    /// Per-replica capacity the decision engine divides observed load by.
    ///
    /// The concurrency target never exceeds the hard per-container limit
    /// when one is set; the utilization fraction then reserves headroom
    /// below that.
    pub fn effective_target(&self) -> f64 {
        let raw = match self.metric {
            ScalingMetric::Concurrency => {
                if self.container_concurrency > 0 {
                    self.concurrency_target
                        .min(self.container_concurrency as f64)
                } else {
                    self.concurrency_target
                }
            }
            ScalingMetric::Rps => self.rps_target,
        };
        raw * self.target_utilization
    }
}

/// One observation delivered by the scraper: averages across a target's
/// replicas over one sampling interval. Consumed exactly once; never
/// mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: SystemTime,
    /// Average in-flight requests per replica over the interval.
    pub avg_concurrency: f64,
    /// Average requests per second over the interval.
    pub request_rate: f64,
    /// Replicas that reported in this interval.
    pub pod_count: u32,
}

impl Sample {
    /// Whether the sample carries usable values. Non-finite or negative
    /// observations are dropped by the aggregator rather than recorded.
    pub fn is_well_formed(&self) -> bool {
        self.avg_concurrency.is_finite()
            && self.avg_concurrency >= 0.0
            && self.request_rate.is_finite()
            && self.request_rate >= 0.0
    }
}
