//! Multi-target engine: owns one `TargetScaler` per target, reads the
//! shared aggregator each tick, and emits decisions through a callback
//! to the reconciler.
//!
//! `&mut self` on the evaluate path keeps any one target's tick
//! at-most-one-in-flight; sample ingestion goes straight to the
//! aggregator and never blocks on decisions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use scaleflow_core::{ClusterDefaults, ScalingTarget, TargetKey};
use scaleflow_metrics::MetricAggregator;

use crate::error::{EngineError, EngineResult};
use crate::scaler::{ScaleDecision, TargetScaler};

/// Callback type for applying decisions.
///
/// The engine calls this with each decision; failures are logged and do
/// not stop the tick.
pub type DecisionCallback = Box<dyn Fn(ScaleDecision) -> BoxFuture + Send + Sync>;

type BoxFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>>;

/// The decision engine across all registered targets.
pub struct AutoscaleEngine {
    aggregator: Arc<MetricAggregator>,
    defaults: ClusterDefaults,
    scalers: HashMap<TargetKey, TargetScaler>,
    decision_fn: Option<DecisionCallback>,
}

impl AutoscaleEngine {
    pub fn new(aggregator: Arc<MetricAggregator>, defaults: ClusterDefaults) -> Self {
        Self {
            aggregator,
            defaults,
            scalers: HashMap::new(),
            decision_fn: None,
        }
    }

    /// Set the callback used to apply decisions.
    pub fn with_decision_fn(mut self, f: DecisionCallback) -> Self {
        self.decision_fn = Some(f);
        self
    }

    /// Add a target or apply a changed snapshot, (re)registering its
    /// windows with the aggregator.
    pub async fn upsert_target(&mut self, target: ScalingTarget) {
        let key = target.key.clone();
        match self.scalers.get_mut(&key) {
            Some(scaler) => scaler.update(target, &self.defaults),
            None => {
                debug!(target = %key, "adding target");
                self.scalers
                    .insert(key.clone(), TargetScaler::new(target, &self.defaults));
            }
        }
        let windows = *self.scalers[&key].windows();
        self.aggregator.register(&key, &windows).await;
    }

    /// Drop a target and its accumulated state.
    pub async fn remove_target(&mut self, key: &TargetKey) {
        if self.scalers.remove(key).is_some() {
            debug!(target = %key, "removing target");
        }
        self.aggregator.remove(key).await;
    }

    /// Swap in new cluster defaults, re-resolving every target against
    /// them.
    pub async fn update_defaults(&mut self, defaults: ClusterDefaults) {
        self.defaults = defaults;
        let keys: Vec<TargetKey> = self.scalers.keys().cloned().collect();
        for key in keys {
            let Some(scaler) = self.scalers.get_mut(&key) else {
                continue;
            };
            let target = scaler.target().clone();
            scaler.update(target, &self.defaults);
            let windows = *scaler.windows();
            self.aggregator.register(&key, &windows).await;
        }
    }

    /// Evaluate a single target now. `Ok(None)` means the target has no
    /// usable samples yet.
    pub async fn evaluate_target(
        &mut self,
        key: &TargetKey,
        now: SystemTime,
    ) -> EngineResult<Option<ScaleDecision>> {
        let scaler = self
            .scalers
            .get_mut(key)
            .ok_or_else(|| EngineError::TargetNotFound(key.to_string()))?;
        let readings = self
            .aggregator
            .readings(key, scaler.target().metric, now)
            .await;
        Ok(scaler.evaluate(readings, now))
    }

    /// Evaluate all targets and apply their decisions through the
    /// callback. Targets without samples produce no decision.
    pub async fn evaluate_all(&mut self, now: SystemTime) -> Vec<ScaleDecision> {
        let mut decisions = Vec::new();

        for (key, scaler) in self.scalers.iter_mut() {
            let readings = self
                .aggregator
                .readings(key, scaler.target().metric, now)
                .await;
            let Some(decision) = scaler.evaluate(readings, now) else {
                continue;
            };

            debug!(
                target = %key,
                desired = decision.desired_replicas,
                panicking = decision.is_panicking,
                "scaling decision"
            );

            if let Some(ref decision_fn) = self.decision_fn
                && let Err(e) = decision_fn(decision.clone()).await
            {
                warn!(target = %key, error = %e, "applying decision failed");
            }

            decisions.push(decision);
        }

        decisions
    }

    /// Run the decision loop until shutdown.
    pub async fn run(
        &mut self,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        info!(interval_secs = interval.as_secs(), "autoscale engine started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.evaluate_all(SystemTime::now()).await;
                }
                _ = shutdown.changed() => {
                    info!("autoscale engine shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaleflow_core::{Sample, ScalingMetric};
    use std::sync::Mutex;
    use std::time::UNIX_EPOCH;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn sample(secs: u64, concurrency: f64) -> Sample {
        Sample {
            timestamp: at(secs),
            avg_concurrency: concurrency,
            request_rate: concurrency * 2.0,
            pod_count: 1,
        }
    }

    fn target(name: &str) -> ScalingTarget {
        let mut t = ScalingTarget::with_defaults(
            TargetKey::new("default", name),
            ScalingMetric::Concurrency,
            &ClusterDefaults::default(),
        );
        t.concurrency_target = 100.0;
        t.target_utilization = 0.7;
        t.max_replicas = 100;
        t
    }

    #[tokio::test]
    async fn unknown_target_errors() {
        let mut engine = AutoscaleEngine::new(
            Arc::new(MetricAggregator::new()),
            ClusterDefaults::default(),
        );
        let err = engine
            .evaluate_target(&TargetKey::new("default", "ghost"), at(1000))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TargetNotFound(_)));
    }

    #[tokio::test]
    async fn target_without_samples_yields_no_decision() {
        let aggregator = Arc::new(MetricAggregator::new());
        let mut engine = AutoscaleEngine::new(aggregator, ClusterDefaults::default());
        engine.upsert_target(target("api")).await;

        let decision = engine
            .evaluate_target(&TargetKey::new("default", "api"), at(1000))
            .await
            .unwrap();
        assert_eq!(decision, None);
        assert!(engine.evaluate_all(at(1000)).await.is_empty());
    }

    #[tokio::test]
    async fn burst_enters_panic_and_scales() {
        // The end-to-end scenario: stable window 60s, panic window 6s,
        // concurrency target 100 at utilization 0.7 (effective 70);
        // constant observed concurrency 700 for more than 6s.
        let aggregator = Arc::new(MetricAggregator::new());
        let mut engine =
            AutoscaleEngine::new(aggregator.clone(), ClusterDefaults::default());
        engine.upsert_target(target("api")).await;
        let key = TargetKey::new("default", "api");

        for secs in (1000..1010).step_by(2) {
            aggregator.record(&key, &sample(secs, 700.0)).await;
        }

        let decision = engine
            .evaluate_target(&key, at(1008))
            .await
            .unwrap()
            .unwrap();
        assert!(decision.is_panicking);
        assert_eq!(decision.desired_replicas, 10);
    }

    #[tokio::test]
    async fn evaluate_all_covers_every_target() {
        let aggregator = Arc::new(MetricAggregator::new());
        let mut engine =
            AutoscaleEngine::new(aggregator.clone(), ClusterDefaults::default());
        engine.upsert_target(target("api")).await;
        engine.upsert_target(target("worker")).await;

        for name in ["api", "worker"] {
            let key = TargetKey::new("default", name);
            aggregator.record(&key, &sample(1000, 70.0)).await;
        }

        let decisions = engine.evaluate_all(at(1001)).await;
        assert_eq!(decisions.len(), 2);
        assert!(decisions.iter().all(|d| d.desired_replicas == 1));
    }

    #[tokio::test]
    async fn decisions_flow_through_callback() {
        let aggregator = Arc::new(MetricAggregator::new());
        let applied: Arc<Mutex<Vec<ScaleDecision>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = applied.clone();

        let mut engine = AutoscaleEngine::new(aggregator.clone(), ClusterDefaults::default())
            .with_decision_fn(Box::new(move |decision| {
                let sink = sink.clone();
                Box::pin(async move {
                    sink.lock().unwrap().push(decision);
                    Ok(())
                })
            }));

        engine.upsert_target(target("api")).await;
        let key = TargetKey::new("default", "api");
        aggregator.record(&key, &sample(1000, 140.0)).await;

        engine.evaluate_all(at(1001)).await;

        let applied = applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].desired_replicas, 2);
    }

    #[tokio::test]
    async fn removed_target_is_forgotten() {
        let aggregator = Arc::new(MetricAggregator::new());
        let mut engine =
            AutoscaleEngine::new(aggregator.clone(), ClusterDefaults::default());
        engine.upsert_target(target("api")).await;
        let key = TargetKey::new("default", "api");
        aggregator.record(&key, &sample(1000, 70.0)).await;

        engine.remove_target(&key).await;
        assert!(engine.evaluate_target(&key, at(1001)).await.is_err());
        assert!(aggregator.registered().await.is_empty());
    }

    #[tokio::test]
    async fn upsert_with_same_windows_keeps_samples() {
        let aggregator = Arc::new(MetricAggregator::new());
        let mut engine =
            AutoscaleEngine::new(aggregator.clone(), ClusterDefaults::default());
        engine.upsert_target(target("api")).await;
        let key = TargetKey::new("default", "api");
        aggregator.record(&key, &sample(1000, 70.0)).await;

        // A snapshot change that leaves the windows alone must not reset
        // the accumulated windows.
        let mut changed = target("api");
        changed.max_replicas = 7;
        engine.upsert_target(changed).await;

        let decision = engine
            .evaluate_target(&key, at(1001))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision.desired_replicas, 1);
    }
}
