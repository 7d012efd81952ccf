//! Per-target scaling decisions.
//!
//! `TargetScaler` holds everything one target's evaluation needs: the
//! target snapshot, its resolved windows, the cluster parameters in
//! effect, and the runtime state (panic mode, previous decision,
//! idle countdown). A scaler's tick is serialized by `&mut self`;
//! scalers for different targets are independent.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

use tracing::{debug, info};

use scaleflow_core::{ClusterDefaults, ScalingTarget, TargetKey, WindowSpec, resolve_window_spec};
use scaleflow_metrics::MetricReadings;

/// One decision, to be applied by the external reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleDecision {
    pub target: TargetKey,
    pub desired_replicas: u32,
    pub is_panicking: bool,
    pub timestamp: SystemTime,
}

/// Panic/stable hysteresis state.
///
/// Kept as a tagged state so every transition runs through `evaluate`
/// rather than scattered flag checks.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Stable,
    Panicking {
        /// Last instant the panic-entry condition held. Exit happens a
        /// full stable window after this.
        last_over_threshold: SystemTime,
        /// Highest desired count emitted during this episode. Never
        /// decreases while panicking.
        ratchet: u32,
    },
}

/// Decision state machine for a single target.
#[derive(Debug)]
pub struct TargetScaler {
    target: ScalingTarget,
    windows: WindowSpec,
    max_scale_up_rate: f64,
    panic_threshold_percentage: f64,
    grace_period: Duration,
    /// Cluster-wide gate; the target's own flag must also be set.
    scale_to_zero_enabled: bool,
    mode: Mode,
    /// Last emitted desired count; seeds the scale-up rate limit.
    prev_desired: u32,
    /// Start of the current continuous stretch of zero desired replicas.
    zero_since: Option<SystemTime>,
}

impl TargetScaler {
    pub fn new(target: ScalingTarget, defaults: &ClusterDefaults) -> Self {
        let windows = resolve_window_spec(&target.annotations, defaults);
        Self {
            windows,
            max_scale_up_rate: defaults.max_scale_up_rate,
            panic_threshold_percentage: defaults.panic_threshold_percentage,
            grace_period: defaults.scale_to_zero_grace_period,
            scale_to_zero_enabled: defaults.enable_scale_to_zero,
            target,
            mode: Mode::Stable,
            prev_desired: 0,
            zero_since: None,
        }
    }

    /// Apply a changed target snapshot or changed defaults, keeping the
    /// runtime state (panic mode, previous decision, idle countdown).
    pub fn update(&mut self, target: ScalingTarget, defaults: &ClusterDefaults) {
        self.windows = resolve_window_spec(&target.annotations, defaults);
        self.max_scale_up_rate = defaults.max_scale_up_rate;
        self.panic_threshold_percentage = defaults.panic_threshold_percentage;
        self.grace_period = defaults.scale_to_zero_grace_period;
        self.scale_to_zero_enabled = defaults.enable_scale_to_zero;
        self.target = target;
    }

    pub fn key(&self) -> &TargetKey {
        &self.target.key
    }

    pub fn target(&self) -> &ScalingTarget {
        &self.target
    }

    pub fn windows(&self) -> &WindowSpec {
        &self.windows
    }

    pub fn is_panicking(&self) -> bool {
        matches!(self.mode, Mode::Panicking { .. })
    }

    /// Evaluate one tick against the given readings.
    ///
    /// `None` readings mean the target has produced no samples yet, and
    /// yield no decision; callers must treat that distinctly from a
    /// decision of zero. Deterministic given the same readings and `now`.
    pub fn evaluate(
        &mut self,
        readings: Option<MetricReadings>,
        now: SystemTime,
    ) -> Option<ScaleDecision> {
        let readings = readings?;
        let effective_target = self.target.effective_target();
        if effective_target <= 0.0 || !effective_target.is_finite() {
            // Degenerate snapshot; refuse to decide rather than emit
            // unbounded counts.
            debug!(target = %self.target.key, "non-positive effective target, skipping");
            return None;
        }

        let scale_to_zero = self.scale_to_zero_enabled && self.target.scale_to_zero_enabled;

        let stable_desired = if readings.stable.sample_count == 0 {
            if scale_to_zero {
                0
            } else {
                self.target.min_replicas.max(1)
            }
        } else {
            ceil_ratio(readings.stable.average, effective_target)
        };
        let panic_desired = ceil_ratio(readings.panic.average, effective_target);

        let over_threshold = readings.panic.is_full
            && readings.panic.average / effective_target * 100.0 >= self.panic_threshold_percentage;

        match &mut self.mode {
            Mode::Stable => {
                if over_threshold {
                    info!(
                        target = %self.target.key,
                        panic_average = readings.panic.average,
                        "entering panic mode"
                    );
                    self.mode = Mode::Panicking {
                        last_over_threshold: now,
                        ratchet: self.prev_desired,
                    };
                }
            }
            Mode::Panicking {
                last_over_threshold,
                ..
            } => {
                if over_threshold {
                    *last_over_threshold = now;
                } else if now
                    .duration_since(*last_over_threshold)
                    .unwrap_or_default()
                    >= self.windows.stable_window
                {
                    info!(target = %self.target.key, "exiting panic mode");
                    self.mode = Mode::Stable;
                }
            }
        }

        let mut desired = match self.mode {
            Mode::Stable => stable_desired,
            Mode::Panicking { ratchet, .. } => ratchet.max(panic_desired),
        };

        // Scale-up rate limit, applied every tick regardless of panic
        // state. The previous decision is floored at 1 so a target at
        // zero can still start.
        let max_scale_up =
            ((self.prev_desired.max(1) as f64) * self.max_scale_up_rate).ceil() as u32;
        desired = desired.min(max_scale_up);

        // Replica bounds. A minimum of 0 only takes effect with
        // scale-to-zero enabled.
        let floor = if scale_to_zero {
            self.target.min_replicas
        } else {
            self.target.min_replicas.max(1)
        };
        desired = desired.clamp(floor.min(self.target.max_replicas), self.target.max_replicas);

        // The ratchet tracks emitted values only, so it can never exceed
        // what was actually requested.
        if let Mode::Panicking { ratchet, .. } = &mut self.mode
            && desired > *ratchet
        {
            *ratchet = desired;
        }

        let is_panicking = matches!(self.mode, Mode::Panicking { .. });

        // Scale-to-zero grace: hold at 1 until zero has been desired
        // continuously for the grace period.
        if desired == 0 {
            let since = *self.zero_since.get_or_insert(now);
            if now.duration_since(since).unwrap_or_default() < self.grace_period {
                desired = 1;
            }
        } else {
            self.zero_since = None;
        }

        self.prev_desired = desired;
        Some(ScaleDecision {
            target: self.target.key.clone(),
            desired_replicas: desired,
            is_panicking,
            timestamp: now,
        })
    }
}

fn ceil_ratio(value: f64, target: f64) -> u32 {
    (value / target).ceil() as u32
}
