//! Cluster-wide autoscaling defaults.
//!
//! Defaults are an explicit, immutable value passed into every
//! resolution and decision call, never ambient global state, so tests
//! can inject arbitrary configurations without process-wide effects.
//! They can be loaded from a TOML file in which every field is optional
//! and unset fields keep their built-in default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::window::parse_duration;

/// Granularity of the windowed aggregation buckets. Panic windows are
/// never resolved below this.
pub const BUCKET_SIZE: Duration = Duration::from_secs(2);

/// Annotation key for a per-target stable-window override, e.g. "90s".
pub const WINDOW_ANNOTATION: &str = "autoscaling.scaleflow.dev/window";

/// Annotation key for a per-target panic-window percentage override,
/// a percent of the stable window in (0, 100].
pub const PANIC_WINDOW_PERCENTAGE_ANNOTATION: &str =
    "autoscaling.scaleflow.dev/panic-window-percentage";

/// Cluster-wide scaling defaults, resolved once per evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterDefaults {
    /// Whether targets may be scaled to zero replicas at all.
    pub enable_scale_to_zero: bool,
    /// Default per-replica concurrency target when the workload declares
    /// none.
    pub container_concurrency_target_default: f64,
    /// Fraction of a declared hard concurrency limit used as the soft
    /// target, in (0, 1].
    pub container_concurrency_target_fraction: f64,
    /// Default per-replica requests-per-second target.
    pub rps_target_default: f64,
    /// Fraction of the target treated as usable capacity, in (0, 1].
    pub target_utilization: f64,
    /// Upper bound on desired-replica growth per decision, as a multiple
    /// of the previous decision. Must be > 1.
    pub max_scale_up_rate: f64,
    /// Steady-state averaging window.
    pub stable_window: Duration,
    /// Panic entry threshold: panic-window load as a percent of the
    /// effective target.
    pub panic_threshold_percentage: f64,
    /// Panic window as a percent of the stable window, in (0, 100].
    pub panic_window_percentage: f64,
    /// Continuous idle time required before a zero decision becomes
    /// externally visible.
    pub scale_to_zero_grace_period: Duration,
}

impl Default for ClusterDefaults {
    fn default() -> Self {
        Self {
            enable_scale_to_zero: true,
            container_concurrency_target_default: 100.0,
            container_concurrency_target_fraction: 0.7,
            rps_target_default: 200.0,
            target_utilization: 0.7,
            max_scale_up_rate: 1000.0,
            stable_window: Duration::from_secs(60),
            panic_threshold_percentage: 200.0,
            panic_window_percentage: 10.0,
            scale_to_zero_grace_period: Duration::from_secs(30),
        }
    }
}

/// Raw TOML shape: every field optional, durations as strings ("60s",
/// "5m"). Unset fields keep the built-in default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefaultsOverlay {
    enable_scale_to_zero: Option<bool>,
    container_concurrency_target_default: Option<f64>,
    container_concurrency_target_fraction: Option<f64>,
    rps_target_default: Option<f64>,
    target_utilization: Option<f64>,
    max_scale_up_rate: Option<f64>,
    stable_window: Option<String>,
    panic_threshold_percentage: Option<f64>,
    panic_window_percentage: Option<f64>,
    scale_to_zero_grace_period: Option<String>,
}

impl ClusterDefaults {
    /// Load defaults from a TOML file, overlaying onto the built-in
    /// values and validating the result.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse defaults from a TOML string. See [`ClusterDefaults::from_file`].
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let overlay: DefaultsOverlay = toml::from_str(content)?;
        let mut defaults = Self::default();

        if let Some(v) = overlay.enable_scale_to_zero {
            defaults.enable_scale_to_zero = v;
        }
        if let Some(v) = overlay.container_concurrency_target_default {
            defaults.container_concurrency_target_default = v;
        }
        if let Some(v) = overlay.container_concurrency_target_fraction {
            defaults.container_concurrency_target_fraction = v;
        }
        if let Some(v) = overlay.rps_target_default {
            defaults.rps_target_default = v;
        }
        if let Some(v) = overlay.target_utilization {
            defaults.target_utilization = v;
        }
        if let Some(v) = overlay.max_scale_up_rate {
            defaults.max_scale_up_rate = v;
        }
        if let Some(ref s) = overlay.stable_window {
            defaults.stable_window = parse_duration(s)
                .ok_or_else(|| ConfigError::Invalid(format!("stable_window: {s:?}")))?;
        }
        if let Some(v) = overlay.panic_threshold_percentage {
            defaults.panic_threshold_percentage = v;
        }
        if let Some(v) = overlay.panic_window_percentage {
            defaults.panic_window_percentage = v;
        }
        if let Some(ref s) = overlay.scale_to_zero_grace_period {
            defaults.scale_to_zero_grace_period = parse_duration(s)
                .ok_or_else(|| ConfigError::Invalid(format!("scale_to_zero_grace_period: {s:?}")))?;
        }

        defaults.validate()?;
        Ok(defaults)
    }

    /// Concurrency target implied by a workload's declared hard limit:
    /// the configured fraction of the limit, or the cluster default when
    /// the limit is 0 (unlimited).
    pub fn concurrency_target_for(&self, container_concurrency: u32) -> f64 {
        if container_concurrency > 0 {
            self.container_concurrency_target_fraction * container_concurrency as f64
        } else {
            self.container_concurrency_target_default
        }
    }

    /// Reject configurations the decision engine cannot operate under.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.container_concurrency_target_default <= 0.0 {
            return Err(ConfigError::Invalid(
                "container_concurrency_target_default must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.container_concurrency_target_fraction)
            || self.container_concurrency_target_fraction == 0.0
        {
            return Err(ConfigError::Invalid(
                "container_concurrency_target_fraction must be in (0, 1]".into(),
            ));
        }
        if self.rps_target_default <= 0.0 {
            return Err(ConfigError::Invalid("rps_target_default must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.target_utilization) || self.target_utilization == 0.0 {
            return Err(ConfigError::Invalid(
                "target_utilization must be in (0, 1]".into(),
            ));
        }
        if self.max_scale_up_rate <= 1.0 {
            return Err(ConfigError::Invalid("max_scale_up_rate must be > 1".into()));
        }
        if self.stable_window < BUCKET_SIZE {
            return Err(ConfigError::Invalid(format!(
                "stable_window must be at least {BUCKET_SIZE:?}"
            )));
        }
        if self.panic_threshold_percentage < 100.0 {
            return Err(ConfigError::Invalid(
                "panic_threshold_percentage must be at least 100".into(),
            ));
        }
        if self.panic_window_percentage <= 0.0 || self.panic_window_percentage > 100.0 {
            return Err(ConfigError::Invalid(
                "panic_window_percentage must be in (0, 100]".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_defaults_are_valid() {
        ClusterDefaults::default().validate().unwrap();
    }

    #[test]
    fn empty_overlay_keeps_defaults() {
        let defaults = ClusterDefaults::from_toml_str("").unwrap();
        assert_eq!(defaults, ClusterDefaults::default());
    }

    #[test]
    fn overlay_applies_fields() {
        let defaults = ClusterDefaults::from_toml_str(
            r#"
            enable_scale_to_zero = false
            stable_window = "2m"
            max_scale_up_rate = 10.0
            scale_to_zero_grace_period = "45s"
            "#,
        )
        .unwrap();

        assert!(!defaults.enable_scale_to_zero);
        assert_eq!(defaults.stable_window, Duration::from_secs(120));
        assert_eq!(defaults.max_scale_up_rate, 10.0);
        assert_eq!(defaults.scale_to_zero_grace_period, Duration::from_secs(45));
        // Untouched field keeps its built-in value.
        assert_eq!(defaults.panic_window_percentage, 10.0);
    }

    #[test]
    fn concurrency_target_from_hard_limit() {
        let defaults = ClusterDefaults::default();
        // Fraction 0.7 of a declared limit of 10.
        assert_eq!(defaults.concurrency_target_for(10), 7.0);
        // Unlimited falls back to the cluster default.
        assert_eq!(defaults.concurrency_target_for(0), 100.0);
    }

    #[test]
    fn invalid_duration_rejected() {
        let err = ClusterDefaults::from_toml_str(r#"stable_window = "soon""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(ClusterDefaults::from_toml_str("panic_percent = 3").is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut defaults = ClusterDefaults::default();
        defaults.max_scale_up_rate = 1.0;
        assert!(defaults.validate().is_err());

        let mut defaults = ClusterDefaults::default();
        defaults.stable_window = Duration::from_secs(1);
        assert!(defaults.validate().is_err());

        let mut defaults = ClusterDefaults::default();
        defaults.target_utilization = 0.0;
        assert!(defaults.validate().is_err());

        let mut defaults = ClusterDefaults::default();
        defaults.panic_window_percentage = 101.0;
        assert!(defaults.validate().is_err());
    }
}
