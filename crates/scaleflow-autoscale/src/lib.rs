//! scaleflow-autoscale — the autoscaling decision engine.
//!
//! Turns the aggregator's windowed averages into desired replica counts,
//! one decision per target per tick. Decisions are emitted through a
//! callback to the reconciler; the engine never touches cluster objects
//! itself.
//!
//! # Scaling Algorithm
//!
//! ```text
//! effective_target = metric_target * target_utilization
//! stable_desired   = ceil(stable_avg / effective_target)
//! panic_desired    = ceil(panic_avg / effective_target)
//!
//! enter panic  when panic window full
//!              and panic_avg / effective_target >= panic_threshold
//! while panic  desired = max(ratchet, panic_desired)   // never sheds
//! exit panic   after a full stable window without the condition holding
//!
//! every tick   desired = min(desired, ceil(prev * max_scale_up_rate))
//!              desired clamped to [min_replicas, max_replicas]
//! zero         withheld (reported as 1) until idle for the whole
//!              scale-to-zero grace period
//! ```
//!
//! The panic ratchet is the anti-flap guarantee: once scaled up under
//! burst load, capacity is not shed until the burst has been absent for
//! a full stable window.

pub mod engine;
pub mod error;
pub mod scaler;

pub use engine::{AutoscaleEngine, DecisionCallback};
pub use error::{EngineError, EngineResult};
pub use scaler::{ScaleDecision, TargetScaler};
