//! Decision engine error types.

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from engine bookkeeping operations.
///
/// The decision path itself is infallible by design: a target with no
/// usable data produces no decision rather than an error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("target not found: {0}")]
    TargetNotFound(String),
}
