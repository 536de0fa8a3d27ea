//! Error Taxonomy
//!
//! Every failure the core can produce falls into one of a small set of
//! categories, so the transport layer can decide between a neutral
//! "nothing to resume" reply, an apologetic fallback, and an admin alert.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures surfaced by the core engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced record no longer resolves (stale cursor, concurrent
    /// deletion). Recoverable: callers fall back to a neutral response.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    /// A code path found state it assumes can never exist (e.g. a score
    /// arriving for a label the worker is not holding). Treated as a
    /// data-corruption signal, never silently ignored.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The bounded assignment scan ran out of budget without producing a
    /// work unit. Surfaced with the task id so an admin can inspect it.
    #[error("no actionable input found in task {task_id} after scanning {scanned} inputs")]
    LoopExhausted { task_id: i64, scanned: usize },
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }
}

/// Failures reported by the notification transport.
///
/// Transient failures are logged and the sweep moves on; permanent ones
/// mean the recipient is unreachable for good and must be unsubscribed.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transient notify failure: {0}")]
    Transient(String),

    #[error("permanent notify failure: {0}")]
    Permanent(String),
}
