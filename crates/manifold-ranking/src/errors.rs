//! Judge errors. These never escape the ranking engine: every failure
//! falls back to the heuristic order.

use thiserror::Error;

/// Failure of an external judge call.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// No judge is reachable right now.
    #[error("judge unavailable")]
    Unavailable,

    /// The judge answered with an error.
    #[error("judge failed: {0}")]
    Failed(String),

    /// The judge returned ids that do not match the candidate set.
    #[error("invalid judge ordering: {0}")]
    InvalidOrdering(String),

    /// The judge did not answer in time.
    #[error("judge timed out after {0}ms")]
    Timeout(u64),
}
