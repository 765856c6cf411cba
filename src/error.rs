//! Unified error handling for the mining pipeline.
//!
//! Errors follow the batch-tolerance policy: malformed input is skipped and
//! logged, store failures are retried once by the engine before failing the
//! enclosing per-user unit of work, invariant violations abort the current
//! phase, and cancellation surfaces cooperatively from the store boundary.

use crate::store::StoreError;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, MiningError>;

/// Error type for the mining pipeline.
#[derive(Debug, thiserror::Error)]
pub enum MiningError {
    /// Unparseable GPS input (bad line, short header, non-numeric fields).
    /// Logged and skipped by batch code; never aborts an import.
    #[error("malformed input in {source_name}: {reason}")]
    InputMalformed { source_name: String, reason: String },

    /// A store operation failed after the retry policy was exhausted.
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    /// A derived artifact violated a structural invariant. Fatal to the
    /// current phase; downstream artifacts must not be emitted from it.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    /// Cooperative cancellation observed at a suspension point.
    #[error("operation cancelled")]
    Cancelled,
}

impl MiningError {
    /// True when the error is the cooperative-cancellation signal, either
    /// raised directly or surfaced through a store call.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            MiningError::Cancelled | MiningError::Store(StoreError::Cancelled)
        )
    }
}
