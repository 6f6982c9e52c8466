//! Analysis errors.

use super::store_error::StoreError;

/// Errors that can occur while running snapshot analysis.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Supplied threshold overrides were malformed. Every violation is
    /// collected before failing; no partial threshold table is applied.
    #[error("invalid analysis thresholds: {}", .errors.join("; "))]
    InvalidThresholds { errors: Vec<String> },

    #[error(transparent)]
    Store(#[from] StoreError),
}
