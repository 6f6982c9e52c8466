//! Snapshot store errors.

use super::canonical_error::CanonicalError;

/// Errors raised by a snapshot store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("snapshot {id} could not be encoded for storage")]
    Encode {
        id: String,
        #[source]
        source: CanonicalError,
    },

    /// Backing-medium failure. Unused by the in-memory store; available to
    /// stores that persist outside the process.
    #[error("snapshot store io failure at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
