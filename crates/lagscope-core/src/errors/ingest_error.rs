//! Ingestion errors.

use crate::model::ValidationResult;

use super::canonical_error::CanonicalError;

/// Errors that can occur while ingesting artifact descriptors into a
/// snapshot.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// At least one descriptor failed validation. Ingestion is atomic, so
    /// the full result list is returned and no snapshot is built.
    #[error(
        "artifact validation failed for {} of {} descriptors",
        .results.iter().filter(|result| !result.ok).count(),
        .results.len()
    )]
    ValidationFailed { results: Vec<ValidationResult> },

    #[error("cannot open artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {path} is not valid json: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}
