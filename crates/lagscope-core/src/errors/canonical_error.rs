//! Canonical encoding errors.

/// Failure bridging a model value into canonical JSON. Values built by the
/// ingestion pipeline always bridge cleanly; this surfaces only for
/// non-finite floats smuggled in from outside.
#[derive(Debug, thiserror::Error)]
#[error("value cannot be represented as canonical JSON: {0}")]
pub struct CanonicalError(#[from] pub serde_json::Error);
