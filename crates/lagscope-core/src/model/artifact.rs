//! Artifact descriptors, accepted sources, and validation outcomes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-supplied pointer to a raw artifact file. Input only, never
/// persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub path: String,
    /// Free-form hints carried through onto the accepted source record.
    #[serde(default)]
    pub hints: BTreeMap<String, Value>,
}

impl ArtifactDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), hints: BTreeMap::new() }
    }

    pub fn with_hints(path: impl Into<String>, hints: BTreeMap<String, Value>) -> Self {
        Self { path: path.into(), hints }
    }
}

/// One accepted input artifact. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceArtifact {
    pub path: String,
    /// Format tag of the handler that accepted the artifact.
    #[serde(rename = "type")]
    pub artifact_type: String,
    /// Format version tag, e.g. `spx-json-v2` or `csv-v1`.
    pub version: Option<String>,
    /// Lower-hex SHA-256 of the raw file content.
    pub sha256: String,
    pub size_bytes: u64,
    pub hints: BTreeMap<String, Value>,
}

/// Outcome of running one descriptor through format validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub path: String,
    pub ok: bool,
    /// Format tag of the handler that accepted the artifact, when any did.
    pub detected_type: Option<String>,
    pub detected_version: Option<String>,
    pub errors: Vec<String>,
    /// Handler-specific context, e.g. SPX run identity and pairing state.
    pub metadata: BTreeMap<String, Value>,
}

impl ValidationResult {
    /// A failed validation carrying only error strings.
    pub fn failure(path: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            path: path.into(),
            ok: false,
            detected_type: None,
            detected_version: None,
            errors,
            metadata: BTreeMap::new(),
        }
    }

    /// A failed validation that still carries handler metadata.
    pub fn failure_with_metadata(
        path: impl Into<String>,
        errors: Vec<String>,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            path: path.into(),
            ok: false,
            detected_type: None,
            detected_version: None,
            errors,
            metadata,
        }
    }

    /// A successful validation for the given format tag and version.
    pub fn accepted(
        path: impl Into<String>,
        detected_type: impl Into<String>,
        detected_version: impl Into<String>,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            path: path.into(),
            ok: true,
            detected_type: Some(detected_type.into()),
            detected_version: Some(detected_version.into()),
            errors: Vec::new(),
            metadata,
        }
    }
}
