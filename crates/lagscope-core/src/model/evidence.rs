//! Evidence references linking derived facts back to raw artifacts.

use serde::{Deserialize, Serialize};

/// Inclusive 1-based line range inside a source artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Range covering a single line.
    pub fn single(line: u32) -> Self {
        Self { start: line, end: line }
    }
}

/// Pointer from a derived fact (profile, span, query sample, finding) back
/// to the raw input it was extracted from. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Format tag of the producing handler.
    pub source: String,
    /// Path of the originating artifact file.
    pub file: String,
    pub line_range: Option<LineRange>,
    /// Handler-scoped record key, e.g. `slowlog:3` or `json:root.requests.0`.
    pub record_id: Option<String>,
    /// Free text naming the fields that were read.
    pub extraction_note: String,
}

impl EvidenceRef {
    pub fn new(
        source: impl Into<String>,
        file: impl Into<String>,
        line_range: Option<LineRange>,
        record_id: Option<String>,
        extraction_note: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            file: file.into(),
            line_range,
            record_id,
            extraction_note: extraction_note.into(),
        }
    }
}
