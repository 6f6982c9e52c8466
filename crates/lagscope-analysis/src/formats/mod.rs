//! Artifact format handlers.
//!
//! Each supported artifact family implements [`FormatHandler`]: cheap
//! validation that never partially parses, then a full parse into the
//! common domain model. The [`FormatRegistry`] owns one handler per
//! family and tries them in a fixed order, so adding a format stays
//! additive.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;

use serde_json::Value;
use sha2::{Digest, Sha256};

use lagscope_core::errors::IngestError;
use lagscope_core::model::{
    ArtifactDescriptor, DbQuerySample, RequestProfile, SourceArtifact, ValidationResult,
};

pub mod slowlog;
pub mod spx;
pub mod timings;

pub use slowlog::MysqlSlowLogHandler;
pub use spx::SpxHandler;
pub use timings::TtfbTimingsHandler;

/// Everything one handler extracted from a single artifact.
#[derive(Debug, Clone)]
pub struct ParsedArtifact {
    pub source: SourceArtifact,
    pub request_profiles: Vec<RequestProfile>,
    pub db_query_samples: Vec<DbQuerySample>,
}

impl ParsedArtifact {
    /// A fragment carrying only request profiles.
    pub fn profiles(source: SourceArtifact, request_profiles: Vec<RequestProfile>) -> Self {
        Self { source, request_profiles, db_query_samples: Vec::new() }
    }

    /// A fragment carrying only query samples.
    pub fn queries(source: SourceArtifact, db_query_samples: Vec<DbQuerySample>) -> Self {
        Self { source, request_profiles: Vec::new(), db_query_samples }
    }
}

/// One artifact family's validate/parse capability.
///
/// `validate` must be side-effect-free beyond reading the file. `parse`
/// is only ever invoked with a validation result whose `ok` is true and
/// whose `detected_type` matches this handler.
pub trait FormatHandler: Send + Sync {
    /// Stable format tag, e.g. `mysql_slow_log`.
    fn format_type(&self) -> &'static str;

    fn validate(&self, descriptor: &ArtifactDescriptor) -> ValidationResult;

    fn parse(
        &self,
        descriptor: &ArtifactDescriptor,
        validation: &ValidationResult,
    ) -> Result<ParsedArtifact, IngestError>;
}

/// The registered handlers, in detection order.
pub struct FormatRegistry {
    handlers: Vec<Box<dyn FormatHandler>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self {
            handlers: vec![
                Box::new(MysqlSlowLogHandler::new()),
                Box::new(SpxHandler::new()),
                Box::new(TtfbTimingsHandler::new()),
            ],
        }
    }

    /// Handlers in the order validation tries them.
    pub fn handlers(&self) -> impl Iterator<Item = &dyn FormatHandler> {
        self.handlers.iter().map(Box::as_ref)
    }

    /// The handler whose format tag matches `format_type`, if registered.
    pub fn resolve(&self, format_type: &str) -> Option<&dyn FormatHandler> {
        self.handlers
            .iter()
            .map(Box::as_ref)
            .find(|handler| handler.format_type() == format_type)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the source record every accepted artifact carries: path, format
/// identity, content hash, and size.
pub(crate) fn build_source(
    descriptor: &ArtifactDescriptor,
    format_type: &str,
    version: Option<String>,
    hints: BTreeMap<String, Value>,
) -> Result<SourceArtifact, IngestError> {
    Ok(SourceArtifact {
        path: descriptor.path.clone(),
        artifact_type: format_type.to_string(),
        version,
        sha256: sha256_file(&descriptor.path)?,
        size_bytes: file_size(&descriptor.path)?,
        hints,
    })
}

/// Streaming SHA-256 of a file's raw bytes, lower hex.
pub(crate) fn sha256_file(path: &str) -> Result<String, IngestError> {
    let mut file = File::open(path).map_err(|source| io_error(path, source))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer).map_err(|source| io_error(path, source))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub(crate) fn file_size(path: &str) -> Result<u64, IngestError> {
    std::fs::metadata(path)
        .map(|metadata| metadata.len())
        .map_err(|source| io_error(path, source))
}

pub(crate) fn io_error(path: &str, source: std::io::Error) -> IngestError {
    IngestError::Io { path: path.to_string(), source }
}

/// Loose numeric reading shared by the JSON surfaces: numbers pass
/// through, numeric strings parse, everything else is absent.
pub(crate) fn numeric(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => numeric_str(text),
        _ => None,
    }
}

/// `numeric` for raw text fields, e.g. CSV cells.
pub(crate) fn numeric_str(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    trimmed.parse::<f64>().ok().filter(|parsed| parsed.is_finite())
}
