//! SPX profiler dump handling.
//!
//! One SPX run produces a paired JSON dump and a gzip text dump sharing a
//! filename prefix. Either half is independently parseable; the filename
//! carries the run identity and the pairing state travels as validation
//! metadata.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use serde_json::Value;

use lagscope_core::constants::DEFAULT_MAX_TEXT_GZ_BYTES;
use lagscope_core::errors::IngestError;
use lagscope_core::model::{ArtifactDescriptor, RequestProfile, Span, ValidationResult};

use super::{build_source, FormatHandler, ParsedArtifact};

pub mod filename;
mod json;
mod text_gz;

pub use filename::SpxFilename;

const VERSION_JSON: &str = "spx-json-v2";
const VERSION_TEXT_GZ: &str = "spx-text-gz-v1";

/// Profiles plus recoverable parse notes from one SPX dump.
#[derive(Debug, Default)]
struct ParsedProfiles {
    profiles: Vec<RequestProfile>,
    notes: Vec<String>,
}

/// Handler for SPX profiler dumps, JSON or gzip text.
pub struct SpxHandler {
    max_text_gz_bytes: u64,
}

impl SpxHandler {
    pub fn new() -> Self {
        Self { max_text_gz_bytes: DEFAULT_MAX_TEXT_GZ_BYTES }
    }

    /// Override the decompressed-byte ceiling for gzip text dumps.
    pub fn with_max_text_gz_bytes(max_text_gz_bytes: u64) -> Self {
        Self { max_text_gz_bytes }
    }
}

impl Default for SpxHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatHandler for SpxHandler {
    fn format_type(&self) -> &'static str {
        "spx"
    }

    fn validate(&self, descriptor: &ArtifactDescriptor) -> ValidationResult {
        let Some(filename) = SpxFilename::parse(&descriptor.path) else {
            return ValidationResult::failure(
                &descriptor.path,
                vec!["unsupported SPX filename signature".to_string()],
            );
        };

        let has_json = Path::new(&filename.json_path).is_file();
        let has_text_gz = Path::new(&filename.text_gz_path).is_file();
        let metadata = filename.metadata(has_json, has_text_gz);

        if filename.extension == "json" {
            let content = match std::fs::read(&descriptor.path) {
                Ok(content) => content,
                Err(_) => {
                    return ValidationResult::failure_with_metadata(
                        &descriptor.path,
                        vec!["cannot read file".to_string()],
                        metadata,
                    );
                }
            };

            let document: Value = match serde_json::from_slice(&content) {
                Ok(document) => document,
                Err(_) => {
                    return ValidationResult::failure_with_metadata(
                        &descriptor.path,
                        vec!["invalid json".to_string()],
                        metadata,
                    );
                }
            };

            if !document.is_object() && !document.is_array() {
                return ValidationResult::failure_with_metadata(
                    &descriptor.path,
                    vec!["spx json root must be object/array".to_string()],
                    metadata,
                );
            }

            return ValidationResult::accepted(
                &descriptor.path,
                self.format_type(),
                VERSION_JSON,
                metadata,
            );
        }

        match probe_gzip(&descriptor.path, self.max_text_gz_bytes) {
            GzProbe::Unopenable => ValidationResult::failure_with_metadata(
                &descriptor.path,
                vec!["cannot open gzip stream".to_string()],
                metadata,
            ),
            GzProbe::Unreadable => ValidationResult::failure_with_metadata(
                &descriptor.path,
                vec!["cannot read gzip stream".to_string()],
                metadata,
            ),
            GzProbe::TooLarge => ValidationResult::failure_with_metadata(
                &descriptor.path,
                vec![format!("decompressed content exceeds {} bytes", self.max_text_gz_bytes)],
                metadata,
            ),
            GzProbe::Ok => ValidationResult::accepted(
                &descriptor.path,
                self.format_type(),
                VERSION_TEXT_GZ,
                metadata,
            ),
        }
    }

    fn parse(
        &self,
        descriptor: &ArtifactDescriptor,
        validation: &ValidationResult,
    ) -> Result<ParsedArtifact, IngestError> {
        let mut metadata = validation.metadata.clone();

        let parsed = match validation.detected_version.as_deref() {
            Some(VERSION_JSON) => json::parse(&descriptor.path, &metadata),
            Some(VERSION_TEXT_GZ) => {
                text_gz::parse(&descriptor.path, &metadata, self.max_text_gz_bytes)
            }
            _ => ParsedProfiles::default(),
        };

        if !parsed.notes.is_empty() {
            metadata.insert("parse_notes".to_string(), Value::from(parsed.notes));
        }

        let mut hints = descriptor.hints.clone();
        hints.insert(
            "spx".to_string(),
            Value::Object(metadata.into_iter().collect()),
        );

        let source = build_source(
            descriptor,
            self.format_type(),
            validation.detected_version.clone(),
            hints,
        )?;

        Ok(ParsedArtifact::profiles(source, parsed.profiles))
    }
}

enum GzProbe {
    Ok,
    Unopenable,
    Unreadable,
    TooLarge,
}

/// Stream-decode the gzip file, counting decompressed bytes against the
/// ceiling without holding the content in memory.
fn probe_gzip(path: &str, max_bytes: u64) -> GzProbe {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return GzProbe::Unopenable,
    };

    let mut decoder = GzDecoder::new(file);
    let mut probe = [0u8; 256];
    let mut decompressed: u64 = match decoder.read(&mut probe) {
        Ok(read) => read as u64,
        Err(_) => return GzProbe::Unreadable,
    };

    let mut chunk = [0u8; 8192];
    while decompressed <= max_bytes {
        match decoder.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => decompressed += read as u64,
            // Mid-stream corruption past a readable head is left for the
            // parser, which keeps whatever spans decoded cleanly.
            Err(_) => break,
        }
    }

    if decompressed > max_bytes {
        return GzProbe::TooLarge;
    }

    GzProbe::Ok
}

/// Deterministic span order shared by both parse paths:
/// `(label, self_ms, total_ms, first evidence record id)` ascending.
fn sort_spans(spans: &mut [Span]) {
    spans.sort_by(|a, b| {
        a.label
            .cmp(&b.label)
            .then(a.self_ms.total_cmp(&b.self_ms))
            .then(a.total_ms.total_cmp(&b.total_ms))
            .then_with(|| first_record_id(a).cmp(first_record_id(b)))
    });
}

fn first_record_id(span: &Span) -> &str {
    span.evidence
        .first()
        .and_then(|evidence| evidence.record_id.as_deref())
        .unwrap_or("")
}

/// Synthetic endpoint for a run without any endpoint-like key:
/// `spx://<host>/<pid>/<runid>`.
fn run_endpoint(run: &serde_json::Map<String, Value>) -> String {
    let host = run.get("host").and_then(Value::as_str).unwrap_or("unknown-host");
    let pid = run
        .get("pid")
        .and_then(Value::as_u64)
        .map_or_else(|| "0".to_string(), |pid| pid.to_string());
    let run_id = run
        .get("runid")
        .and_then(Value::as_u64)
        .map_or_else(|| "0".to_string(), |run_id| run_id.to_string());

    format!("spx://{host}/{pid}/{run_id}")
}
