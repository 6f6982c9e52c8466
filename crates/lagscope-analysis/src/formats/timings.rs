//! TTFB timing captures, in CSV and JSON envelope form.
//!
//! CSV captures must carry the exact six-column header. JSON captures must
//! declare `format: "ttfb_timings"`, a string `version`, and a `requests`
//! array. Either way each accepted row or request object becomes one
//! request profile with no spans.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;

use serde_json::Value;
use tracing::debug;

use lagscope_core::errors::IngestError;
use lagscope_core::model::{
    ArtifactDescriptor, EvidenceRef, LineRange, RequestProfile, ValidationResult,
};

use super::{build_source, io_error, numeric, numeric_str, FormatHandler, ParsedArtifact};

const FORMAT: &str = "ttfb_timings";
const VERSION_CSV: &str = "csv-v1";

const CSV_HEADERS: [&str; 6] = ["url", "route", "ttfb_ms", "wall_ms", "cpu_ms", "mem_mb"];

/// Parses TTFB timing captures into span-less request profiles.
#[derive(Default)]
pub struct TtfbTimingsHandler;

impl TtfbTimingsHandler {
    pub fn new() -> Self {
        Self
    }
}

impl FormatHandler for TtfbTimingsHandler {
    fn format_type(&self) -> &'static str {
        FORMAT
    }

    fn validate(&self, descriptor: &ArtifactDescriptor) -> ValidationResult {
        let content = match std::fs::read(&descriptor.path) {
            Ok(content) => content,
            Err(_) => {
                return ValidationResult::failure(
                    &descriptor.path,
                    vec!["cannot read file".to_string()],
                );
            }
        };

        let text = String::from_utf8_lossy(&content);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ValidationResult::failure(&descriptor.path, vec!["empty file".to_string()]);
        }

        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            let document: Value = match serde_json::from_str(trimmed) {
                Ok(document) => document,
                Err(_) => {
                    return ValidationResult::failure(
                        &descriptor.path,
                        vec!["invalid json".to_string()],
                    );
                }
            };

            let declares_format = document.get("format").and_then(Value::as_str) == Some(FORMAT);
            let has_requests = document.get("requests").is_some_and(Value::is_array);
            if declares_format && has_requests {
                if let Some(version) = document.get("version").and_then(Value::as_str) {
                    return ValidationResult::accepted(
                        &descriptor.path,
                        FORMAT,
                        version,
                        BTreeMap::new(),
                    );
                }
            }

            return ValidationResult::failure(
                &descriptor.path,
                vec!["unsupported timings json signature".to_string()],
            );
        }

        let Some(first_line) = text.lines().next() else {
            return ValidationResult::failure(
                &descriptor.path,
                vec!["cannot read header".to_string()],
            );
        };

        if !csv_header_matches(first_line.trim()) {
            return ValidationResult::failure(
                &descriptor.path,
                vec!["unsupported timings csv header".to_string()],
            );
        }

        ValidationResult::accepted(&descriptor.path, FORMAT, VERSION_CSV, BTreeMap::new())
    }

    fn parse(
        &self,
        descriptor: &ArtifactDescriptor,
        validation: &ValidationResult,
    ) -> Result<ParsedArtifact, IngestError> {
        let profiles = if validation.detected_version.as_deref() == Some(VERSION_CSV) {
            parse_csv(&descriptor.path)?
        } else {
            parse_json_requests(&descriptor.path)?
        };

        debug!(
            path = %descriptor.path,
            profiles = profiles.len(),
            "parsed timings artifact"
        );

        let source = build_source(
            descriptor,
            FORMAT,
            validation.detected_version.clone(),
            descriptor.hints.clone(),
        )?;
        Ok(ParsedArtifact::profiles(source, profiles))
    }
}

fn csv_header_matches(line: &str) -> bool {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => record.iter().eq(CSV_HEADERS),
        _ => false,
    }
}

fn parse_csv(path: &str) -> Result<Vec<RequestProfile>, IngestError> {
    let file = File::open(path).map_err(|source| io_error(path, source))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut profiles = Vec::new();
    let mut line_number = 0u32;

    for record in reader.records() {
        let Ok(record) = record else {
            continue;
        };
        line_number += 1;
        // Line 1 is the header row validated earlier.
        if line_number == 1 || record.len() != CSV_HEADERS.len() {
            continue;
        }

        let route = record[1].trim();
        let url = record[0].trim();
        let endpoint = if !route.is_empty() {
            route
        } else if !url.is_empty() {
            url
        } else {
            "unknown_endpoint"
        };

        profiles.push(RequestProfile {
            endpoint: endpoint.to_string(),
            ttfb_ms: numeric_str(&record[2]),
            wall_ms: numeric_str(&record[3]).unwrap_or(0.0),
            cpu_ms: numeric_str(&record[4]),
            mem_mb: numeric_str(&record[5]),
            spans: Vec::new(),
            evidence: vec![EvidenceRef::new(
                FORMAT,
                path,
                Some(LineRange::single(line_number)),
                Some(format!("timings-csv:{}", line_number - 1)),
                "ttfb_ms, wall_ms, cpu_ms and mem_mb extracted from csv row",
            )],
        });
    }

    Ok(profiles)
}

fn parse_json_requests(path: &str) -> Result<Vec<RequestProfile>, IngestError> {
    let content = std::fs::read(path).map_err(|source| io_error(path, source))?;
    let document: Value = serde_json::from_slice(&content).map_err(|source| IngestError::Json {
        path: path.to_string(),
        source,
    })?;

    let empty = Vec::new();
    let requests = document
        .get("requests")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let mut profiles = Vec::new();
    for (index, request) in requests.iter().enumerate() {
        let Some(map) = request.as_object() else {
            continue;
        };

        profiles.push(RequestProfile {
            endpoint: endpoint_from_request(map),
            ttfb_ms: numeric(map.get("ttfb_ms")),
            wall_ms: numeric(map.get("wall_ms")).unwrap_or(0.0),
            cpu_ms: numeric(map.get("cpu_ms")),
            mem_mb: numeric(map.get("mem_mb")),
            spans: Vec::new(),
            evidence: vec![EvidenceRef::new(
                FORMAT,
                path,
                None,
                Some(format!("timings-json:{index}")),
                "ttfb_ms, wall_ms, cpu_ms and mem_mb extracted from request object",
            )],
        });
    }

    Ok(profiles)
}

/// `route` wins over `url`; string values pass through untrimmed and
/// numeric values are stringified.
fn endpoint_from_request(map: &serde_json::Map<String, Value>) -> String {
    for key in ["route", "url"] {
        match map.get(key) {
            Some(Value::String(text)) => return text.clone(),
            Some(Value::Number(number)) => return number.to_string(),
            _ => continue,
        }
    }
    "unknown_endpoint".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- csv header ----

    #[test]
    fn accepts_exact_header() {
        assert!(csv_header_matches("url,route,ttfb_ms,wall_ms,cpu_ms,mem_mb"));
    }

    #[test]
    fn rejects_reordered_or_partial_headers() {
        assert!(!csv_header_matches("route,url,ttfb_ms,wall_ms,cpu_ms,mem_mb"));
        assert!(!csv_header_matches("url,route,ttfb_ms,wall_ms,cpu_ms"));
        assert!(!csv_header_matches(""));
    }

    // ---- endpoint fallback ----

    fn request(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn route_wins_over_url() {
        let map = request(serde_json::json!({"route": "/checkout", "url": "https://x/y"}));
        assert_eq!(endpoint_from_request(&map), "/checkout");
    }

    #[test]
    fn url_used_when_route_null() {
        let map = request(serde_json::json!({"route": null, "url": "https://x/y"}));
        assert_eq!(endpoint_from_request(&map), "https://x/y");
    }

    #[test]
    fn numeric_route_is_stringified() {
        let map = request(serde_json::json!({"route": 42}));
        assert_eq!(endpoint_from_request(&map), "42");
    }

    #[test]
    fn missing_both_falls_back() {
        let map = request(serde_json::json!({"ttfb_ms": 10}));
        assert_eq!(endpoint_from_request(&map), "unknown_endpoint");
    }
}
