//! SPX gzip text dump parsing.
//!
//! The text dump is a flat report: section headers followed by per-span
//! lines in one of three grammars. Decompression is bounded; hitting the
//! ceiling keeps the spans parsed so far and records a note.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::LazyLock;

use flate2::read::GzDecoder;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use lagscope_core::model::{EvidenceRef, LineRange, RequestProfile, Span};

use super::{run_endpoint, sort_spans, ParsedProfiles};

/// `[section]` headers.
static SECTION_BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[^\]]+\]$").unwrap());

/// `=== section ===` rules.
static SECTION_EQUALS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^={3,}.*={3,}$").unwrap());

/// `--- section ---` rules.
static SECTION_DASH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-{3,}.*-{3,}$").unwrap());

/// `label|self_ms: X|total_ms: Y`
static SPAN_PIPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<label>[^|]+?)\|\s*self_ms\s*[:=]\s*(?P<self>[\d.]+)\s*\|\s*total_ms\s*[:=]\s*(?P<total>[\d.]+)$",
    )
    .unwrap()
});

/// `label, self_ms: X, total_ms: Y`
static SPAN_COMMA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<label>[^,]+),\s*self_ms\s*[:=]\s*(?P<self>[\d.]+),\s*total_ms\s*[:=]\s*(?P<total>[\d.]+)$",
    )
    .unwrap()
});

/// `label X ms Y ms`
static SPAN_MS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<label>\S.+?)\s+(?P<self>[\d.]+)\s*ms\s+(?P<total>[\d.]+)\s*ms$").unwrap()
});

pub(super) fn parse(
    path: &str,
    metadata: &BTreeMap<String, Value>,
    max_decompressed_bytes: u64,
) -> ParsedProfiles {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => {
            return ParsedProfiles {
                profiles: Vec::new(),
                notes: vec!["cannot open gz file".to_string()],
            };
        }
    };

    let mut reader = BufReader::new(GzDecoder::new(file));
    let mut line = String::new();
    let mut line_no: u32 = 0;
    let mut bytes: u64 = 0;
    let mut notes = Vec::new();
    let mut spans = Vec::new();
    let mut section = "root".to_string();
    let mut record: u64 = 0;

    loop {
        line.clear();
        let read = match reader.read_line(&mut line) {
            Ok(read) => read,
            // A corrupt tail past readable content keeps the spans already
            // decoded, same as hitting end of stream.
            Err(_) => break,
        };
        if read == 0 {
            break;
        }

        line_no += 1;
        bytes += read as u64;
        if bytes > max_decompressed_bytes {
            warn!(path, max_decompressed_bytes, "spx text dump exceeds decompression ceiling");
            notes.push(format!("decompressed content exceeds {max_decompressed_bytes} bytes"));
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if is_section_marker(trimmed) {
            section = trimmed.to_string();
            continue;
        }

        let Some((label, self_ms, total_ms)) = parse_line_as_span(trimmed) else {
            continue;
        };

        record += 1;
        spans.push(Span {
            span_type: "php".to_string(),
            label,
            self_ms,
            total_ms,
            evidence: vec![EvidenceRef::new(
                "spx",
                path,
                Some(LineRange::single(line_no)),
                Some(format!("text:{record}")),
                format!("span metrics extracted from section {section}"),
            )],
        });
    }

    sort_spans(&mut spans);

    let endpoint = match metadata.get("run").and_then(Value::as_object) {
        Some(run) => run_endpoint(run),
        None => run_endpoint(&serde_json::Map::new()),
    };

    // No request-level metric exists in this format; wall time is the
    // heaviest span observed.
    let wall_ms = spans.iter().fold(0.0f64, |wall, span| wall.max(span.total_ms));

    ParsedProfiles {
        profiles: vec![RequestProfile {
            endpoint,
            ttfb_ms: None,
            wall_ms,
            cpu_ms: None,
            mem_mb: None,
            spans,
            evidence: vec![EvidenceRef::new(
                "spx",
                path,
                Some(LineRange::new(1, line_no.max(1))),
                Some("text:run".to_string()),
                "request-level wall_ms inferred from maximum parsed span total_ms",
            )],
        }],
        notes,
    }
}

fn is_section_marker(line: &str) -> bool {
    SECTION_BRACKET_RE.is_match(line)
        || SECTION_EQUALS_RE.is_match(line)
        || SECTION_DASH_RE.is_match(line)
}

fn parse_line_as_span(line: &str) -> Option<(String, f64, f64)> {
    for pattern in [&SPAN_PIPE_RE, &SPAN_COMMA_RE, &SPAN_MS_RE] {
        if let Some(captures) = pattern.captures(line) {
            let label = captures["label"].trim().to_string();
            let self_ms: f64 = captures["self"].parse().ok()?;
            let total_ms: f64 = captures["total"].parse().ok()?;
            return Some((label, self_ms, total_ms));
        }
    }

    None
}
