//! SPX JSON dump parsing.
//!
//! SPX JSON has no fixed schema across versions, so the parser works
//! structurally: pick a primary context, read request metrics from a
//! candidate-key list, and walk every nested value collecting span-shaped
//! objects.

use std::collections::{BTreeMap, VecDeque};

use serde_json::Value;

use lagscope_core::model::{EvidenceRef, RequestProfile, Span};

use super::{run_endpoint, sort_spans, ParsedProfiles};
use crate::formats::numeric;

/// Endpoint-like keys, most specific first.
const ENDPOINT_KEYS: [&str; 6] = ["route", "url", "endpoint", "request_uri", "uri", "path"];
const SPAN_LABEL_KEYS: [&str; 5] = ["function", "func", "name", "symbol", "label"];
const SPAN_SELF_KEYS: [&str; 3] = ["self_ms", "self_time_ms", "selfTimeMs"];
const SPAN_TOTAL_KEYS: [&str; 4] = ["total_ms", "total_time_ms", "totalTimeMs", "duration_ms"];

pub(super) fn parse(path: &str, metadata: &BTreeMap<String, Value>) -> ParsedProfiles {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(_) => {
            return ParsedProfiles {
                profiles: Vec::new(),
                notes: vec!["cannot read json artifact".to_string()],
            };
        }
    };

    let document: Value = match serde_json::from_slice(&content) {
        Ok(document) => document,
        Err(error) => {
            return ParsedProfiles {
                profiles: Vec::new(),
                notes: vec![format!("invalid json: {error}")],
            };
        }
    };

    if !document.is_object() && !document.is_array() {
        return ParsedProfiles {
            profiles: Vec::new(),
            notes: vec!["json root must be object/array".to_string()],
        };
    }

    let (context_path, context) = select_primary_context(&document);
    let endpoint = resolve_endpoint(context, &document, metadata);

    let mut metric_sources = Vec::new();
    let ttfb_ms = metric_from_context_or_root(context, &document, "ttfb_ms", &mut metric_sources);
    let wall_ms = metric_from_context_or_root(context, &document, "wall_ms", &mut metric_sources)
        .unwrap_or(0.0);
    let cpu_ms = metric_from_context_or_root(context, &document, "cpu_ms", &mut metric_sources);
    let mem_mb = metric_from_context_or_root(context, &document, "mem_mb", &mut metric_sources);

    let mut spans = extract_spans(context, path, &context_path);
    sort_spans(&mut spans);

    let extraction_note = format!(
        "request-level metrics extracted from SPX JSON keys: {}",
        metric_sources.join(", ")
    );

    ParsedProfiles {
        profiles: vec![RequestProfile {
            endpoint,
            ttfb_ms,
            wall_ms,
            cpu_ms,
            mem_mb,
            spans,
            evidence: vec![EvidenceRef::new(
                "spx",
                path,
                None,
                Some(format!("json:{context_path}")),
                extraction_note,
            )],
        }],
        notes: Vec::new(),
    }
}

/// The first container element of a non-empty `requests` array, else the
/// document root.
fn select_primary_context(root: &Value) -> (String, &Value) {
    if let Some(requests) = root.get("requests").and_then(Value::as_array) {
        for (index, request) in requests.iter().enumerate() {
            if request.is_object() || request.is_array() {
                return (format!("root.requests.{index}"), request);
            }
        }
    }

    ("root".to_string(), root)
}

/// First non-empty string among the endpoint candidate keys, context
/// before root, else the synthetic run endpoint.
fn resolve_endpoint(context: &Value, root: &Value, metadata: &BTreeMap<String, Value>) -> String {
    for key in ENDPOINT_KEYS {
        let value = non_null(context.get(key)).or_else(|| non_null(root.get(key)));
        if let Some(Value::String(text)) = value {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    match metadata.get("run").and_then(Value::as_object) {
        Some(run) => run_endpoint(run),
        None => "unknown_endpoint".to_string(),
    }
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|candidate| !candidate.is_null())
}

fn metric_from_context_or_root(
    context: &Value,
    root: &Value,
    key: &str,
    sources: &mut Vec<String>,
) -> Option<f64> {
    if let Some(value) = numeric(context.get(key)) {
        sources.push(format!("{key}@context"));
        return Some(value);
    }

    if let Some(value) = numeric(root.get(key)) {
        sources.push(format!("{key}@root"));
        return Some(value);
    }

    None
}

/// Breadth-first walk over every nested container, collecting any object
/// carrying both a label-like key and a self/total-time-like key.
///
/// The worklist keeps the walk depth-independent, so adversarially deep
/// documents cannot exhaust the stack.
fn extract_spans(node: &Value, file: &str, base_path: &str) -> Vec<Span> {
    let mut results = Vec::new();
    let mut queue: VecDeque<(String, &Value)> = VecDeque::new();
    queue.push_back((base_path.to_string(), node));

    while let Some((path, value)) = queue.pop_front() {
        match value {
            Value::Object(map) => {
                let label = first_string(map, &SPAN_LABEL_KEYS);
                let self_ms = first_numeric(map, &SPAN_SELF_KEYS);
                let total_ms = first_numeric(map, &SPAN_TOTAL_KEYS);

                if let Some(label) = label {
                    if self_ms.is_some() || total_ms.is_some() {
                        results.push(Span {
                            span_type: "php".to_string(),
                            label,
                            self_ms: self_ms.unwrap_or(0.0),
                            total_ms: total_ms.unwrap_or(0.0),
                            evidence: vec![EvidenceRef::new(
                                "spx",
                                file,
                                None,
                                Some(format!("json:{path}")),
                                "span metrics extracted from SPX JSON object keys",
                            )],
                        });
                    }
                }

                for (key, child) in map {
                    if child.is_object() || child.is_array() {
                        queue.push_back((format!("{path}.{key}"), child));
                    }
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    if child.is_object() || child.is_array() {
                        queue.push_back((format!("{path}.{index}"), child));
                    }
                }
            }
            _ => {}
        }
    }

    results
}

fn first_string(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(Value::String(text)) = map.get(*key) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    None
}

fn first_numeric(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| numeric(map.get(*key)))
}
