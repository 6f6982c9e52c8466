//! Field-by-field snapshot hydration from stored JSON.
//!
//! Tolerant by construction: a record (source, profile, span, sample, or
//! evidence entry) with missing or wrongly-typed fields is dropped and its
//! well-formed siblings survive. Only a structurally unusable top-level
//! document hydrates to `None`.

use std::collections::BTreeMap;

use serde_json::Value;

use lagscope_core::model::{
    DbQuerySample, EvidenceRef, LineRange, RequestProfile, Snapshot, SnapshotId, SourceArtifact,
    Span,
};

use crate::formats::numeric;

pub(crate) fn snapshot(document: &Value) -> Option<Snapshot> {
    let payload = document.as_object()?;
    let id = payload.get("id")?.as_str()?;
    let collected_at = payload.get("collected_at")?.as_str()?;
    let sources = payload.get("sources")?.as_array()?;
    let request_profiles = payload.get("request_profiles")?.as_array()?;
    let db_query_samples = payload.get("db_query_samples")?.as_array()?;

    Some(Snapshot {
        id: SnapshotId(id.to_string()),
        collected_at: collected_at.to_string(),
        sources: sources.iter().filter_map(source).collect(),
        request_profiles: request_profiles.iter().filter_map(request_profile).collect(),
        db_query_samples: db_query_samples.iter().filter_map(db_query_sample).collect(),
    })
}

fn source(value: &Value) -> Option<SourceArtifact> {
    let payload = value.as_object()?;

    let version = match payload.get("version") {
        None | Some(Value::Null) => None,
        Some(Value::String(version)) => Some(version.clone()),
        Some(_) => return None,
    };

    let hints: BTreeMap<String, Value> = match payload.get("hints") {
        None => BTreeMap::new(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        Some(_) => return None,
    };

    Some(SourceArtifact {
        path: payload.get("path")?.as_str()?.to_string(),
        artifact_type: payload.get("type")?.as_str()?.to_string(),
        version,
        sha256: payload.get("sha256")?.as_str()?.to_string(),
        size_bytes: payload.get("size_bytes")?.as_u64()?,
        hints,
    })
}

fn request_profile(value: &Value) -> Option<RequestProfile> {
    let payload = value.as_object()?;

    let spans = match payload.get("spans") {
        None => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(span).collect(),
        Some(_) => return None,
    };
    let evidence = match payload.get("evidence") {
        None => Vec::new(),
        Some(Value::Array(items)) => evidence_list(items),
        Some(_) => return None,
    };

    Some(RequestProfile {
        endpoint: payload.get("endpoint")?.as_str()?.to_string(),
        ttfb_ms: optional_numeric(payload.get("ttfb_ms"))?,
        wall_ms: numeric(payload.get("wall_ms"))?,
        cpu_ms: optional_numeric(payload.get("cpu_ms"))?,
        mem_mb: optional_numeric(payload.get("mem_mb"))?,
        spans,
        evidence,
    })
}

fn span(value: &Value) -> Option<Span> {
    let payload = value.as_object()?;

    let evidence = match payload.get("evidence") {
        None => Vec::new(),
        Some(Value::Array(items)) => evidence_list(items),
        Some(_) => return None,
    };

    Some(Span {
        span_type: payload.get("type")?.as_str()?.to_string(),
        label: payload.get("label")?.as_str()?.to_string(),
        self_ms: numeric(payload.get("self_ms"))?,
        total_ms: numeric(payload.get("total_ms"))?,
        evidence,
    })
}

fn db_query_sample(value: &Value) -> Option<DbQuerySample> {
    let payload = value.as_object()?;

    // Non-string examples are filtered, not fatal.
    let examples: Vec<String> = match payload.get("examples") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(_) => return None,
    };
    let evidence = match payload.get("evidence") {
        None => Vec::new(),
        Some(Value::Array(items)) => evidence_list(items),
        Some(_) => return None,
    };

    Some(DbQuerySample {
        fingerprint: payload.get("fingerprint")?.as_str()?.to_string(),
        total_time_ms: numeric(payload.get("total_time_ms"))?,
        avg_time_ms: numeric(payload.get("avg_time_ms"))?,
        count: payload.get("count")?.as_u64()?,
        lock_ms: optional_numeric(payload.get("lock_ms"))?,
        rows_examined: optional_numeric(payload.get("rows_examined"))?,
        examples,
        evidence,
    })
}

/// A malformed evidence entry drops that entry only. A present-but-unusable
/// `line_range` object degrades to no range while the entry survives.
fn evidence_list(items: &[Value]) -> Vec<EvidenceRef> {
    let mut result = Vec::new();

    for item in items {
        let Some(payload) = item.as_object() else {
            continue;
        };
        let Some(source) = payload.get("source").and_then(Value::as_str) else {
            continue;
        };
        let Some(file) = payload.get("file").and_then(Value::as_str) else {
            continue;
        };
        let Some(extraction_note) = payload.get("extraction_note").and_then(Value::as_str) else {
            continue;
        };

        let record_id = match payload.get("record_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(record_id)) => Some(record_id.clone()),
            Some(_) => continue,
        };

        let line_range = match payload.get("line_range") {
            None | Some(Value::Null) => None,
            Some(Value::Object(range)) => {
                let start = range
                    .get("start")
                    .and_then(Value::as_u64)
                    .and_then(|start| u32::try_from(start).ok());
                let end = range
                    .get("end")
                    .and_then(Value::as_u64)
                    .and_then(|end| u32::try_from(end).ok());
                match (start, end) {
                    (Some(start), Some(end)) => Some(LineRange::new(start, end)),
                    _ => None,
                }
            }
            Some(_) => continue,
        };

        result.push(EvidenceRef::new(
            source,
            file,
            line_range,
            record_id,
            extraction_note,
        ));
    }

    result
}

/// Absent or null stays `None`; a present non-numeric value is fatal for
/// the surrounding record.
fn optional_numeric(value: Option<&Value>) -> Option<Option<f64>> {
    match value {
        None | Some(Value::Null) => Some(None),
        Some(other) => numeric(Some(other)).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_documents_missing_required_collections() {
        assert!(snapshot(&json!({"id": "abc", "collected_at": "now"})).is_none());
        assert!(snapshot(&json!("not an object")).is_none());
        assert!(snapshot(&json!({
            "id": 42,
            "collected_at": "now",
            "sources": [],
            "request_profiles": [],
            "db_query_samples": [],
        }))
        .is_none());
    }

    #[test]
    fn skips_malformed_records_and_keeps_siblings() {
        let document = json!({
            "id": "abc",
            "collected_at": "2024-01-01T00:00:00+00:00",
            "sources": [
                {"path": "/a.log", "type": "mysql_slow_log", "version": null,
                 "sha256": "aa", "size_bytes": 10, "hints": {}},
                {"path": "/broken.log", "type": "mysql_slow_log", "version": null,
                 "sha256": "bb", "size_bytes": "ten", "hints": {}},
            ],
            "request_profiles": [
                {"endpoint": "/ok", "ttfb_ms": null, "wall_ms": 12.5,
                 "cpu_ms": null, "mem_mb": null, "spans": [], "evidence": []},
                {"endpoint": "/bad", "ttfb_ms": null, "wall_ms": "fast",
                 "cpu_ms": null, "mem_mb": null, "spans": [], "evidence": []},
            ],
            "db_query_samples": [],
        });

        let snapshot = snapshot(&document).expect("hydrates");
        assert_eq!(snapshot.sources.len(), 1);
        assert_eq!(snapshot.sources[0].path, "/a.log");
        assert_eq!(snapshot.request_profiles.len(), 1);
        assert_eq!(snapshot.request_profiles[0].endpoint, "/ok");
    }

    #[test]
    fn numeric_strings_are_accepted_for_metrics() {
        let profile = request_profile(&json!({
            "endpoint": "/x",
            "ttfb_ms": "10.5",
            "wall_ms": "99",
            "cpu_ms": null,
            "mem_mb": null,
        }))
        .expect("hydrates");
        assert_eq!(profile.wall_ms, 99.0);
        assert_eq!(profile.ttfb_ms, Some(10.5));
        assert!(profile.spans.is_empty());
    }

    #[test]
    fn evidence_line_range_degrades_without_dropping_entry() {
        let evidence = evidence_list(&[
            json!({"source": "spx", "file": "/a", "line_range": {"start": 1, "end": "two"},
                   "record_id": null, "extraction_note": "n"}),
            json!({"source": "spx", "file": "/b", "line_range": "1-2",
                   "record_id": null, "extraction_note": "n"}),
            json!({"source": "spx", "file": "/c", "line_range": {"start": 3, "end": 9},
                   "record_id": "r", "extraction_note": "n"}),
        ]);

        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].file, "/a");
        assert_eq!(evidence[0].line_range, None);
        assert_eq!(evidence[1].file, "/c");
        assert_eq!(evidence[1].line_range, Some(LineRange::new(3, 9)));
    }

    #[test]
    fn sample_examples_filter_non_strings() {
        let sample = db_query_sample(&json!({
            "fingerprint": "f1",
            "total_time_ms": 100.0,
            "avg_time_ms": 50.0,
            "count": 2,
            "lock_ms": null,
            "rows_examined": null,
            "examples": ["select ?", 42, null, "update ?"],
            "evidence": [],
        }))
        .expect("hydrates");
        assert_eq!(sample.examples, vec!["select ?", "update ?"]);
        assert_eq!(sample.lock_ms, None);
    }
}
