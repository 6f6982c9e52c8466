//! Analysis engine and run-service tests.
//!
//! Exercises severity classification against the conservative default
//! bands, threshold overrides and their strict validation, ranked
//! aggregate listings, report shaping, and the full artifact-to-report
//! pipeline.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::{json, Value};
use tempfile::TempDir;

use lagscope_analysis::engine::{AnalysisReport, AnalysisRunParams, AnalysisRunService};
use lagscope_analysis::ingest::ArtifactIngestor;
use lagscope_analysis::store::{MemorySnapshotStore, SnapshotStore};
use lagscope_core::errors::AnalysisError;
use lagscope_core::model::{
    ArtifactDescriptor, DbQuerySample, EvidenceRef, RequestProfile, Severity, Snapshot,
    SnapshotId, Span,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn evidence(source: &str, file: &str) -> EvidenceRef {
    EvidenceRef::new(source, file, None, None, "metrics extracted")
}

fn profile(endpoint: &str, wall_ms: f64, ttfb_ms: Option<f64>) -> RequestProfile {
    RequestProfile {
        endpoint: endpoint.to_string(),
        ttfb_ms,
        wall_ms,
        cpu_ms: None,
        mem_mb: None,
        spans: Vec::new(),
        evidence: vec![evidence("spx", "/tmp/capture.json")],
    }
}

fn span(label: &str, self_ms: f64, total_ms: f64) -> Span {
    Span {
        span_type: "php".to_string(),
        label: label.to_string(),
        self_ms,
        total_ms,
        evidence: vec![evidence("spx", "/tmp/capture.json")],
    }
}

fn sample(fingerprint: &str, avg_time_ms: f64, count: u64, file: &str) -> DbQuerySample {
    DbQuerySample {
        fingerprint: fingerprint.to_string(),
        total_time_ms: avg_time_ms * count as f64,
        avg_time_ms,
        count,
        lock_ms: None,
        rows_examined: None,
        examples: vec!["SELECT * FROM orders WHERE user_id = ?".to_string()],
        evidence: vec![evidence("mysql_slow_log", file)],
    }
}

fn snapshot(profiles: Vec<RequestProfile>, samples: Vec<DbQuerySample>) -> Snapshot {
    Snapshot {
        id: SnapshotId("f".repeat(64)),
        collected_at: "2026-08-10T12:00:00+00:00".to_string(),
        sources: Vec::new(),
        request_profiles: profiles,
        db_query_samples: samples,
    }
}

fn run_on(snapshot: Snapshot, params: &AnalysisRunParams) -> AnalysisReport {
    let store = MemorySnapshotStore::new();
    store.persist(&snapshot, &BTreeMap::new()).expect("persist");
    AnalysisRunService::new()
        .run(&store, snapshot.id.as_str(), params)
        .expect("run")
        .expect("snapshot present")
}

// ═══════════════════════════════════════════════════════════════════════════
// Endpoint classification
// ═══════════════════════════════════════════════════════════════════════════

/// 2500ms wall crosses the P0 cut, 500ms only P2, and 100ms stays below
/// every band; the sub-threshold endpoint still appears in the aggregates.
#[test]
fn wall_time_tiers_follow_conservative_defaults() {
    let report = run_on(
        snapshot(
            vec![
                profile("/a", 2500.0, None),
                profile("/b", 500.0, None),
                profile("/c", 100.0, None),
            ],
            Vec::new(),
        ),
        &AnalysisRunParams::default(),
    );

    let rows = &report.aggregates.top_endpoints;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].endpoint, "/a");
    assert_eq!(rows[0].severity, Some(Severity::P0));
    assert_eq!(rows[1].severity, Some(Severity::P2));
    assert_eq!(rows[2].endpoint, "/c");
    assert_eq!(rows[2].severity, None);

    assert_eq!(report.findings.len(), 2);
    assert_eq!(report.findings[0].severity, Severity::P0);
    assert_eq!(report.findings[0].title, "Slow endpoint /a");
    assert!(report.findings[0].id.starts_with("endpoint:"));
    assert_eq!(report.findings[1].severity, Severity::P2);

    assert_eq!(report.summary.endpoint_count, 3);
    assert_eq!(report.summary.finding_count, 2);
    assert_eq!(report.summary.p0_count, 1);
    assert_eq!(report.summary.p1_count, 0);
    assert_eq!(report.summary.p2_count, 1);
}

/// TTFB has its own band; a fast-wall endpoint with terrible TTFB is still
/// a P0.
#[test]
fn ttfb_alone_can_raise_endpoint_severity() {
    let report = run_on(
        snapshot(vec![profile("/t", 350.0, Some(1600.0))], Vec::new()),
        &AnalysisRunParams::default(),
    );

    assert_eq!(report.findings.len(), 1);
    let finding = &report.findings[0];
    assert_eq!(finding.severity, Severity::P0);
    assert_eq!(
        finding.impact_summary,
        "Endpoint \"/t\" reached 350.000ms wall time with 1600.000ms TTFB."
    );
    assert_eq!(finding.metrics["severity_score_ms"], json!(1600.0));
    assert_eq!(finding.metrics["wall_ms"], json!(350.0));
    assert_eq!(finding.metrics["cpu_ms"], Value::Null);
}

// ═══════════════════════════════════════════════════════════════════════════
// Span classification
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn spans_classify_on_max_of_self_and_total() {
    let mut heavy = profile("/s", 100.0, None);
    heavy.spans = vec![span("db_query", 900.0, 900.0), span("render", 90.0, 200.0)];

    let report = run_on(snapshot(vec![heavy], Vec::new()), &AnalysisRunParams::default());

    assert_eq!(report.aggregates.top_spans.len(), 2);
    assert_eq!(report.aggregates.top_spans[0].span_label, "db_query");
    assert_eq!(report.aggregates.top_spans[1].severity, None);

    // The 100ms endpoint itself never clears a band, so the only finding
    // is the heavy span.
    assert_eq!(report.findings.len(), 1);
    let finding = &report.findings[0];
    assert!(finding.id.starts_with("span:"));
    assert_eq!(finding.title, "Heavy span db_query (/s)");
    assert_eq!(finding.severity, Severity::P0);
    assert_eq!(finding.metrics["severity_score_ms"], json!(900.0));

    let rec_ids: Vec<&str> = finding
        .recommendations
        .iter()
        .map(|rec| rec.id.as_str())
        .collect();
    assert_eq!(rec_ids, vec!["span-flamegraph", "span-input-shape"]);
}

// ═══════════════════════════════════════════════════════════════════════════
// Query classification
// ═══════════════════════════════════════════════════════════════════════════

/// Query severity keys on estimated contribution (avg x count), not the
/// reported total.
#[test]
fn query_contribution_drives_query_findings() {
    let heavy_fp = "a".repeat(64);
    let light_fp = "b".repeat(64);
    let report = run_on(
        snapshot(
            Vec::new(),
            vec![
                sample(&heavy_fp, 600.0, 20, "/var/log/slow.log"),
                sample(&light_fp, 100.0, 5, "/var/log/slow.log"),
            ],
        ),
        &AnalysisRunParams::default(),
    );

    assert_eq!(report.aggregates.top_queries.len(), 2);
    assert_eq!(report.aggregates.top_queries[0].query_total_time_ms, 12000.0);
    assert_eq!(report.aggregates.top_queries[1].severity, None);

    assert_eq!(report.findings.len(), 1);
    let finding = &report.findings[0];
    assert_eq!(finding.id, format!("query:{heavy_fp}"));
    assert_eq!(finding.title, "Slow query fingerprint aaaaaaaaaaaa");
    assert_eq!(finding.severity, Severity::P0);
    assert_eq!(finding.metrics["query_total_time_ms"], json!(12000.0));
    assert_eq!(finding.metrics["count"], json!(20));
    assert_eq!(
        finding.aggregation_provenance["query_total_time_ms"],
        "avg_time_ms * count"
    );

    let rec_ids: Vec<&str> = finding
        .recommendations
        .iter()
        .map(|rec| rec.id.as_str())
        .collect();
    assert_eq!(
        rec_ids,
        vec!["query-plan", "query-index-candidate", "query-volume-check"]
    );
}

/// A slow endpoint whose evidence shares a file with a query sample picks
/// up the cross-category association recommendation.
#[test]
fn endpoint_query_association_appears_on_shared_evidence_files() {
    let fingerprint = "c".repeat(64);
    let mut slow = profile("/x", 2500.0, None);
    slow.evidence = vec![evidence("spx", "/var/log/app/slow.log")];

    let report = run_on(
        snapshot(
            vec![slow],
            vec![sample(&fingerprint, 50.0, 2, "/var/log/app/slow.log")],
        ),
        &AnalysisRunParams::default(),
    );

    let endpoint_finding = report
        .findings
        .iter()
        .find(|finding| finding.id.starts_with("endpoint:"))
        .expect("endpoint finding");
    let rec_ids: Vec<&str> = endpoint_finding
        .recommendations
        .iter()
        .map(|rec| rec.id.as_str())
        .collect();
    assert_eq!(
        rec_ids,
        vec![
            "endpoint-breakdown",
            "endpoint-regression-check",
            "endpoint-query-association",
        ]
    );

    let association = &endpoint_finding.recommendations[2];
    assert!(association.action.contains(&fingerprint));
    assert_eq!(association.evidence.len(), 2);
}

// ═══════════════════════════════════════════════════════════════════════════
// Thresholds through the run service
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn configured_thresholds_change_classification() {
    let params = AnalysisRunParams {
        top_n: None,
        thresholds: Some(json!({
            "endpoint_wall_ms": {"p0": 3000, "p1": 1500, "p2": 500},
        })),
    };
    let report = run_on(snapshot(vec![profile("/a", 2500.0, None)], Vec::new()), &params);

    assert_eq!(report.findings[0].severity, Severity::P1);

    let entry = &report.ranking_thresholds["endpoint_wall_ms"];
    assert_eq!(entry.source, "configured");
    assert_eq!(entry.p0, 3000.0);
    // The four untouched metrics keep their defaults and stay flagged.
    assert_eq!(report.open_questions.len(), 4);
}

#[test]
fn malformed_threshold_overrides_fail_the_run() {
    let store = MemorySnapshotStore::new();
    store
        .persist(
            &snapshot(vec![profile("/a", 2500.0, None)], Vec::new()),
            &BTreeMap::new(),
        )
        .expect("persist");
    let service = AnalysisRunService::new();
    let id = "f".repeat(64);

    let out_of_order = AnalysisRunParams {
        top_n: None,
        thresholds: Some(json!({"endpoint_wall_ms": {"p0": 100, "p1": 200, "p2": 50}})),
    };
    match service.run(&store, &id, &out_of_order) {
        Err(AnalysisError::InvalidThresholds { errors }) => assert_eq!(
            errors,
            vec!["threshold set for \"endpoint_wall_ms\" must satisfy p0 >= p1 >= p2"]
        ),
        other => panic!("expected InvalidThresholds, got {other:?}"),
    }

    let non_object = AnalysisRunParams {
        top_n: None,
        thresholds: Some(json!("strict")),
    };
    match service.run(&store, &id, &non_object) {
        Err(AnalysisError::InvalidThresholds { errors }) => assert_eq!(
            errors,
            vec!["params.thresholds must be an object when provided."]
        ),
        other => panic!("expected InvalidThresholds, got {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Report shaping
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn missing_snapshot_returns_none() {
    let store = MemorySnapshotStore::new();
    let report = AnalysisRunService::new()
        .run(&store, "0000", &AnalysisRunParams::default())
        .expect("run");
    assert!(report.is_none());
}

#[test]
fn top_n_caps_every_category() {
    let mut with_spans = profile("/a", 2500.0, None);
    with_spans.spans = vec![span("x", 900.0, 900.0), span("y", 850.0, 850.0)];
    let params = AnalysisRunParams {
        top_n: Some(json!(1)),
        thresholds: None,
    };

    let report = run_on(
        snapshot(
            vec![with_spans, profile("/b", 2400.0, None)],
            vec![
                sample(&"a".repeat(64), 600.0, 20, "/var/log/slow.log"),
                sample(&"b".repeat(64), 500.0, 20, "/var/log/slow.log"),
            ],
        ),
        &params,
    );

    assert_eq!(report.summary.top_n, 1);
    assert_eq!(report.aggregates.top_endpoints.len(), 1);
    assert_eq!(report.aggregates.top_spans.len(), 1);
    assert_eq!(report.aggregates.top_queries.len(), 1);
    assert_eq!(report.findings.len(), 3);
}

/// Grouping preserves the global finding order inside each tier, and the
/// serialized report exposes the tiers under their P0/P1/P2 names.
#[test]
fn report_groups_findings_by_severity_tier() {
    let report = run_on(
        snapshot(
            vec![profile("/a", 2500.0, None), profile("/b", 500.0, None)],
            Vec::new(),
        ),
        &AnalysisRunParams::default(),
    );

    assert_eq!(report.findings_by_severity.p0.len(), 1);
    assert!(report.findings_by_severity.p1.is_empty());
    assert_eq!(report.findings_by_severity.p2.len(), 1);
    assert_eq!(report.normalized_snapshot_id, "f".repeat(64));

    assert_eq!(report.ranking_thresholds.len(), 5);
    assert!(report
        .ranking_thresholds
        .values()
        .all(|entry| entry.source == "default_conservative"));
    assert_eq!(report.open_questions.len(), 5);
    assert!(report
        .open_questions
        .iter()
        .all(|question| question.starts_with("OPEN_QUESTION: provide custom thresholds")));

    let encoded = serde_json::to_value(&report).expect("serialize report");
    assert_eq!(
        encoded["findings_by_severity"]["P0"][0]["title"],
        "Slow endpoint /a"
    );
    assert_eq!(encoded["findings_by_severity"]["P1"], json!([]));
}

// ═══════════════════════════════════════════════════════════════════════════
// Full pipeline
// ═══════════════════════════════════════════════════════════════════════════

fn write_file(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).expect("write artifact");
    path.to_string_lossy().into_owned()
}

/// Artifacts in, report out: ingest builds the snapshot, the store keeps
/// environment hints out of the content, and the run ranks both the slow
/// query and the slow endpoint.
#[test]
fn full_pipeline_from_artifacts_to_report() {
    let dir = TempDir::new().expect("tempdir");
    let slow_log = write_file(
        dir.path(),
        "mysql-slow.log",
        "\
# Time: 2026-08-10T12:00:01.000000Z
# Query_time: 12.000000  Lock_time: 0.100000 Rows_sent: 10  Rows_examined: 2000000
SET timestamp=1765000001;
SELECT * FROM orders o JOIN order_items i ON i.order_id = o.id WHERE o.created_at > '2026-08-01';
",
    );
    let timings = write_file(
        dir.path(),
        "timings.csv",
        "\
url,route,ttfb_ms,wall_ms,cpu_ms,mem_mb
https://shop.example/checkout,/checkout,420.5,1850.25,900,64
https://shop.example/faq,/faq,80,150,40,32
",
    );

    let outcome = ArtifactIngestor::new()
        .ingest(&[
            ArtifactDescriptor::new(&slow_log),
            ArtifactDescriptor::new(&timings),
        ])
        .expect("ingest");

    let store = MemorySnapshotStore::new();
    let mut hints = BTreeMap::new();
    hints.insert("php_version".to_string(), Value::from("8.3.6"));
    store.persist(&outcome.snapshot, &hints).expect("persist");

    let report = AnalysisRunService::new()
        .run(&store, outcome.snapshot.id.as_str(), &AnalysisRunParams::default())
        .expect("run")
        .expect("snapshot present");

    assert_eq!(report.normalized_snapshot_id, outcome.snapshot.id.as_str());
    assert_eq!(report.summary.endpoint_count, outcome.endpoint_count);
    assert_eq!(report.summary.query_count, 1);

    // 12s of query time is a P0; the 1850ms checkout endpoint a P1.
    assert_eq!(report.findings.len(), 2);
    assert!(report.findings[0].id.starts_with("query:"));
    assert_eq!(report.findings[0].severity, Severity::P0);
    assert_eq!(report.findings[1].title, "Slow endpoint /checkout");
    assert_eq!(report.findings[1].severity, Severity::P1);

    // Hints live in store metadata, never in the snapshot content.
    let metadata = store.metadata(&outcome.snapshot.id).expect("metadata");
    assert_eq!(metadata["environment_hints"]["php_version"], "8.3.6");
    let reloaded = store
        .load(&outcome.snapshot.id)
        .expect("load")
        .expect("present");
    assert_eq!(reloaded, outcome.snapshot);
}
