//! Ranking and classification of a snapshot into findings.
//!
//! The engine is a pure function of (snapshot, thresholds, top N). Each
//! category ranks its candidates, emits an aggregate row for every ranked
//! entry, and a Finding only for entries that clear at least the P2 cut
//! point. Ties break on stable string keys so repeated runs produce
//! identical output.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use serde::Serialize;
use serde_json::Value;
use sha1::{Digest, Sha1};
use tracing::debug;

use lagscope_core::canonical::round3;
use lagscope_core::constants::{MAX_EVIDENCE_REFS, MAX_RECOMMENDATIONS};
use lagscope_core::model::{
    DbQuerySample, EvidenceRef, Finding, Recommendation, RequestProfile, Severity, Snapshot, Span,
};

use super::thresholds::AnalysisThresholds;

/// Ranked endpoint row; emitted for every top-N profile regardless of
/// severity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointAggregate {
    pub endpoint: String,
    pub wall_ms: f64,
    pub ttfb_ms: Option<f64>,
    pub severity: Option<Severity>,
    pub evidence: Vec<EvidenceRef>,
}

/// Ranked span row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanAggregate {
    pub endpoint: String,
    pub span_label: String,
    pub span_type: String,
    pub self_ms: f64,
    pub total_ms: f64,
    pub severity: Option<Severity>,
    pub evidence: Vec<EvidenceRef>,
}

/// Ranked query row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAggregate {
    pub fingerprint: String,
    pub query_total_time_ms: f64,
    pub avg_time_ms: f64,
    pub count: u64,
    pub severity: Option<Severity>,
    pub evidence: Vec<EvidenceRef>,
}

/// The three ranked listings, including sub-threshold rows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregates {
    pub top_endpoints: Vec<EndpointAggregate>,
    pub top_spans: Vec<SpanAggregate>,
    pub top_queries: Vec<QueryAggregate>,
}

/// Findings in global severity order plus the aggregate listings.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub findings: Vec<Finding>,
    pub aggregates: Aggregates,
}

/// Stateless snapshot analyzer.
#[derive(Default)]
pub struct SnapshotAnalysisEngine;

impl SnapshotAnalysisEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(
        &self,
        snapshot: &Snapshot,
        thresholds: &AnalysisThresholds,
        top_n: usize,
    ) -> AnalysisOutcome {
        let (endpoint_findings, top_endpoints) = analyze_endpoints(
            &snapshot.request_profiles,
            &snapshot.db_query_samples,
            thresholds,
            top_n,
        );
        let (span_findings, top_spans) =
            analyze_spans(&snapshot.request_profiles, thresholds, top_n);
        let (query_findings, top_queries) =
            analyze_queries(&snapshot.db_query_samples, thresholds, top_n);

        let mut findings = endpoint_findings;
        findings.extend(span_findings);
        findings.extend(query_findings);
        findings.sort_by(|a, b| a.severity.cmp(&b.severity).then_with(|| a.id.cmp(&b.id)));

        debug!(
            snapshot_id = %snapshot.id,
            findings = findings.len(),
            top_n,
            "snapshot analyzed"
        );

        AnalysisOutcome {
            findings,
            aggregates: Aggregates {
                top_endpoints,
                top_spans,
                top_queries,
            },
        }
    }
}

fn endpoint_score(profile: &RequestProfile) -> f64 {
    profile.wall_ms.max(profile.ttfb_ms.unwrap_or(0.0))
}

fn analyze_endpoints(
    profiles: &[RequestProfile],
    queries: &[DbQuerySample],
    thresholds: &AnalysisThresholds,
    top_n: usize,
) -> (Vec<Finding>, Vec<EndpointAggregate>) {
    let mut ranked: Vec<&RequestProfile> = profiles.iter().collect();
    ranked.sort_by(|a, b| {
        endpoint_score(b)
            .total_cmp(&endpoint_score(a))
            .then_with(|| a.endpoint.cmp(&b.endpoint))
    });

    let mut findings = Vec::new();
    let mut aggregates = Vec::new();

    for profile in ranked.into_iter().take(top_n) {
        let wall_severity = thresholds.severity_for("endpoint_wall_ms", profile.wall_ms);
        let ttfb_severity = profile
            .ttfb_ms
            .and_then(|ttfb| thresholds.severity_for("endpoint_ttfb_ms", ttfb));
        let severity = Severity::most_severe(wall_severity, ttfb_severity);

        aggregates.push(EndpointAggregate {
            endpoint: profile.endpoint.clone(),
            wall_ms: round3(profile.wall_ms),
            ttfb_ms: profile.ttfb_ms.map(round3),
            severity,
            evidence: profile.evidence.clone(),
        });

        let Some(severity) = severity else {
            continue;
        };

        let evidence = limit_evidence(&profile.evidence);
        let mut recommendations = vec![
            Recommendation {
                id: "endpoint-breakdown".to_string(),
                action: format!(
                    "Collect endpoint-level breakdown for \"{}\" by comparing wall vs CPU vs memory in the same capture window.",
                    profile.endpoint
                ),
                verification_step:
                    "Re-run SPX/timing capture and confirm whether wall_ms remains dominant against cpu_ms."
                        .to_string(),
                evidence: evidence.clone(),
            },
            Recommendation {
                id: "endpoint-regression-check".to_string(),
                action: format!(
                    "Run a controlled baseline request set for \"{}\" and compare p95 wall/ttfb to this snapshot.",
                    profile.endpoint
                ),
                verification_step:
                    "Use identical traffic volume and validate that p95/p99 latency trend matches this finding."
                        .to_string(),
                evidence: evidence.clone(),
            },
        ];

        if let Some((fingerprint, merged_evidence)) = endpoint_query_association(profile, queries)
        {
            recommendations.push(Recommendation {
                id: "endpoint-query-association".to_string(),
                action: format!(
                    "Inspect query fingerprint \"{fingerprint}\" in the context of endpoint \"{}\" before attempting mitigations.",
                    profile.endpoint
                ),
                verification_step:
                    "Trace query call sequence for this endpoint and verify contribution with SQL profiling or EXPLAIN ANALYZE."
                        .to_string(),
                evidence: merged_evidence,
            });
        }
        recommendations.truncate(MAX_RECOMMENDATIONS);

        let mut metrics = BTreeMap::new();
        metrics.insert("wall_ms".to_string(), Value::from(round3(profile.wall_ms)));
        metrics.insert("ttfb_ms".to_string(), optional_metric(profile.ttfb_ms));
        metrics.insert("cpu_ms".to_string(), optional_metric(profile.cpu_ms));
        metrics.insert("mem_mb".to_string(), optional_metric(profile.mem_mb));
        metrics.insert(
            "severity_score_ms".to_string(),
            Value::from(round3(endpoint_score(profile))),
        );

        let ttfb_clause = match profile.ttfb_ms {
            Some(ttfb) => format!(" with {:.3}ms TTFB", round3(ttfb)),
            None => String::new(),
        };

        findings.push(Finding {
            id: format!("endpoint:{}", sha1_hex(profile.endpoint.as_bytes())),
            title: format!("Slow endpoint {}", profile.endpoint),
            severity,
            impact_summary: format!(
                "Endpoint \"{}\" reached {:.3}ms wall time{}.",
                profile.endpoint,
                round3(profile.wall_ms),
                ttfb_clause
            ),
            metrics,
            aggregation_provenance: BTreeMap::from([
                (
                    "wall_ms".to_string(),
                    "directly from request_profile.wall_ms".to_string(),
                ),
                (
                    "ttfb_ms".to_string(),
                    "directly from request_profile.ttfb_ms when present".to_string(),
                ),
                (
                    "severity_score_ms".to_string(),
                    "max(wall_ms, ttfb_ms)".to_string(),
                ),
            ]),
            evidence,
            recommendations,
        });
    }

    (findings, aggregates)
}

fn analyze_spans(
    profiles: &[RequestProfile],
    thresholds: &AnalysisThresholds,
    top_n: usize,
) -> (Vec<Finding>, Vec<SpanAggregate>) {
    struct Row<'a> {
        endpoint: &'a str,
        span: &'a Span,
        score: f64,
    }

    let mut rows: Vec<Row<'_>> = Vec::new();
    for profile in profiles {
        for span in &profile.spans {
            rows.push(Row {
                endpoint: &profile.endpoint,
                span,
                score: span.self_ms.max(span.total_ms),
            });
        }
    }

    rows.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.span.label.cmp(&b.span.label))
            .then_with(|| a.endpoint.cmp(b.endpoint))
    });

    let mut findings = Vec::new();
    let mut aggregates = Vec::new();

    for row in rows.into_iter().take(top_n) {
        let span = row.span;
        let severity = Severity::most_severe(
            thresholds.severity_for("span_self_ms", span.self_ms),
            thresholds.severity_for("span_total_ms", span.total_ms),
        );

        aggregates.push(SpanAggregate {
            endpoint: row.endpoint.to_string(),
            span_label: span.label.clone(),
            span_type: span.span_type.clone(),
            self_ms: round3(span.self_ms),
            total_ms: round3(span.total_ms),
            severity,
            evidence: span.evidence.clone(),
        });

        let Some(severity) = severity else {
            continue;
        };

        let evidence = limit_evidence(&span.evidence);
        let identity = format!("{}|{}|{}", row.endpoint, span.span_type, span.label);

        findings.push(Finding {
            id: format!("span:{}", sha1_hex(identity.as_bytes())),
            title: format!("Heavy span {} ({})", span.label, row.endpoint),
            severity,
            impact_summary: format!(
                "Span \"{}\" in endpoint \"{}\" consumed {:.3}ms self and {:.3}ms total time.",
                span.label,
                row.endpoint,
                round3(span.self_ms),
                round3(span.total_ms)
            ),
            metrics: BTreeMap::from([
                ("self_ms".to_string(), Value::from(round3(span.self_ms))),
                ("total_ms".to_string(), Value::from(round3(span.total_ms))),
                (
                    "severity_score_ms".to_string(),
                    Value::from(round3(span.self_ms.max(span.total_ms))),
                ),
            ]),
            aggregation_provenance: BTreeMap::from([
                (
                    "self_ms".to_string(),
                    "directly from span.self_ms".to_string(),
                ),
                (
                    "total_ms".to_string(),
                    "directly from span.total_ms".to_string(),
                ),
                (
                    "severity_score_ms".to_string(),
                    "max(self_ms, total_ms)".to_string(),
                ),
            ]),
            evidence: evidence.clone(),
            recommendations: vec![
                Recommendation {
                    id: "span-flamegraph".to_string(),
                    action: format!(
                        "Profile span \"{}\" call tree and identify dominant child frames.",
                        span.label
                    ),
                    verification_step:
                        "Capture a focused trace and confirm the same span remains in top self_ms contributors."
                            .to_string(),
                    evidence: evidence.clone(),
                },
                Recommendation {
                    id: "span-input-shape".to_string(),
                    action: format!(
                        "Compare input sizes and branching paths that trigger span \"{}\" in endpoint \"{}\".",
                        span.label, row.endpoint
                    ),
                    verification_step:
                        "Replay representative requests and confirm whether span duration scales with input shape."
                            .to_string(),
                    evidence,
                },
            ],
        });
    }

    (findings, aggregates)
}

fn analyze_queries(
    queries: &[DbQuerySample],
    thresholds: &AnalysisThresholds,
    top_n: usize,
) -> (Vec<Finding>, Vec<QueryAggregate>) {
    let mut ranked: Vec<&DbQuerySample> = queries.iter().collect();
    ranked.sort_by(|a, b| {
        let score_a = a.avg_time_ms * a.count as f64;
        let score_b = b.avg_time_ms * b.count as f64;
        score_b
            .total_cmp(&score_a)
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });

    let mut findings = Vec::new();
    let mut aggregates = Vec::new();

    for query in ranked.into_iter().take(top_n) {
        let contribution = round3(query.avg_time_ms * query.count as f64);
        let severity = thresholds.severity_for("query_total_time_ms", contribution);

        aggregates.push(QueryAggregate {
            fingerprint: query.fingerprint.clone(),
            query_total_time_ms: contribution,
            avg_time_ms: round3(query.avg_time_ms),
            count: query.count,
            severity,
            evidence: query.evidence.clone(),
        });

        let Some(severity) = severity else {
            continue;
        };

        let evidence = limit_evidence(&query.evidence);
        let short_fingerprint: String = query.fingerprint.chars().take(12).collect();

        findings.push(Finding {
            id: format!("query:{}", query.fingerprint),
            title: format!("Slow query fingerprint {short_fingerprint}"),
            severity,
            impact_summary: format!(
                "Fingerprint {} contributes {:.3}ms total estimated time (avg {:.3}ms x {}).",
                query.fingerprint,
                contribution,
                round3(query.avg_time_ms),
                query.count
            ),
            metrics: BTreeMap::from([
                (
                    "query_total_time_ms".to_string(),
                    Value::from(contribution),
                ),
                (
                    "avg_time_ms".to_string(),
                    Value::from(round3(query.avg_time_ms)),
                ),
                ("count".to_string(), Value::from(query.count)),
                (
                    "reported_total_time_ms".to_string(),
                    Value::from(round3(query.total_time_ms)),
                ),
                ("lock_ms".to_string(), optional_metric(query.lock_ms)),
                (
                    "rows_examined".to_string(),
                    optional_metric(query.rows_examined),
                ),
            ]),
            aggregation_provenance: BTreeMap::from([
                (
                    "query_total_time_ms".to_string(),
                    "avg_time_ms * count".to_string(),
                ),
                (
                    "reported_total_time_ms".to_string(),
                    "directly from db_query_sample.total_time_ms".to_string(),
                ),
            ]),
            evidence: evidence.clone(),
            recommendations: vec![
                Recommendation {
                    id: "query-plan".to_string(),
                    action: format!(
                        "Run EXPLAIN ANALYZE for fingerprint {} using representative literals.",
                        query.fingerprint
                    ),
                    verification_step:
                        "Confirm scan type, row estimates, and execution time align with slow-log evidence."
                            .to_string(),
                    evidence: evidence.clone(),
                },
                Recommendation {
                    id: "query-index-candidate".to_string(),
                    action:
                        "Inspect access path and index coverage for filter/join predicates in this fingerprint."
                            .to_string(),
                    verification_step:
                        "Measure avg_time_ms before/after index or rewrite in a controlled staging replay."
                            .to_string(),
                    evidence: evidence.clone(),
                },
                Recommendation {
                    id: "query-volume-check".to_string(),
                    action:
                        "Validate whether call frequency can be reduced through caching, batching, or deduplication."
                            .to_string(),
                    verification_step:
                        "Track count and total contribution across a second capture window after the change."
                            .to_string(),
                    evidence,
                },
            ],
        });
    }

    (findings, aggregates)
}

/// First query (in snapshot order) sharing an evidence file with the
/// profile, with the profile's evidence and the matching refs merged.
fn endpoint_query_association(
    profile: &RequestProfile,
    queries: &[DbQuerySample],
) -> Option<(String, Vec<EvidenceRef>)> {
    let endpoint_files: FxHashSet<&str> = profile
        .evidence
        .iter()
        .map(|evidence| evidence.file.as_str())
        .collect();

    for query in queries {
        let matching: Vec<&EvidenceRef> = query
            .evidence
            .iter()
            .filter(|evidence| endpoint_files.contains(evidence.file.as_str()))
            .collect();

        if !matching.is_empty() {
            let mut merged = profile.evidence.clone();
            merged.extend(matching.into_iter().cloned());
            merged.truncate(MAX_EVIDENCE_REFS);
            return Some((query.fingerprint.clone(), merged));
        }
    }

    None
}

fn limit_evidence(evidence: &[EvidenceRef]) -> Vec<EvidenceRef> {
    evidence.iter().take(MAX_EVIDENCE_REFS).cloned().collect()
}

fn optional_metric(value: Option<f64>) -> Value {
    match value {
        Some(value) => Value::from(round3(value)),
        None => Value::Null,
    }
}

fn sha1_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha1::digest(bytes))
}
