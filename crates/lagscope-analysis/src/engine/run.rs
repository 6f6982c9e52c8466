//! Analysis runs against stored snapshots.
//!
//! Loads a snapshot by id, resolves thresholds and top N from loosely-typed
//! caller params, runs the engine, and shapes the full report: summary
//! counts, the resolved threshold table, open questions, aggregates, and
//! findings both flat and grouped by severity.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use lagscope_core::constants::{DEFAULT_TOP_N, MAX_TOP_N, MIN_TOP_N};
use lagscope_core::errors::AnalysisError;
use lagscope_core::model::{Finding, Severity, SnapshotId};

use crate::store::SnapshotStore;

use super::analyzer::{Aggregates, SnapshotAnalysisEngine};
use super::thresholds::{AnalysisThresholds, ThresholdTableEntry};

/// Loosely-typed run parameters, as supplied by an outer dispatch layer.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRunParams {
    /// Ranked rows per category. Non-integer values fall back to the
    /// default; integers clamp to the supported range.
    pub top_n: Option<Value>,
    /// Threshold overrides. `Some(Value::Null)` is a supplied non-object
    /// and is rejected; `None` means the key was absent.
    pub thresholds: Option<Value>,
}

impl AnalysisRunParams {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub endpoint_count: usize,
    pub query_count: usize,
    pub finding_count: usize,
    pub p0_count: usize,
    pub p1_count: usize,
    pub p2_count: usize,
    pub top_n: usize,
}

/// Findings bucketed by tier, preserving the global finding order inside
/// each bucket.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FindingsBySeverity {
    #[serde(rename = "P0")]
    pub p0: Vec<Finding>,
    #[serde(rename = "P1")]
    pub p1: Vec<Finding>,
    #[serde(rename = "P2")]
    pub p2: Vec<Finding>,
}

/// Complete result of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub normalized_snapshot_id: String,
    pub summary: RunSummary,
    pub ranking_thresholds: BTreeMap<String, ThresholdTableEntry>,
    pub open_questions: Vec<String>,
    pub aggregates: Aggregates,
    pub findings: Vec<Finding>,
    pub findings_by_severity: FindingsBySeverity,
}

/// Orchestrates load, threshold resolution, analysis, and report shaping.
#[derive(Default)]
pub struct AnalysisRunService {
    engine: SnapshotAnalysisEngine,
}

impl AnalysisRunService {
    pub fn new() -> Self {
        Self {
            engine: SnapshotAnalysisEngine::new(),
        }
    }

    /// Returns `Ok(None)` when no snapshot exists under `snapshot_id`.
    pub fn run(
        &self,
        store: &dyn SnapshotStore,
        snapshot_id: &str,
        params: &AnalysisRunParams,
    ) -> Result<Option<AnalysisReport>, AnalysisError> {
        let Some(snapshot) = store.load(&SnapshotId(snapshot_id.to_string()))? else {
            return Ok(None);
        };

        let top_n = normalize_top_n(params.top_n.as_ref());
        let threshold_input = normalize_threshold_input(params.thresholds.as_ref())?;
        let thresholds = AnalysisThresholds::from_input(threshold_input)?;
        let outcome = self.engine.analyze(&snapshot, &thresholds, top_n);

        let findings_by_severity = group_by_severity(&outcome.findings);

        info!(
            snapshot_id = %snapshot.id,
            findings = outcome.findings.len(),
            p0 = findings_by_severity.p0.len(),
            p1 = findings_by_severity.p1.len(),
            p2 = findings_by_severity.p2.len(),
            top_n,
            "analysis run complete"
        );

        Ok(Some(AnalysisReport {
            normalized_snapshot_id: snapshot.id.as_str().to_string(),
            summary: RunSummary {
                endpoint_count: snapshot.request_profiles.len(),
                query_count: snapshot.db_query_samples.len(),
                finding_count: outcome.findings.len(),
                p0_count: findings_by_severity.p0.len(),
                p1_count: findings_by_severity.p1.len(),
                p2_count: findings_by_severity.p2.len(),
                top_n,
            },
            ranking_thresholds: thresholds.table(),
            open_questions: thresholds.open_questions().to_vec(),
            aggregates: outcome.aggregates,
            findings: outcome.findings,
            findings_by_severity,
        }))
    }
}

fn normalize_top_n(input: Option<&Value>) -> usize {
    match input.and_then(Value::as_i64) {
        Some(top_n) => top_n.clamp(MIN_TOP_N as i64, MAX_TOP_N as i64) as usize,
        None => DEFAULT_TOP_N,
    }
}

fn normalize_threshold_input(input: Option<&Value>) -> Result<Option<&Value>, AnalysisError> {
    match input {
        None => Ok(None),
        Some(value) if value.is_object() => Ok(Some(value)),
        Some(_) => Err(AnalysisError::InvalidThresholds {
            errors: vec!["params.thresholds must be an object when provided.".to_string()],
        }),
    }
}

fn group_by_severity(findings: &[Finding]) -> FindingsBySeverity {
    let mut grouped = FindingsBySeverity::default();
    for finding in findings {
        match finding.severity {
            Severity::P0 => grouped.p0.push(finding.clone()),
            Severity::P1 => grouped.p1.push(finding.clone()),
            Severity::P2 => grouped.p2.push(finding.clone()),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ---- top_n normalization ----

    #[test]
    fn top_n_defaults_for_non_integers() {
        assert_eq!(normalize_top_n(None), 5);
        assert_eq!(normalize_top_n(Some(&json!("seven"))), 5);
        assert_eq!(normalize_top_n(Some(&json!(7.5))), 5);
        assert_eq!(normalize_top_n(Some(&json!(null))), 5);
    }

    #[test]
    fn top_n_clamps_integers() {
        assert_eq!(normalize_top_n(Some(&json!(0))), 1);
        assert_eq!(normalize_top_n(Some(&json!(-3))), 1);
        assert_eq!(normalize_top_n(Some(&json!(7))), 7);
        assert_eq!(normalize_top_n(Some(&json!(100))), 20);
    }

    // ---- threshold param shape ----

    #[test]
    fn absent_thresholds_pass_through() {
        assert!(matches!(normalize_threshold_input(None), Ok(None)));
    }

    #[test]
    fn supplied_non_object_thresholds_are_rejected() {
        for value in [json!(null), json!("fast"), json!([1, 2])] {
            let result = normalize_threshold_input(Some(&value));
            match result {
                Err(AnalysisError::InvalidThresholds { errors }) => assert_eq!(
                    errors,
                    vec!["params.thresholds must be an object when provided."]
                ),
                other => panic!("expected InvalidThresholds, got {other:?}"),
            }
        }
    }
}
