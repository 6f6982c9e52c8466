//! Artifact ingestion: validate descriptors, parse them, and fold the
//! fragments into one deterministic snapshot.
//!
//! The snapshot id is a pure function of contents. Descriptor order never
//! changes it: profiles deduplicate by canonical hash, query samples merge
//! by fingerprint, and every collection is sorted with a canonical-encoding
//! tie break before hashing.

use std::collections::hash_map::Entry;

use chrono::{SecondsFormat, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use lagscope_core::canonical::{self, round3};
use lagscope_core::constants::MAX_EXAMPLES_PER_FINGERPRINT;
use lagscope_core::errors::IngestError;
use lagscope_core::model::{
    ArtifactDescriptor, DbQuerySample, EvidenceRef, RequestProfile, Snapshot, SnapshotId,
    SourceArtifact, ValidationResult,
};

use crate::formats::ParsedArtifact;
use crate::validate::ArtifactValidator;

/// A built snapshot together with the validation trail and entity counts.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub snapshot: Snapshot,
    pub validation: Vec<ValidationResult>,
    pub endpoint_count: usize,
    pub query_count: usize,
    pub span_count: usize,
}

/// Front door for turning artifact descriptors into a snapshot.
pub struct ArtifactIngestor {
    validator: ArtifactValidator,
}

impl ArtifactIngestor {
    pub fn new() -> Self {
        Self {
            validator: ArtifactValidator::new(),
        }
    }

    pub fn with_validator(validator: ArtifactValidator) -> Self {
        Self { validator }
    }

    /// Ingestion is atomic over validation: if any descriptor fails, the
    /// full result list is returned as an error and nothing is parsed.
    pub fn ingest(&self, descriptors: &[ArtifactDescriptor]) -> Result<IngestOutcome, IngestError> {
        let validation = self.validator.validate_many(descriptors);
        if validation.iter().any(|result| !result.ok) {
            warn!(
                failed = validation.iter().filter(|result| !result.ok).count(),
                total = validation.len(),
                "validation failed, snapshot not built"
            );
            return Err(IngestError::ValidationFailed {
                results: validation,
            });
        }

        let mut parsed = Vec::with_capacity(descriptors.len());
        for (descriptor, result) in descriptors.iter().zip(&validation) {
            let Some(handler) = self.validator.resolve_parser(result) else {
                continue;
            };
            parsed.push(handler.parse(descriptor, result)?);
        }

        let snapshot = build_snapshot(parsed)?;
        let span_count = snapshot
            .request_profiles
            .iter()
            .map(|profile| profile.spans.len())
            .sum();

        info!(
            snapshot_id = %snapshot.id,
            sources = snapshot.sources.len(),
            endpoints = snapshot.request_profiles.len(),
            queries = snapshot.db_query_samples.len(),
            spans = span_count,
            "snapshot built"
        );

        Ok(IngestOutcome {
            endpoint_count: snapshot.request_profiles.len(),
            query_count: snapshot.db_query_samples.len(),
            span_count,
            snapshot,
            validation,
        })
    }
}

impl Default for ArtifactIngestor {
    fn default() -> Self {
        Self::new()
    }
}

fn build_snapshot(parsed: Vec<ParsedArtifact>) -> Result<Snapshot, IngestError> {
    let mut sources = Vec::new();
    let mut profiles = Vec::new();
    let mut queries = Vec::new();

    for fragment in parsed {
        sources.push(fragment.source);
        profiles.extend(fragment.request_profiles);
        queries.extend(fragment.db_query_samples);
    }

    for profile in &mut profiles {
        round_profile(profile);
    }
    let profiles = deduplicate_profiles(profiles)?;
    let queries = merge_query_samples(queries);

    let sources =
        sort_with_canonical_tie_break(sources, |source: &SourceArtifact| source.path.clone())?;
    let profiles = sort_with_canonical_tie_break(profiles, |profile: &RequestProfile| {
        profile.endpoint.clone()
    })?;
    let queries = sort_with_canonical_tie_break(queries, |sample: &DbQuerySample| {
        sample.fingerprint.clone()
    })?;

    let id = derive_snapshot_id(&sources, &profiles, &queries)?;

    Ok(Snapshot {
        id: SnapshotId(id),
        collected_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        sources,
        request_profiles: profiles,
        db_query_samples: queries,
    })
}

/// Emitted numbers carry at most 3 decimals; rounding happens before the
/// dedupe hash so equal-after-rounding profiles collapse.
fn round_profile(profile: &mut RequestProfile) {
    profile.wall_ms = round3(profile.wall_ms);
    profile.ttfb_ms = profile.ttfb_ms.map(round3);
    profile.cpu_ms = profile.cpu_ms.map(round3);
    profile.mem_mb = profile.mem_mb.map(round3);
    for span in &mut profile.spans {
        span.self_ms = round3(span.self_ms);
        span.total_ms = round3(span.total_ms);
    }
}

/// Identical canonical content collapses to one profile; the survivor keeps
/// the position of its first occurrence.
fn deduplicate_profiles(
    profiles: Vec<RequestProfile>,
) -> Result<Vec<RequestProfile>, IngestError> {
    let mut index_by_key: FxHashMap<String, usize> = FxHashMap::default();
    let mut kept: Vec<RequestProfile> = Vec::new();

    for profile in profiles {
        let key = sha256_hex(&canonical::encode(&canonical::to_value(&profile)?));
        match index_by_key.entry(key) {
            Entry::Occupied(entry) => {
                kept[*entry.get()] = profile;
            }
            Entry::Vacant(entry) => {
                entry.insert(kept.len());
                kept.push(profile);
            }
        }
    }

    Ok(kept)
}

#[derive(Default)]
struct MergeBucket {
    total: f64,
    count: u64,
    lock: Option<f64>,
    rows: Option<f64>,
    examples: Vec<String>,
    evidence: Vec<EvidenceRef>,
}

/// Merge repeated fingerprint observations. `lock_ms`/`rows_examined` stay
/// `None` only when no contributor carried the field.
fn merge_query_samples(samples: Vec<DbQuerySample>) -> Vec<DbQuerySample> {
    let mut merged: FxHashMap<String, MergeBucket> = FxHashMap::default();
    let mut order: Vec<String> = Vec::new();

    for sample in samples {
        let bucket = match merged.entry(sample.fingerprint.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                order.push(sample.fingerprint);
                entry.insert(MergeBucket::default())
            }
        };

        bucket.total += sample.total_time_ms;
        bucket.count += sample.count;
        if let Some(lock_ms) = sample.lock_ms {
            bucket.lock = Some(bucket.lock.unwrap_or(0.0) + lock_ms);
        }
        if let Some(rows_examined) = sample.rows_examined {
            bucket.rows = Some(bucket.rows.unwrap_or(0.0) + rows_examined);
        }
        for example in sample.examples {
            if !bucket.examples.contains(&example) {
                bucket.examples.push(example);
            }
        }
        bucket.evidence.extend(sample.evidence);
    }

    let mut result = Vec::with_capacity(order.len());
    for fingerprint in order {
        let Some(bucket) = merged.remove(&fingerprint) else {
            continue;
        };
        let avg = if bucket.count > 0 {
            bucket.total / bucket.count as f64
        } else {
            0.0
        };
        let mut examples = bucket.examples;
        examples.truncate(MAX_EXAMPLES_PER_FINGERPRINT);
        result.push(DbQuerySample {
            fingerprint,
            total_time_ms: round3(bucket.total),
            avg_time_ms: round3(avg),
            count: bucket.count,
            lock_ms: bucket.lock.map(round3),
            rows_examined: bucket.rows.map(round3),
            examples,
            evidence: bucket.evidence,
        });
    }

    result
}

/// Sort by the primary key, breaking ties with the canonical encoding of
/// the whole record so equal keys still order deterministically.
fn sort_with_canonical_tie_break<T, F>(items: Vec<T>, primary: F) -> Result<Vec<T>, IngestError>
where
    T: Serialize,
    F: Fn(&T) -> String,
{
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let encoded = canonical::encode(&canonical::to_value(&item)?);
        keyed.push((primary(&item), encoded, item));
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(keyed.into_iter().map(|(_, _, item)| item).collect())
}

fn derive_snapshot_id(
    sources: &[SourceArtifact],
    profiles: &[RequestProfile],
    queries: &[DbQuerySample],
) -> Result<String, IngestError> {
    let hash_input = serde_json::json!({
        "sources": canonical::to_value(&sources)?,
        "request_profiles": canonical::to_value(&profiles)?,
        "db_query_samples": canonical::to_value(&queries)?,
    });

    Ok(sha256_hex(&canonical::encode(&hash_input)))
}

fn sha256_hex(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}
