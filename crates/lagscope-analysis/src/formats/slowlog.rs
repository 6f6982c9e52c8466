//! MySQL slow-query log ingestion.
//!
//! Records start at a `# Time:` marker and run until the next marker or end
//! of file. Per-record statistics come from the `# Query_time:` comment line
//! and the SQL text is normalized into a fingerprint bucket, so repeated
//! query shapes aggregate into a single sample.

use std::collections::hash_map::Entry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::debug;

use lagscope_core::canonical::round3;
use lagscope_core::constants::{MAX_EXAMPLES_PER_FINGERPRINT, SLOW_LOG_MARKER_SCAN_LINES};
use lagscope_core::errors::IngestError;
use lagscope_core::model::{
    ArtifactDescriptor, DbQuerySample, EvidenceRef, LineRange, ValidationResult,
};

use super::{build_source, io_error, FormatHandler, ParsedArtifact};
use crate::fingerprint::SqlFingerprint;

const FORMAT: &str = "mysql_slow_log";
const VERSION: &str = "mysql-slowlog-v1";

static QUERY_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Query_time:\s*([\d.]+)").unwrap());
static LOCK_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Lock_time:\s*([\d.]+)").unwrap());
static ROWS_EXAMINED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Rows_examined:\s*(\d+)").unwrap());

/// Parses MySQL slow-query logs into fingerprint-bucketed query samples.
pub struct MysqlSlowLogHandler {
    max_examples_per_fingerprint: usize,
}

impl MysqlSlowLogHandler {
    pub fn new() -> Self {
        Self {
            max_examples_per_fingerprint: MAX_EXAMPLES_PER_FINGERPRINT,
        }
    }
}

impl Default for MysqlSlowLogHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// One in-flight slow-log record between `# Time:` markers.
struct RecordDraft {
    start_line: u32,
    end_line: u32,
    query_time_sec: f64,
    lock_time_sec: f64,
    rows_examined: f64,
    sql: String,
}

impl RecordDraft {
    fn new(line_no: u32) -> Self {
        Self {
            start_line: line_no,
            end_line: line_no,
            query_time_sec: 0.0,
            lock_time_sec: 0.0,
            rows_examined: 0.0,
            sql: String::new(),
        }
    }
}

#[derive(Default)]
struct QueryBucket {
    total_ms: f64,
    count: u64,
    lock_ms: f64,
    rows_examined: f64,
    examples: Vec<String>,
    evidence: Vec<EvidenceRef>,
}

impl FormatHandler for MysqlSlowLogHandler {
    fn format_type(&self) -> &'static str {
        FORMAT
    }

    fn validate(&self, descriptor: &ArtifactDescriptor) -> ValidationResult {
        let file = match File::open(&descriptor.path) {
            Ok(file) => file,
            Err(_) => {
                return ValidationResult::failure(
                    &descriptor.path,
                    vec!["cannot read file".to_string()],
                );
            }
        };

        let mut reader = BufReader::new(file);
        let mut raw = Vec::new();
        let mut scanned = 0usize;
        let mut has_time_marker = false;
        let mut has_stats_marker = false;
        let mut has_timestamp_marker = false;

        // All three markers must appear within the scan window.
        while scanned < SLOW_LOG_MARKER_SCAN_LINES {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            scanned += 1;

            let line = String::from_utf8_lossy(&raw);
            let trimmed = line.trim();
            if trimmed.starts_with("# Time:") {
                has_time_marker = true;
            }
            if trimmed.starts_with("# Query_time:") {
                has_stats_marker = true;
            }
            if trimmed.starts_with("SET timestamp=") {
                has_timestamp_marker = true;
            }
            if has_time_marker && has_stats_marker && has_timestamp_marker {
                break;
            }
        }

        if !(has_time_marker && has_stats_marker && has_timestamp_marker) {
            return ValidationResult::failure(
                &descriptor.path,
                vec!["missing required MySQL slow-log markers".to_string()],
            );
        }

        ValidationResult::accepted(&descriptor.path, FORMAT, VERSION, BTreeMap::new())
    }

    fn parse(
        &self,
        descriptor: &ArtifactDescriptor,
        validation: &ValidationResult,
    ) -> Result<ParsedArtifact, IngestError> {
        let file =
            File::open(&descriptor.path).map_err(|source| io_error(&descriptor.path, source))?;
        let mut reader = BufReader::new(file);

        let mut buckets: FxHashMap<String, QueryBucket> = FxHashMap::default();
        let mut bucket_order: Vec<String> = Vec::new();
        let mut record_number = 0u64;

        let mut raw = Vec::new();
        let mut line_no = 0u32;
        let mut current: Option<RecordDraft> = None;

        loop {
            raw.clear();
            let read = reader
                .read_until(b'\n', &mut raw)
                .map_err(|source| io_error(&descriptor.path, source))?;
            if read == 0 {
                break;
            }
            line_no += 1;

            let line = String::from_utf8_lossy(&raw);
            let trimmed = line.trim();

            if trimmed.starts_with("# Time:") {
                self.flush(
                    current.take(),
                    &descriptor.path,
                    &mut buckets,
                    &mut bucket_order,
                    &mut record_number,
                );
                current = Some(RecordDraft::new(line_no));
                continue;
            }

            let Some(draft) = current.as_mut() else {
                continue;
            };
            draft.end_line = line_no;

            if trimmed.starts_with("# Query_time:") {
                if let Some(captures) = QUERY_TIME_RE.captures(trimmed) {
                    if let Ok(value) = captures[1].parse() {
                        draft.query_time_sec = value;
                    }
                }
                if let Some(captures) = LOCK_TIME_RE.captures(trimmed) {
                    if let Ok(value) = captures[1].parse() {
                        draft.lock_time_sec = value;
                    }
                }
                if let Some(captures) = ROWS_EXAMINED_RE.captures(trimmed) {
                    if let Ok(value) = captures[1].parse() {
                        draft.rows_examined = value;
                    }
                }
                continue;
            }

            if trimmed.is_empty()
                || trimmed.starts_with('#')
                || trimmed.starts_with("SET timestamp=")
            {
                continue;
            }

            // `use <db>;` lines are session context, not query text.
            if trimmed
                .get(..4)
                .is_some_and(|head| head.eq_ignore_ascii_case("use "))
            {
                continue;
            }

            draft.sql.push_str(line.trim_end());
            draft.sql.push('\n');
        }

        self.flush(
            current.take(),
            &descriptor.path,
            &mut buckets,
            &mut bucket_order,
            &mut record_number,
        );

        // Samples keep first-seen fingerprint order.
        let mut samples = Vec::with_capacity(bucket_order.len());
        for fingerprint in bucket_order {
            let Some(bucket) = buckets.remove(&fingerprint) else {
                continue;
            };
            let divisor = bucket.count.max(1) as f64;
            samples.push(DbQuerySample {
                fingerprint,
                total_time_ms: round3(bucket.total_ms),
                avg_time_ms: round3(bucket.total_ms / divisor),
                count: bucket.count,
                lock_ms: Some(round3(bucket.lock_ms)),
                rows_examined: Some(round3(bucket.rows_examined)),
                examples: bucket.examples,
                evidence: bucket.evidence,
            });
        }

        debug!(
            path = %descriptor.path,
            records = record_number,
            fingerprints = samples.len(),
            "parsed slow-log artifact"
        );

        let source = build_source(
            descriptor,
            FORMAT,
            validation.detected_version.clone(),
            descriptor.hints.clone(),
        )?;
        Ok(ParsedArtifact::queries(source, samples))
    }
}

impl MysqlSlowLogHandler {
    /// Folds a completed record into its fingerprint bucket. Records with no
    /// SQL text or a non-positive query time are discarded and do not count.
    fn flush(
        &self,
        draft: Option<RecordDraft>,
        path: &str,
        buckets: &mut FxHashMap<String, QueryBucket>,
        bucket_order: &mut Vec<String>,
        record_number: &mut u64,
    ) {
        let Some(draft) = draft else {
            return;
        };

        let sql = draft.sql.trim();
        if sql.is_empty() || draft.query_time_sec <= 0.0 {
            return;
        }
        *record_number += 1;

        let fingerprint = SqlFingerprint::fingerprint(sql);
        let bucket = match buckets.entry(fingerprint.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                bucket_order.push(fingerprint);
                entry.insert(QueryBucket::default())
            }
        };

        bucket.total_ms += draft.query_time_sec * 1000.0;
        bucket.count += 1;
        bucket.lock_ms += draft.lock_time_sec * 1000.0;
        bucket.rows_examined += draft.rows_examined;

        if bucket.examples.len() < self.max_examples_per_fingerprint {
            bucket.examples.push(SqlFingerprint::redact(sql));
        }

        bucket.evidence.push(EvidenceRef::new(
            FORMAT,
            path,
            Some(LineRange::new(draft.start_line, draft.end_line)),
            Some(format!("slowlog:{}", *record_number)),
            "query_time, lock_time, rows_examined and normalized SQL extracted from slow-log record",
        ));
    }
}
