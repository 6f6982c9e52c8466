//! Snapshot persistence.
//!
//! A store holds the canonical encoding of each snapshot plus a metadata
//! document (creation time, source artifacts, caller-supplied environment
//! hints). Stored content is immutable: persisting an id twice keeps the
//! first write. Loading re-hydrates field by field, skipping malformed
//! records rather than failing the whole snapshot.

mod hydrate;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{SecondsFormat, Utc};
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use tracing::debug;

use lagscope_core::canonical;
use lagscope_core::errors::StoreError;
use lagscope_core::model::{Snapshot, SnapshotId};

/// Persistence seam between ingestion and analysis.
pub trait SnapshotStore: Send + Sync {
    /// Store a snapshot with the caller's environment hints. Hints land in
    /// the metadata document, never in the snapshot itself, so they cannot
    /// disturb the content-derived id.
    fn persist(
        &self,
        snapshot: &Snapshot,
        environment_hints: &BTreeMap<String, Value>,
    ) -> Result<(), StoreError>;

    /// Load a snapshot by id. Unknown ids and undecodable payloads load as
    /// `None`.
    fn load(&self, snapshot_id: &SnapshotId) -> Result<Option<Snapshot>, StoreError>;
}

struct StoredRecord {
    data: String,
    metadata: Value,
}

/// In-process store keyed by snapshot id.
///
/// Data is kept as its encoded document, so every load exercises the same
/// hydration path an on-disk store would.
#[derive(Default)]
pub struct MemorySnapshotStore {
    records: Mutex<FxHashMap<String, StoredRecord>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw payload under an id, bypassing encoding. Lets tests put
    /// hand-built or damaged documents where [`SnapshotStore::load`] will
    /// find them.
    pub fn insert_raw(&self, snapshot_id: impl Into<String>, payload: impl Into<String>) {
        self.lock_records().insert(
            snapshot_id.into(),
            StoredRecord {
                data: payload.into(),
                metadata: Value::Null,
            },
        );
    }

    /// Metadata recorded at first persist for an id, if any.
    pub fn metadata(&self, snapshot_id: &SnapshotId) -> Option<Value> {
        self.lock_records()
            .get(snapshot_id.as_str())
            .map(|record| record.metadata.clone())
    }

    fn lock_records(&self) -> MutexGuard<'_, FxHashMap<String, StoredRecord>> {
        // A poisoned lock means a panic elsewhere, not a damaged map.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn persist(
        &self,
        snapshot: &Snapshot,
        environment_hints: &BTreeMap<String, Value>,
    ) -> Result<(), StoreError> {
        let document = canonical::to_value(snapshot).map_err(|source| StoreError::Encode {
            id: snapshot.id.as_str().to_string(),
            source,
        })?;
        let sources = canonical::to_value(&snapshot.sources).map_err(|source| {
            StoreError::Encode {
                id: snapshot.id.as_str().to_string(),
                source,
            }
        })?;

        let mut records = self.lock_records();
        if records.contains_key(snapshot.id.as_str()) {
            debug!(snapshot_id = %snapshot.id, "snapshot already stored, keeping first write");
            return Ok(());
        }

        let metadata = json!({
            "snapshot_id": snapshot.id.as_str(),
            "created_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            "sources": sources,
            "environment_hints": environment_hints,
        });
        records.insert(
            snapshot.id.as_str().to_string(),
            StoredRecord {
                data: canonical::encode(&document),
                metadata,
            },
        );
        debug!(snapshot_id = %snapshot.id, "snapshot stored");
        Ok(())
    }

    fn load(&self, snapshot_id: &SnapshotId) -> Result<Option<Snapshot>, StoreError> {
        let records = self.lock_records();
        let Some(record) = records.get(snapshot_id.as_str()) else {
            return Ok(None);
        };
        let Ok(document) = serde_json::from_str::<Value>(&record.data) else {
            return Ok(None);
        };
        Ok(hydrate::snapshot(&document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagscope_core::model::{EvidenceRef, LineRange, RequestProfile, SourceArtifact};

    fn snapshot(id: &str, endpoint: &str) -> Snapshot {
        Snapshot {
            id: SnapshotId(id.to_string()),
            collected_at: "2024-01-01T00:00:00+00:00".to_string(),
            sources: vec![SourceArtifact {
                path: "/tmp/a.json".to_string(),
                artifact_type: "spx_dump".to_string(),
                version: Some("spx-json-v1".to_string()),
                sha256: "aa".to_string(),
                size_bytes: 3,
                hints: BTreeMap::new(),
            }],
            request_profiles: vec![RequestProfile {
                endpoint: endpoint.to_string(),
                ttfb_ms: Some(120.5),
                wall_ms: 480.25,
                cpu_ms: None,
                mem_mb: None,
                spans: Vec::new(),
                evidence: vec![EvidenceRef::new(
                    "spx_dump",
                    "/tmp/a.json",
                    Some(LineRange::single(1)),
                    None,
                    "wall and ttfb extracted",
                )],
            }],
            db_query_samples: Vec::new(),
        }
    }

    #[test]
    fn round_trip_restores_snapshot() {
        let store = MemorySnapshotStore::new();
        let original = snapshot("snap-1", "/checkout");
        store.persist(&original, &BTreeMap::new()).expect("persist");

        let loaded = store
            .load(&SnapshotId("snap-1".to_string()))
            .expect("load")
            .expect("present");

        assert_eq!(loaded.id.as_str(), "snap-1");
        assert_eq!(loaded.collected_at, original.collected_at);
        assert_eq!(loaded.sources.len(), 1);
        assert_eq!(loaded.request_profiles.len(), 1);
        assert_eq!(loaded.request_profiles[0].endpoint, "/checkout");
        assert_eq!(loaded.request_profiles[0].wall_ms, 480.25);
        assert_eq!(
            loaded.request_profiles[0].evidence[0].line_range,
            Some(LineRange::single(1))
        );
    }

    #[test]
    fn unknown_id_loads_as_none() {
        let store = MemorySnapshotStore::new();
        let loaded = store
            .load(&SnapshotId("missing".to_string()))
            .expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn corrupt_payload_loads_as_none() {
        let store = MemorySnapshotStore::new();
        store.insert_raw("snap-1", "{not json");
        let loaded = store.load(&SnapshotId("snap-1".to_string())).expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn first_write_wins_for_same_id() {
        let store = MemorySnapshotStore::new();
        store
            .persist(&snapshot("snap-1", "/checkout"), &BTreeMap::new())
            .expect("persist");
        store
            .persist(&snapshot("snap-1", "/other"), &BTreeMap::new())
            .expect("persist");

        let loaded = store
            .load(&SnapshotId("snap-1".to_string()))
            .expect("load")
            .expect("present");
        assert_eq!(loaded.request_profiles[0].endpoint, "/checkout");
    }

    #[test]
    fn environment_hints_land_in_metadata() {
        let store = MemorySnapshotStore::new();
        let mut hints = BTreeMap::new();
        hints.insert("php_version".to_string(), Value::from("8.3.6"));
        store
            .persist(&snapshot("snap-1", "/checkout"), &hints)
            .expect("persist");

        let metadata = store
            .metadata(&SnapshotId("snap-1".to_string()))
            .expect("present");
        assert_eq!(metadata["snapshot_id"], "snap-1");
        assert_eq!(metadata["environment_hints"]["php_version"], "8.3.6");
        assert_eq!(metadata["sources"][0]["path"], "/tmp/a.json");
        assert!(metadata["created_at"].is_string());
    }
}
