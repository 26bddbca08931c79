use std::collections::HashMap;
use std::path::{Path, PathBuf};

use roaring::RoaringBitmap;
use serde_json::Value;
use tracing::instrument;
use vdb_core::{Document, Durability, FilterExpr, IndexKind, MetricKind};
use vdb_index::FilterIndex;
use vdb_store::{ScalarStore, Wal};

use crate::error::DbError;
use crate::registry::IndexRegistry;

const SNAPSHOT_DIR: &str = "snapshots_";

/// Orchestrates the scalar store, vector indices, filter index, and WAL
/// for one node. Every commit-path mutation funnels through `upsert`;
/// `search`/`query` are read paths safe to call concurrently with it.
pub struct VectorDatabase {
    scalar: ScalarStore,
    registry: IndexRegistry,
    filter_index: FilterIndex,
    wal: Wal,
    data_dir: PathBuf,
}

impl VectorDatabase {
    /// Opens (or creates) every durable component under `data_dir`,
    /// restores the last snapshot, and replays the WAL past its
    /// watermark so the in-memory indices match what was committed
    /// before any prior shutdown.
    pub fn open(
        data_dir: &Path,
        dim: usize,
        metric: MetricKind,
        hnsw_m: usize,
        hnsw_ef_construction: usize,
        durability: Durability,
    ) -> Result<Self, DbError> {
        std::fs::create_dir_all(data_dir).map_err(vdb_store::StoreError::from)?;
        let scalar = ScalarStore::open(&data_dir.join("scalar.redb"))?;
        let snapshot_dir = data_dir.join(SNAPSHOT_DIR);
        let registry = IndexRegistry::load(&snapshot_dir, dim, metric, hnsw_m, hnsw_ef_construction);
        let wal = Wal::open(&data_dir.join("wal.log"), durability)?;
        let filter_index = rebuild_filter_index(&wal)?;

        let db = Self { scalar, registry, filter_index, wal, data_dir: data_dir.to_path_buf() };
        db.reload_registry_and_scalar()?;
        Ok(db)
    }

    /// Replays every WAL entry past the last snapshot's watermark into the
    /// vector indices and scalar store. This, not a scan of the scalar
    /// store, is the sole source of truth for index state after a
    /// restart, so a snapshot taken mid-write can never leave the indices
    /// ahead of what the WAL actually committed.
    ///
    /// The filter index is deliberately not touched here: it is rebuilt
    /// separately, from the full WAL, by `rebuild_filter_index`. Diffing
    /// it against `self.scalar.get(id)` during a *partial* replay would
    /// compare against the scalar store's already-final value for `id`
    /// rather than the value that held at the time of each replayed
    /// record, silently leaving an id in two buckets for a field that
    /// changed value after the last snapshot.
    fn reload_registry_and_scalar(&self) -> Result<(), DbError> {
        let snapshot_dir = self.data_dir.join(SNAPSHOT_DIR);
        let last_snapshot_id = vdb_store::wal::read_snapshot_watermark(&snapshot_dir)?;
        for record in self.wal.replay(last_snapshot_id)? {
            let record = record?;
            if record.op != "upsert" {
                continue;
            }
            let (id, document, index_type) = decode_upsert_record(&record)?;
            self.apply_registry_and_scalar(id, &document, index_type)?;
        }
        Ok(())
    }

    /// Applies one upsert: remove the old vector from the target index (a
    /// no-op for `Hnsw`), insert the new one, mirror every integer scalar
    /// field into the filter index, and finally persist the document. The
    /// scalar-store write is last on purpose — a crash between these
    /// steps leaves the WAL, not the scalar store, as the source of truth
    /// for replay.
    #[instrument(skip(self, document))]
    pub fn upsert(&self, id: u64, document: &Document, index_type: IndexKind) -> Result<(), DbError> {
        let existing = self.apply_registry_and_scalar(id, document, index_type)?;
        self.apply_filter(id, document, existing.as_ref());
        Ok(())
    }

    /// The index + scalar half of `upsert`, shared with the tail-WAL
    /// replay path. Returns the document that occupied `id` before this
    /// write, if any, for callers that need it to diff the filter index.
    fn apply_registry_and_scalar(
        &self,
        id: u64,
        document: &Document,
        index_type: IndexKind,
    ) -> Result<Option<Document>, DbError> {
        let existing = self.scalar.get(id)?;
        let index = self.registry.get(index_type);

        if existing.is_some() && id <= u64::from(u32::MAX) {
            index.remove(id);
        }

        let vector = document.vectors().ok_or(vdb_core::CoreError::MissingField("vectors"))?;
        index.insert(id, &vector)?;
        self.scalar.put(id, document)?;
        Ok(existing)
    }

    /// The filter half of `upsert`, factored out so `rebuild_filter_index`
    /// can drive it from its own purely-replay-local notion of "old".
    fn apply_filter(&self, id: u64, document: &Document, existing: Option<&Document>) {
        if id > u64::from(u32::MAX) {
            return;
        }
        let bitmap_id = id as u32;
        for (field, new_value) in document.integer_fields() {
            let old_value = existing.and_then(|d| d.integer_field(&field));
            self.filter_index.update(&field, old_value, new_value, bitmap_id);
        }
    }

    /// The non-durable, non-replicated fast path behind `/insert`: writes
    /// straight into the target index and nowhere else — no scalar store,
    /// no filter-index mirroring, no WAL record. Useful for bulk local
    /// loading where callers accept that a crash loses unsnapshotted work.
    pub fn registry_insert(&self, id: u64, vector: &[f32], index_type: IndexKind) -> Result<(), DbError> {
        self.registry.get(index_type).insert(id, vector)?;
        Ok(())
    }

    pub fn query(&self, id: u64) -> Result<Option<Document>, DbError> {
        Ok(self.scalar.get(id)?)
    }

    pub fn search(
        &self,
        index_type: IndexKind,
        query: &[f32],
        k: usize,
        ef: Option<usize>,
        filter: Option<&FilterExpr>,
    ) -> Result<(Vec<u64>, Vec<f32>), DbError> {
        let bitmap = filter.map(|f| {
            let mut out = RoaringBitmap::new();
            self.filter_index.query(&f.field, f.op, f.value, &mut out);
            out
        });
        let index = self.registry.get(index_type);
        Ok(index.search(query, k, ef, bitmap.as_ref())?)
    }

    /// Thin delegation to the WAL, used by callers (the non-replicated
    /// `/insert` fast path, or single-node test harnesses) that want a
    /// durable record without going through replication.
    pub fn write_wal_log(&self, op: &str, json: &str) -> Result<u64, DbError> {
        Ok(self.wal.append(op, json, 1)?)
    }

    /// Delegation used by the replication commit callback, which already
    /// knows the log index to use.
    pub fn write_wal_log_at(&self, log_id: u64, op: &str, json: &str) -> Result<(), DbError> {
        Ok(self.wal.append_raw(log_id, op, json, 1)?)
    }

    /// The watermark the replication layer aligns its commit cursor to
    /// on restart: entries at or below it are already reflected by the
    /// last snapshot.
    pub fn start_log_index(&self) -> Result<u64, DbError> {
        Ok(vdb_store::wal::read_snapshot_watermark(&self.data_dir.join(SNAPSHOT_DIR))?)
    }

    /// Snapshots the vector indices and advances the watermark the tail
    /// replay starts from on restart. The filter index has no snapshot of
    /// its own — the WAL is never truncated, so `rebuild_filter_index`
    /// reconstructs it from scratch at open time every time, which is the
    /// only replay order that keeps its old/new diffing correct.
    pub fn take_snapshot(&self) -> Result<(), DbError> {
        let snapshot_dir = self.data_dir.join(SNAPSHOT_DIR);
        self.registry.save(&snapshot_dir)?;
        vdb_store::wal::write_snapshot_watermark(&snapshot_dir, self.wal.current_id())?;
        Ok(())
    }
}

/// Decodes one WAL upsert record into `(id, document, index_type)`. A
/// malformed record is fatal rather than skippable: the WAL is the only
/// record of what was committed, so silently dropping an entry here would
/// leave this replica's state permanently diverged from what it should be.
fn decode_upsert_record(record: &vdb_store::WalRecord) -> Result<(u64, Document, IndexKind), DbError> {
    let value: Value = serde_json::from_str(&record.payload).map_err(|err| {
        DbError::Corrupt(format!(
            "WAL record at log_id {} is not valid JSON: {err}",
            record.log_id
        ))
    })?;
    let document = Document::new(value);
    let id = document.id().ok_or_else(|| {
        DbError::Corrupt(format!("WAL record at log_id {} is missing an id", record.log_id))
    })?;
    let index_type = document.index_type().and_then(IndexKind::parse).unwrap_or(IndexKind::Flat);
    Ok((id, document, index_type))
}

/// Rebuilds the filter index from the entire WAL history, not just the
/// tail past the last snapshot watermark. The WAL is append-only and
/// never truncated, so this is always possible, and it is the only way
/// to diff each record's integer fields against the value that actually
/// held immediately before it: the scalar store already holds the final
/// value for every id by the time a restart runs, so it cannot stand in
/// for "old" during replay.
fn rebuild_filter_index(wal: &Wal) -> Result<FilterIndex, DbError> {
    let filter_index = FilterIndex::new();
    let mut last_seen: HashMap<u64, Document> = HashMap::new();
    for record in wal.replay(0)? {
        let record = record?;
        if record.op != "upsert" {
            continue;
        }
        let (id, document, _index_type) = decode_upsert_record(&record)?;
        if id <= u64::from(u32::MAX) {
            let bitmap_id = id as u32;
            let old = last_seen.get(&id);
            for (field, new_value) in document.integer_fields() {
                let old_value = old.and_then(|d| d.integer_field(&field));
                filter_index.update(&field, old_value, new_value, bitmap_id);
            }
        }
        last_seen.insert(id, document);
    }
    Ok(filter_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_db(dir: &Path) -> VectorDatabase {
        VectorDatabase::open(dir, 4, MetricKind::L2, 16, 100, Durability::Strict).unwrap()
    }

    #[test]
    fn upsert_then_query_returns_the_same_document() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(dir.path());
        let doc = Document::new(json!({"id": 1, "vectors": [1.0, 0.0, 0.0, 0.0], "category": 7}));
        db.upsert(1, &doc, IndexKind::Flat).unwrap();
        let fetched = db.query(1).unwrap().unwrap();
        assert_eq!(fetched.integer_field("category"), Some(7));
    }

    #[test]
    fn search_with_k1_finds_the_exact_match_at_zero_distance() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(dir.path());
        let doc = Document::new(json!({"id": 1, "vectors": [1.0, 0.0, 0.0, 0.0], "category": 7}));
        db.upsert(1, &doc, IndexKind::Flat).unwrap();
        let (labels, distances) = db.search(IndexKind::Flat, &[1.0, 0.0, 0.0, 0.0], 1, None, None).unwrap();
        assert_eq!(labels, vec![1]);
        assert!(distances[0].abs() < f32::EPSILON);
    }

    #[test]
    fn filtered_search_respects_the_current_category_only() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(dir.path());
        let doc1 = Document::new(json!({"id": 1, "vectors": [1.0, 0.0, 0.0, 0.0], "category": 7}));
        db.upsert(1, &doc1, IndexKind::Flat).unwrap();

        let filter7 = FilterExpr { field: "category".into(), op: vdb_core::FilterOp::Equal, value: 7 };
        let (labels, _) = db.search(IndexKind::Flat, &[1.0, 0.0, 0.0, 0.0], 1, None, Some(&filter7)).unwrap();
        assert_eq!(labels, vec![1]);

        let doc2 = Document::new(json!({"id": 1, "vectors": [0.0, 1.0, 0.0, 0.0], "category": 8}));
        db.upsert(1, &doc2, IndexKind::Flat).unwrap();
        let (labels, _) = db.search(IndexKind::Flat, &[0.0, 1.0, 0.0, 0.0], 1, None, Some(&filter7)).unwrap();
        assert!(labels.is_empty());
    }

    #[test]
    fn restart_replays_the_wal_and_reproduces_search_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        {
            let db = open_db(&path);
            let doc = Document::new(json!({"id": 1, "vectors": [1.0, 0.0, 0.0, 0.0], "indexType": "FLAT"}));
            let payload = serde_json::to_string(&doc.0).unwrap();
            db.write_wal_log("upsert", &payload).unwrap();
            db.upsert(1, &doc, IndexKind::Flat).unwrap();
        }
        let reopened = open_db(&path);
        let (labels, _) = reopened.search(IndexKind::Flat, &[1.0, 0.0, 0.0, 0.0], 1, None, None).unwrap();
        assert_eq!(labels, vec![1]);
    }

    #[test]
    fn restart_after_a_post_snapshot_value_change_does_not_double_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        {
            let db = open_db(&path);
            let doc7 = Document::new(json!({"id": 1, "vectors": [1.0, 0.0, 0.0, 0.0], "category": 7}));
            db.upsert(1, &doc7, IndexKind::Flat).unwrap();
            db.take_snapshot().unwrap();

            let doc8 = Document::new(json!({"id": 1, "vectors": [0.0, 1.0, 0.0, 0.0], "category": 8}));
            let payload = serde_json::to_string(&doc8.0).unwrap();
            db.write_wal_log("upsert", &payload).unwrap();
            db.upsert(1, &doc8, IndexKind::Flat).unwrap();
        }
        let reopened = open_db(&path);

        let filter7 = FilterExpr { field: "category".into(), op: vdb_core::FilterOp::Equal, value: 7 };
        let (labels, _) = reopened.search(IndexKind::Flat, &[0.0, 1.0, 0.0, 0.0], 1, None, Some(&filter7)).unwrap();
        assert!(labels.is_empty(), "id 1 should no longer match the stale category=7 bucket");

        let filter8 = FilterExpr { field: "category".into(), op: vdb_core::FilterOp::Equal, value: 8 };
        let (labels, _) = reopened.search(IndexKind::Flat, &[0.0, 1.0, 0.0, 0.0], 1, None, Some(&filter8)).unwrap();
        assert_eq!(labels, vec![1]);
    }

    #[test]
    fn snapshot_then_restart_yields_identical_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        {
            let db = open_db(&path);
            let doc = Document::new(json!({"id": 1, "vectors": [1.0, 0.0, 0.0, 0.0], "category": 7}));
            db.upsert(1, &doc, IndexKind::Flat).unwrap();
            db.take_snapshot().unwrap();
        }
        let reopened = open_db(&path);
        let fetched = reopened.query(1).unwrap().unwrap();
        assert_eq!(fetched.integer_field("category"), Some(7));
        let (labels, _) = reopened.search(IndexKind::Flat, &[1.0, 0.0, 0.0, 0.0], 1, None, None).unwrap();
        assert_eq!(labels, vec![1]);
    }
}
