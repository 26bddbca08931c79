use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde_json::Value;
use vdb_core::Document;

use crate::error::StoreError;

const DOCUMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("documents");
const RAW: TableDefinition<&str, &[u8]> = TableDefinition::new("raw");

/// Durable key-value store backing every document payload, plus a raw
/// string-keyed table used by the filter index and snapshot bookkeeping
/// to stash blobs under well-known keys instead of real files.
///
/// An open failure is treated as fatal at startup: there is nothing
/// useful a node can do without its durable store.
pub struct ScalarStore {
    db: Database,
}

impl ScalarStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        {
            let tx = db.begin_write()?;
            tx.open_table(DOCUMENTS)?;
            tx.open_table(RAW)?;
            tx.commit()?;
        }
        Ok(Self { db })
    }

    /// Writes the document payload for `id`. Failures here are surfaced
    /// to the caller and must abort the enclosing commit.
    pub fn put(&self, id: u64, document: &Document) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&document.0).map_err(|e| StoreError::Write(e.to_string()))?;
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(DOCUMENTS)?;
            table.insert(id, bytes.as_slice())?;
        }
        tx.commit()?;
        Ok(())
    }

    /// A read miss is not an error: it returns `None`.
    pub fn get(&self, id: u64) -> Result<Option<Document>, StoreError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(DOCUMENTS)?;
        let Some(bytes) = table.get(id)? else {
            return Ok(None);
        };
        let value: Value = serde_json::from_slice(bytes.value()).map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(Some(Document::new(value)))
    }

    pub fn put_raw(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(RAW)?;
            table.insert(key, bytes)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// A raw-key miss is expected and common (cold-start snapshot lookups)
    /// so it is silent, unlike `put_raw` failures.
    pub fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(RAW)?;
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get_round_trips_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScalarStore::open(&dir.path().join("scalar.redb")).unwrap();
        let doc = Document::new(json!({"id": 1, "vectors": [1.0, 2.0], "category": 7}));
        store.put(1, &doc).unwrap();
        let fetched = store.get(1).unwrap().unwrap();
        assert_eq!(fetched.integer_field("category"), Some(7));
    }

    #[test]
    fn get_on_miss_returns_none_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScalarStore::open(&dir.path().join("scalar.redb")).unwrap();
        assert!(store.get(999).unwrap().is_none());
    }

    #[test]
    fn raw_keys_round_trip_bitmap_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScalarStore::open(&dir.path().join("scalar.redb")).unwrap();
        store.put_raw("2.index", b"blob-bytes").unwrap();
        assert_eq!(store.get_raw("2.index").unwrap(), Some(b"blob-bytes".to_vec()));
        assert_eq!(store.get_raw("missing").unwrap(), None);
    }
}
