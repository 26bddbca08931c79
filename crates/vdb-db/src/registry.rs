use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;
use vdb_core::{IndexKind, MetricKind};
use vdb_index::AnyIndex;

use crate::error::DbError;

/// Owns one vector index per configured type for a single node. An
/// explicit, constructed-at-startup handle passed by `Arc` into the
/// database, the replication layer, and the HTTP surface — never a
/// process-global singleton.
pub struct IndexRegistry {
    indices: DashMap<IndexKind, Arc<AnyIndex>>,
    dim: usize,
    metric: MetricKind,
    hnsw_m: usize,
    hnsw_ef_construction: usize,
}

impl IndexRegistry {
    pub fn new(dim: usize, metric: MetricKind, hnsw_m: usize, hnsw_ef_construction: usize) -> Self {
        let indices = DashMap::new();
        indices.insert(IndexKind::Flat, Arc::new(AnyIndex::new(IndexKind::Flat, dim, metric, hnsw_m, hnsw_ef_construction)));
        indices.insert(IndexKind::Hnsw, Arc::new(AnyIndex::new(IndexKind::Hnsw, dim, metric, hnsw_m, hnsw_ef_construction)));
        Self { indices, dim, metric, hnsw_m, hnsw_ef_construction }
    }

    /// Restores each index type from `<folder>/<type_id>.index`. A
    /// missing file is a cold start, not an error: it is warned about
    /// and the fresh index constructed by `new` is left in place.
    pub fn load(folder: &Path, dim: usize, metric: MetricKind, hnsw_m: usize, hnsw_ef_construction: usize) -> Self {
        let registry = Self::new(dim, metric, hnsw_m, hnsw_ef_construction);
        for kind in [IndexKind::Flat, IndexKind::Hnsw] {
            let path = folder.join(format!("{}.index", kind.type_id()));
            if !path.exists() {
                warn!(index = %kind, path = %path.display(), "no snapshot file found, starting empty");
                continue;
            }
            match AnyIndex::load(kind, &path) {
                Ok(loaded) => {
                    registry.indices.insert(kind, Arc::new(loaded));
                }
                Err(e) => {
                    warn!(index = %kind, path = %path.display(), error = %e, "failed to load snapshot, starting empty");
                }
            }
        }
        registry
    }

    pub fn save(&self, folder: &Path) -> Result<(), DbError> {
        std::fs::create_dir_all(folder).map_err(vdb_index::IndexError::from)?;
        for entry in self.indices.iter() {
            let path = folder.join(format!("{}.index", entry.key().type_id()));
            entry.value().save(&path)?;
        }
        Ok(())
    }

    pub fn get(&self, kind: IndexKind) -> Arc<AnyIndex> {
        self.indices
            .get(&kind)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| Arc::new(AnyIndex::new(kind, self.dim, self.metric, self.hnsw_m, self.hnsw_ef_construction)))
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn metric(&self) -> MetricKind {
        self.metric
    }
}
