use std::path::Path;

use roaring::RoaringBitmap;
use vdb_core::{IndexKind, MetricKind};

use crate::error::IndexError;
use crate::flat::FlatIndex;
use crate::hnsw::HnswIndex;

/// The two vector index variants behind one surface. A tagged enum
/// rather than a trait object: the variants share an operation set but
/// otherwise have little in common, and callers always know which kind
/// a request names (`indexType` on the wire).
pub enum AnyIndex {
    Flat(FlatIndex),
    Hnsw(HnswIndex),
}

impl AnyIndex {
    pub fn new(kind: IndexKind, dim: usize, metric: MetricKind, hnsw_m: usize, hnsw_ef_construction: usize) -> Self {
        match kind {
            IndexKind::Flat => Self::Flat(FlatIndex::new(dim, metric)),
            IndexKind::Hnsw => Self::Hnsw(HnswIndex::new(dim, metric, hnsw_m, hnsw_ef_construction)),
        }
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            Self::Flat(_) => IndexKind::Flat,
            Self::Hnsw(_) => IndexKind::Hnsw,
        }
    }

    pub fn insert(&self, label: u64, vector: &[f32]) -> Result<(), IndexError> {
        match self {
            Self::Flat(i) => i.insert(label, vector),
            Self::Hnsw(i) => i.insert(label, vector),
        }
    }

    /// Removes `label` from the index if the variant supports it.
    /// `Hnsw` cannot retract a label from its graph (see `HnswIndex`
    /// docs) so this is a no-op there.
    pub fn remove(&self, label: u64) {
        match self {
            Self::Flat(i) => i.remove(label),
            Self::Hnsw(i) => i.remove(label),
        }
    }

    pub fn search(&self, query: &[f32], k: usize, ef: Option<usize>, filter: Option<&RoaringBitmap>) -> Result<(Vec<u64>, Vec<f32>), IndexError> {
        match self {
            Self::Flat(i) => i.search(query, k, filter),
            Self::Hnsw(i) => i.search(query, k, ef, filter),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Flat(i) => i.len(),
            Self::Hnsw(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        match self {
            Self::Flat(i) => i.save(path),
            Self::Hnsw(i) => i.save(path),
        }
    }

    pub fn load(kind: IndexKind, path: &Path) -> Result<Self, IndexError> {
        match kind {
            IndexKind::Flat => Ok(Self::Flat(FlatIndex::load(path)?)),
            IndexKind::Hnsw => Ok(Self::Hnsw(HnswIndex::load(path)?)),
        }
    }
}
