use std::collections::BinaryHeap;
use std::fs;
use std::path::Path;

use dashmap::DashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use vdb_core::MetricKind;

use crate::error::IndexError;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Scored {
    label: u64,
    distance: f32,
}

impl Eq for Scored {}
impl Ord for Scored {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance.partial_cmp(&other.distance).unwrap_or(std::cmp::Ordering::Equal)
    }
}
impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Serialize, Deserialize)]
struct FlatSnapshot {
    dim: usize,
    metric: MetricKind,
    entries: Vec<(u64, Vec<f32>)>,
}

/// Exhaustive, exact nearest-neighbor index. Every label maps to its
/// current vector; `remove` drops the entry outright, unlike `Hnsw`
/// which cannot retract a label from its graph.
pub struct FlatIndex {
    dim: usize,
    metric: MetricKind,
    vectors: DashMap<u64, Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dim: usize, metric: MetricKind) -> Self {
        Self { dim, metric, vectors: DashMap::new() }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Inserts or overwrites the vector for `label`.
    pub fn insert(&self, label: u64, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dim {
            return Err(IndexError::DimensionMismatch { expected: self.dim, actual: vector.len() });
        }
        self.vectors.insert(label, vector.to_vec());
        Ok(())
    }

    pub fn remove(&self, label: u64) {
        self.vectors.remove(&label);
    }

    /// Linear scan over every stored vector. `filter`, when present,
    /// excludes labels during the scan itself rather than after ranking,
    /// matching the pushdown contract the graph index also honors.
    pub fn search(&self, query: &[f32], k: usize, filter: Option<&RoaringBitmap>) -> Result<(Vec<u64>, Vec<f32>), IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        if k == 0 {
            return Ok((Vec::new(), Vec::new()));
        }
        // Max-heap on distance: once the heap holds k candidates, popping
        // removes the farthest one, so the heap always holds the k nearest.
        let mut heap: BinaryHeap<Scored> = BinaryHeap::with_capacity(k + 1);
        for entry in self.vectors.iter() {
            let label = *entry.key();
            if let Some(bitmap) = filter {
                if !label_fits_u32(label) || !bitmap.contains(label as u32) {
                    continue;
                }
            }
            let distance = self.metric.distance(query, entry.value());
            heap.push(Scored { label, distance });
            if heap.len() > k {
                heap.pop();
            }
        }
        let mut scored: Vec<Scored> = heap.into_iter().collect();
        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal).then(a.label.cmp(&b.label)));
        let labels = scored.iter().map(|s| s.label).collect();
        let distances = scored.iter().map(|s| s.distance).collect();
        Ok((labels, distances))
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let entries: Vec<(u64, Vec<f32>)> = self.vectors.iter().map(|e| (*e.key(), e.value().clone())).collect();
        let snapshot = FlatSnapshot { dim: self.dim, metric: self.metric, entries };
        let bytes = bincode::serialize(&snapshot).map_err(|e| IndexError::Codec(e.to_string()))?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = fs::read(path)?;
        let snapshot: FlatSnapshot = bincode::deserialize(&bytes).map_err(|e| IndexError::Codec(e.to_string()))?;
        let vectors = DashMap::new();
        for (label, vector) in snapshot.entries {
            vectors.insert(label, vector);
        }
        Ok(Self { dim: snapshot.dim, metric: snapshot.metric, vectors })
    }
}

fn label_fits_u32(label: u64) -> bool {
    label <= u64::from(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_has_zero_distance() {
        let idx = FlatIndex::new(4, MetricKind::L2);
        idx.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        let (labels, distances) = idx.search(&[1.0, 0.0, 0.0, 0.0], 1, None).unwrap();
        assert_eq!(labels, vec![1]);
        assert!(distances[0].abs() < f32::EPSILON);
    }

    #[test]
    fn filter_excludes_during_scan_not_after() {
        let idx = FlatIndex::new(2, MetricKind::L2);
        idx.insert(1, &[0.0, 0.0]).unwrap();
        idx.insert(2, &[0.0, 0.0]).unwrap();
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert(2);
        let (labels, _) = idx.search(&[0.0, 0.0], 5, Some(&bitmap)).unwrap();
        assert_eq!(labels, vec![2]);
    }

    #[test]
    fn bounded_heap_keeps_the_nearest_not_the_farthest() {
        let idx = FlatIndex::new(1, MetricKind::L2);
        idx.insert(1, &[0.0]).unwrap();
        idx.insert(2, &[5.0]).unwrap();
        idx.insert(3, &[10.0]).unwrap();
        let (labels, _) = idx.search(&[0.0], 1, None).unwrap();
        assert_eq!(labels, vec![1]);
    }

    #[test]
    fn remove_drops_the_label_entirely() {
        let idx = FlatIndex::new(2, MetricKind::L2);
        idx.insert(1, &[0.0, 0.0]).unwrap();
        idx.remove(1);
        let (labels, _) = idx.search(&[0.0, 0.0], 5, None).unwrap();
        assert!(labels.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.index");
        let idx = FlatIndex::new(3, MetricKind::InnerProduct);
        idx.insert(7, &[1.0, 2.0, 3.0]).unwrap();
        idx.save(&path).unwrap();
        let loaded = FlatIndex::load(&path).unwrap();
        let (labels, _) = loaded.search(&[1.0, 2.0, 3.0], 1, None).unwrap();
        assert_eq!(labels, vec![7]);
    }
}
