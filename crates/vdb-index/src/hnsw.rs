use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use vdb_core::MetricKind;

use crate::error::IndexError;

type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    id: NodeId,
    distance: f32,
}
impl Eq for Candidate {}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance.partial_cmp(&other.distance).unwrap_or(std::cmp::Ordering::Equal)
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Node {
    /// `layers[l]` holds this node's neighbor ids at level `l`.
    layers: Vec<RwLock<Vec<NodeId>>>,
}

#[derive(Serialize, Deserialize)]
struct HnswSnapshot {
    dim: usize,
    metric: MetricKind,
    m: usize,
    ef_construction: usize,
    entry_point: u32,
    max_layer: u32,
    vectors: Vec<Vec<f32>>,
    layers: Vec<Vec<Vec<u32>>>,
    labels: Vec<u64>,
    deleted: Vec<u8>,
}

/// Hierarchical navigable small-world graph index.
///
/// `remove` is intentionally unsupported: an upsert of a label already
/// present overwrites its stored vector in place (`vectors[internal_id]`)
/// without touching the graph topology, so the node stays reachable by
/// traversal but every future distance computation against it uses the
/// new vector. This mirrors a known property of the system this was
/// built from, not an oversight here.
pub struct HnswIndex {
    dim: usize,
    metric: MetricKind,
    m: usize,
    ef_construction: usize,
    nodes: RwLock<Vec<Node>>,
    vectors: RwLock<Vec<Vec<f32>>>,
    labels: RwLock<Vec<u64>>,
    label_to_internal: DashMap<u64, NodeId>,
    deleted: RwLock<RoaringBitmap>,
    entry_point: AtomicU32,
    max_layer: AtomicU32,
    has_entry: std::sync::atomic::AtomicBool,
}

const NO_ENTRY: u32 = u32::MAX;

impl HnswIndex {
    pub fn new(dim: usize, metric: MetricKind, m: usize, ef_construction: usize) -> Self {
        Self {
            dim,
            metric,
            m,
            ef_construction,
            nodes: RwLock::new(Vec::new()),
            vectors: RwLock::new(Vec::new()),
            labels: RwLock::new(Vec::new()),
            label_to_internal: DashMap::new(),
            deleted: RwLock::new(RoaringBitmap::new()),
            entry_point: AtomicU32::new(NO_ENTRY),
            max_layer: AtomicU32::new(0),
            has_entry: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.label_to_internal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.label_to_internal.is_empty()
    }

    fn random_level(&self) -> u32 {
        let ml = 1.0 / (self.m.max(2) as f64).ln();
        let mut rng = rand::thread_rng();
        let r: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
        (-r.ln() * ml).floor() as u32
    }

    pub fn insert(&self, label: u64, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dim {
            return Err(IndexError::DimensionMismatch { expected: self.dim, actual: vector.len() });
        }

        if let Some(existing) = self.label_to_internal.get(&label) {
            let internal_id = *existing as usize;
            self.vectors.write()[internal_id] = vector.to_vec();
            return Ok(());
        }

        let level = self.random_level();
        let internal_id = {
            let mut nodes = self.nodes.write();
            let mut vectors = self.vectors.write();
            let mut labels = self.labels.write();
            let id = nodes.len() as NodeId;
            nodes.push(Node { layers: (0..=level).map(|_| RwLock::new(Vec::new())).collect() });
            vectors.push(vector.to_vec());
            labels.push(label);
            id
        };
        self.label_to_internal.insert(label, internal_id);

        if !self.has_entry.swap(true, Ordering::AcqRel) {
            self.entry_point.store(internal_id, Ordering::Release);
            self.max_layer.store(level, Ordering::Release);
            return Ok(());
        }

        let mut entry = self.entry_point.load(Ordering::Acquire);
        let top = self.max_layer.load(Ordering::Acquire);
        let mut cur_dist = self.distance_to_internal(vector, entry);

        for l in (level + 1..=top).rev() {
            let (next, next_dist) = self.greedy_step(entry, cur_dist, vector, l);
            entry = next;
            cur_dist = next_dist;
        }

        for l in (0..=level.min(top)).rev() {
            let candidates = self.search_layer_candidates(entry, vector, l, self.ef_construction);
            let neighbors = self.select_neighbors(vector, candidates, self.m);
            {
                let nodes = self.nodes.read();
                *nodes[internal_id as usize].layers[l as usize].write() = neighbors.clone();
            }
            for &nb in &neighbors {
                self.connect(nb, internal_id, l);
            }
            if let Some(&best) = neighbors.first() {
                entry = best;
                cur_dist = self.distance_to_internal(vector, best);
            }
        }

        if level > top {
            self.entry_point.store(internal_id, Ordering::Release);
            self.max_layer.store(level, Ordering::Release);
        }

        Ok(())
    }

    fn connect(&self, node_id: NodeId, new_id: NodeId, level: u32) {
        let nodes = self.nodes.read();
        let node = &nodes[node_id as usize];
        if (level as usize) >= node.layers.len() {
            return;
        }
        let mut neighbors = node.layers[level as usize].write();
        neighbors.push(new_id);
        if neighbors.len() > self.m * 2 {
            let vectors = self.vectors.read();
            let node_vec = vectors[node_id as usize].clone();
            drop(vectors);
            let candidates: BinaryHeap<Candidate> = neighbors
                .iter()
                .map(|&id| Candidate { id, distance: self.distance_to_internal(&node_vec, id) })
                .collect();
            *neighbors = self.select_neighbors(&node_vec, candidates, self.m * 2);
        }
    }

    fn distance_to_internal(&self, query: &[f32], internal_id: NodeId) -> f32 {
        let vectors = self.vectors.read();
        self.metric.distance(query, &vectors[internal_id as usize])
    }

    fn greedy_step(&self, start: NodeId, start_dist: f32, query: &[f32], level: u32) -> (NodeId, f32) {
        let mut cur = start;
        let mut cur_dist = start_dist;
        loop {
            let mut improved = false;
            let neighbors = {
                let nodes = self.nodes.read();
                if (level as usize) >= nodes[cur as usize].layers.len() {
                    Vec::new()
                } else {
                    nodes[cur as usize].layers[level as usize].read().clone()
                }
            };
            for nb in neighbors {
                let d = self.distance_to_internal(query, nb);
                if d < cur_dist {
                    cur = nb;
                    cur_dist = d;
                    improved = true;
                }
            }
            if !improved {
                return (cur, cur_dist);
            }
        }
    }

    /// Construction-time layer search: no validity/filter notion, used
    /// purely to find neighbor candidates for a new node.
    fn search_layer_candidates(&self, entry: NodeId, query: &[f32], level: u32, ef: usize) -> BinaryHeap<Candidate> {
        let mut visited = std::collections::HashSet::new();
        visited.insert(entry);
        let entry_dist = self.distance_to_internal(query, entry);
        let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        candidates.push(Reverse(Candidate { id: entry, distance: entry_dist }));
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();
        results.push(Candidate { id: entry, distance: entry_dist });

        while let Some(Reverse(c)) = candidates.pop() {
            if let Some(worst) = results.peek() {
                if results.len() >= ef && c.distance > worst.distance {
                    break;
                }
            }
            let neighbors = {
                let nodes = self.nodes.read();
                if (level as usize) >= nodes[c.id as usize].layers.len() {
                    Vec::new()
                } else {
                    nodes[c.id as usize].layers[level as usize].read().clone()
                }
            };
            for nb in neighbors {
                if !visited.insert(nb) {
                    continue;
                }
                let d = self.distance_to_internal(query, nb);
                if results.len() < ef || d < results.peek().map(|w| w.distance).unwrap_or(f32::INFINITY) {
                    candidates.push(Reverse(Candidate { id: nb, distance: d }));
                    results.push(Candidate { id: nb, distance: d });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }
        results
    }

    /// Diversity-pruning heuristic: keeps a candidate only if it is
    /// closer to the query than it is to every neighbor already chosen.
    fn select_neighbors(&self, _query: &[f32], candidates: BinaryHeap<Candidate>, m: usize) -> Vec<NodeId> {
        let mut sorted: Vec<Candidate> = candidates.into_iter().collect();
        sorted.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        let mut selected: Vec<NodeId> = Vec::with_capacity(m);
        let vectors = self.vectors.read();
        for c in sorted {
            if selected.len() >= m {
                break;
            }
            let c_vec = &vectors[c.id as usize];
            let is_good = selected.iter().all(|&s| {
                let s_vec = &vectors[s as usize];
                self.metric.distance(c_vec, s_vec) > c.distance
            });
            if is_good {
                selected.push(c.id);
            }
        }
        selected
    }

    /// Upsert of an existing label never retracts it from the graph;
    /// there is nothing to do here. Kept as an explicit no-op method
    /// (rather than simply absent) so call sites read the same for
    /// `Flat` and `Hnsw`.
    pub fn remove(&self, _label: u64) {}

    pub fn search(&self, query: &[f32], k: usize, ef: Option<usize>, filter: Option<&RoaringBitmap>) -> Result<(Vec<u64>, Vec<f32>), IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        if k == 0 || !self.has_entry.load(Ordering::Acquire) {
            return Ok((Vec::new(), Vec::new()));
        }
        let ef = ef.unwrap_or(k).max(k);
        let entry = self.entry_point.load(Ordering::Acquire);
        let top = self.max_layer.load(Ordering::Acquire);

        let mut cur = entry;
        let mut cur_dist = self.distance_to_internal(query, cur);
        for l in (1..=top).rev() {
            let (next, next_dist) = self.greedy_step(cur, cur_dist, query, l);
            cur = next;
            cur_dist = next_dist;
        }

        let results = self.search_layer0_filtered(cur, cur_dist, query, ef, filter);

        let deleted = self.deleted.read();
        let labels_guard = self.labels.read();
        let mut out: Vec<Candidate> = results
            .into_iter()
            .filter(|c| !deleted.contains(c.id))
            .collect();
        out.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal).then(a.id.cmp(&b.id)));
        out.truncate(k);

        let labels = out.iter().map(|c| labels_guard[c.id as usize]).collect();
        let distances = out.iter().map(|c| c.distance).collect();
        Ok((labels, distances))
    }

    /// Layer-0 best-first search. Navigation explores every neighbor
    /// regardless of filter validity (invalid nodes are still useful
    /// stepping stones through the graph); only the output candidate set
    /// is restricted to labels the filter bitmap allows. This is what
    /// makes a filtered search a single pushdown-aware traversal instead
    /// of an unfiltered search followed by a post-filter.
    fn search_layer0_filtered(&self, entry: NodeId, entry_dist: f32, query: &[f32], ef: usize, filter: Option<&RoaringBitmap>) -> Vec<Candidate> {
        let is_valid = |id: NodeId, label: u64| -> bool {
            (match filter {
                Some(bitmap) => label <= u64::from(u32::MAX) && bitmap.contains(label as u32),
                None => true,
            })
            && !self.deleted.read().contains(id)
        };

        let mut visited = std::collections::HashSet::new();
        visited.insert(entry);
        let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        candidates.push(Reverse(Candidate { id: entry, distance: entry_dist }));

        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();
        {
            let labels = self.labels.read();
            if is_valid(entry, labels[entry as usize]) {
                results.push(Candidate { id: entry, distance: entry_dist });
            }
        }

        while let Some(Reverse(c)) = candidates.pop() {
            if let Some(worst) = results.peek() {
                if results.len() >= ef && c.distance > worst.distance {
                    break;
                }
            }
            let neighbors = {
                let nodes = self.nodes.read();
                let neighbors = nodes[c.id as usize].layers[0].read().clone();
                neighbors
            };
            for nb in neighbors {
                if !visited.insert(nb) {
                    continue;
                }
                let d = self.distance_to_internal(query, nb);
                candidates.push(Reverse(Candidate { id: nb, distance: d }));
                let nb_label = self.labels.read()[nb as usize];
                if is_valid(nb, nb_label) && (results.len() < ef || d < results.peek().map(|w| w.distance).unwrap_or(f32::INFINITY)) {
                    results.push(Candidate { id: nb, distance: d });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }
        results.into_iter().collect()
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let nodes = self.nodes.read();
        let layers: Vec<Vec<Vec<u32>>> = nodes
            .iter()
            .map(|n| n.layers.iter().map(|l| l.read().clone()).collect())
            .collect();
        let snapshot = HnswSnapshot {
            dim: self.dim,
            metric: self.metric,
            m: self.m,
            ef_construction: self.ef_construction,
            entry_point: self.entry_point.load(Ordering::Acquire),
            max_layer: self.max_layer.load(Ordering::Acquire),
            vectors: self.vectors.read().clone(),
            layers,
            labels: self.labels.read().clone(),
            deleted: {
                let mut buf = Vec::new();
                self.deleted.read().serialize_into(&mut buf).map_err(|e| IndexError::Codec(e.to_string()))?;
                buf
            },
        };
        let bytes = bincode::serialize(&snapshot).map_err(|e| IndexError::Codec(e.to_string()))?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = fs::read(path)?;
        let snapshot: HnswSnapshot = bincode::deserialize(&bytes).map_err(|e| IndexError::Codec(e.to_string()))?;
        let nodes: Vec<Node> = snapshot
            .layers
            .into_iter()
            .map(|layers| Node { layers: layers.into_iter().map(RwLock::new).collect() })
            .collect();
        let label_to_internal = DashMap::new();
        for (internal_id, &label) in snapshot.labels.iter().enumerate() {
            label_to_internal.insert(label, internal_id as NodeId);
        }
        let deleted = RoaringBitmap::deserialize_from(&snapshot.deleted[..]).map_err(|e| IndexError::Codec(e.to_string()))?;
        let has_entry = !nodes.is_empty();
        Ok(Self {
            dim: snapshot.dim,
            metric: snapshot.metric,
            m: snapshot.m,
            ef_construction: snapshot.ef_construction,
            nodes: RwLock::new(nodes),
            vectors: RwLock::new(snapshot.vectors),
            labels: RwLock::new(snapshot.labels),
            label_to_internal,
            deleted: RwLock::new(deleted),
            entry_point: AtomicU32::new(snapshot.entry_point),
            max_layer: AtomicU32::new(snapshot.max_layer),
            has_entry: std::sync::atomic::AtomicBool::new(has_entry),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_vector_search_returns_itself() {
        let idx = HnswIndex::new(4, MetricKind::L2, 16, 100);
        idx.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        let (labels, distances) = idx.search(&[1.0, 0.0, 0.0, 0.0], 1, None, None).unwrap();
        assert_eq!(labels, vec![1]);
        assert!(distances[0].abs() < f32::EPSILON);
    }

    #[test]
    fn upsert_of_existing_label_updates_distance_without_error() {
        let idx = HnswIndex::new(2, MetricKind::L2, 16, 100);
        idx.insert(1, &[0.0, 0.0]).unwrap();
        idx.insert(1, &[10.0, 10.0]).unwrap();
        assert_eq!(idx.len(), 1);
        let (labels, distances) = idx.search(&[10.0, 10.0], 1, None, None).unwrap();
        assert_eq!(labels, vec![1]);
        assert!(distances[0].abs() < f32::EPSILON);
    }

    #[test]
    fn filtered_search_excludes_nodes_not_in_bitmap() {
        let idx = HnswIndex::new(2, MetricKind::L2, 16, 100);
        for i in 0..20u64 {
            idx.insert(i, &[i as f32, 0.0]).unwrap();
        }
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert(0);
        let (labels, _) = idx.search(&[0.0, 0.0], 5, Some(64), Some(&bitmap)).unwrap();
        assert_eq!(labels, vec![0]);
    }

    #[test]
    fn save_and_load_preserves_search_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.index");
        let idx = HnswIndex::new(3, MetricKind::L2, 8, 50);
        for i in 0..10u64 {
            idx.insert(i, &[i as f32, i as f32, i as f32]).unwrap();
        }
        idx.save(&path).unwrap();
        let loaded = HnswIndex::load(&path).unwrap();
        let (labels, _) = loaded.search(&[5.0, 5.0, 5.0], 1, Some(50), None).unwrap();
        assert_eq!(labels, vec![5]);
    }
}
