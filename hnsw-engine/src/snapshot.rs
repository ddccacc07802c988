//! In-memory state for one collection's HNSW graph (spec.md §3 "HNSW
//! Graph", §9: "the HNSW engine ... holds only labels and embeddings").
//!
//! This is the mutable, build-time state: `full_build`/`apply_incremental`
//! add and soft-delete labels here, and [`crate::graph::QueryGraph::build`]
//! turns `embeddings` into the actual searchable `hnsw_rs` graph once,
//! right before it's dumped to disk. Query time never touches
//! `embeddings` at all — it loads the already-built graph back via
//! [`crate::format::load_graph`] and only uses this struct for the label
//! map, soft-delete bitset, and `ef_query`.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

/// Parameters fixed at construction (spec.md §3): `M=16`,
/// `ef_construction=200`, `ef_query=50`, cosine distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_query: usize,
    pub churn_rebuild_threshold: f32,
}

impl From<engine_model::config::HnswConfig> for HnswParams {
    fn from(c: engine_model::config::HnswConfig) -> Self {
        Self { m: c.m, ef_construction: c.ef_construction, ef_query: c.ef_query, churn_rebuild_threshold: c.churn_rebuild_threshold }
    }
}

/// The full state of one collection's graph: every live and soft-deleted
/// label, its vector UUID, its embedding, and the next label to hand out.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub params: HnswParams,
    pub label_to_id: HashMap<u32, Uuid>,
    pub id_to_label: HashMap<Uuid, u32>,
    pub embeddings: HashMap<u32, Vec<f32>>,
    pub deleted: HashSet<u32>,
    pub next_label: u32,
}

impl GraphSnapshot {
    pub fn empty(params: HnswParams) -> Self {
        Self {
            params,
            label_to_id: HashMap::new(),
            id_to_label: HashMap::new(),
            embeddings: HashMap::new(),
            deleted: HashSet::new(),
            next_label: 0,
        }
    }

    pub fn live_count(&self) -> usize {
        self.label_to_id.len() - self.deleted.len()
    }

    pub fn total_count(&self) -> usize {
        self.label_to_id.len()
    }

    pub fn deleted_fraction(&self) -> f32 {
        if self.label_to_id.is_empty() {
            0.0
        } else {
            self.deleted.len() as f32 / self.label_to_id.len() as f32
        }
    }

    /// True once the deleted fraction exceeds the configured churn
    /// threshold (spec.md §4.5 full-rebuild trigger (c)).
    pub fn needs_rebuild(&self) -> bool {
        self.deleted_fraction() > self.params.churn_rebuild_threshold
    }

    fn allocate_label(&mut self) -> u32 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    /// Inserts a brand-new vector, returning its freshly allocated label.
    pub fn insert(&mut self, id: Uuid, embedding: Vec<f32>) -> u32 {
        let label = self.allocate_label();
        self.label_to_id.insert(label, id);
        self.id_to_label.insert(id, label);
        self.embeddings.insert(label, embedding);
        label
    }

    /// Soft-deletes whichever label currently maps to `id`, if any
    /// (spec.md §3 "Soft delete").
    pub fn soft_delete(&mut self, id: Uuid) {
        if let Some(label) = self.id_to_label.get(&id).copied() {
            self.deleted.insert(label);
        }
    }

    pub fn is_deleted(&self, label: u32) -> bool {
        self.deleted.contains(&label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HnswParams {
        HnswParams { m: 16, ef_construction: 200, ef_query: 50, churn_rebuild_threshold: 0.3 }
    }

    #[test]
    fn insert_then_soft_delete_updates_fraction() {
        let mut snap = GraphSnapshot::empty(params());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        snap.insert(a, vec![1.0, 0.0]);
        snap.insert(b, vec![0.0, 1.0]);
        assert_eq!(snap.deleted_fraction(), 0.0);

        snap.soft_delete(a);
        assert_eq!(snap.deleted_fraction(), 0.5);
        assert!(!snap.needs_rebuild());

        snap.soft_delete(b);
        assert_eq!(snap.deleted_fraction(), 1.0);
        assert!(snap.needs_rebuild());
    }

    #[test]
    fn labels_are_allocated_sequentially() {
        let mut snap = GraphSnapshot::empty(params());
        let l0 = snap.insert(Uuid::new_v4(), vec![0.0]);
        let l1 = snap.insert(Uuid::new_v4(), vec![0.0]);
        assert_eq!(l0, 0);
        assert_eq!(l1, 1);
    }
}
