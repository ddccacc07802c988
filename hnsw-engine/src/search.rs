//! Query-time search (spec.md §4.5 "Queries"): searches an already-built
//! [`QueryGraph`] and filters soft-deleted labels out of the result —
//! never out of the probe width, so recall isn't starved by churn.

use uuid::Uuid;

use crate::graph::QueryGraph;
use crate::snapshot::GraphSnapshot;

/// One ranked result: the vector's stable id and its cosine distance to
/// the query (lower is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: Uuid,
    pub distance: f32,
}

/// Top-`k` nearest neighbours of `query` among `graph`'s live
/// (non-soft-deleted) labels, per `snapshot`'s label map and bitset.
///
/// Over-fetches by a multiple of `k` before filtering deletions out, so a
/// graph with heavy recent churn still returns `k` results when enough
/// live vectors exist (spec.md §4.5: "soft-deleted labels are filtered
/// post-search").
pub fn search(graph: &QueryGraph, snapshot: &GraphSnapshot, query: &[f32], k: usize) -> Vec<Hit> {
    if k == 0 {
        return Vec::new();
    }
    let Some(hnsw) = graph.inner() else {
        return Vec::new();
    };

    let over_fetch = (k * 2).max(snapshot.params.ef_query).min(snapshot.total_count().max(1));
    let neighbours = hnsw.search(query, over_fetch, snapshot.params.ef_query);

    let mut hits = Vec::with_capacity(k);
    for neighbour in neighbours {
        let label = neighbour.d_id as u32;
        if snapshot.is_deleted(label) {
            continue;
        }
        if let Some(&id) = snapshot.label_to_id.get(&label) {
            hits.push(Hit { id, distance: neighbour.distance });
        }
        if hits.len() >= k {
            break;
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::full_build;
    use crate::snapshot::HnswParams;

    fn params() -> HnswParams {
        HnswParams { m: 16, ef_construction: 200, ef_query: 50, churn_rebuild_threshold: 0.3 }
    }

    #[test]
    fn finds_nearest_neighbour() {
        let close = Uuid::new_v4();
        let far = Uuid::new_v4();
        let snapshot = full_build(vec![(close, vec![1.0, 0.0, 0.0]), (far, vec![0.0, 0.0, 1.0])], params());
        let graph = QueryGraph::build(&snapshot);

        let hits = search(&graph, &snapshot, &[0.9, 0.1, 0.0], 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, close);
    }

    #[test]
    fn soft_deleted_labels_never_surface() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut snapshot = full_build(vec![(a, vec![1.0, 0.0]), (b, vec![0.9, 0.1])], params());
        snapshot.soft_delete(a);
        let graph = QueryGraph::build(&snapshot);

        let hits = search(&graph, &snapshot, &[1.0, 0.0], 2);
        assert!(hits.iter().all(|h| h.id != a));
    }

    #[test]
    fn empty_snapshot_returns_no_hits() {
        let snapshot = GraphSnapshot::empty(params());
        let graph = QueryGraph::build(&snapshot);
        let hits = search(&graph, &snapshot, &[1.0], 5);
        assert!(hits.is_empty());
    }
}
