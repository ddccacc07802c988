//! Full build and incremental update (spec.md §4.5).

use uuid::Uuid;

use crate::snapshot::{GraphSnapshot, HnswParams};

/// The session-scoped change log a `vector-store::finalise()` call hands
/// back, re-exported here so this crate doesn't depend on `vector-store`
/// just for this one shape.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub added: Vec<Uuid>,
    pub updated: Vec<Uuid>,
    pub deleted: Vec<Uuid>,
}

/// Full build: iterate every vector record in deterministic (by id) order
/// and assign sequential labels, producing a fresh soft-delete bitset
/// (spec.md §4.5 "Full build").
///
/// `records` must already be sorted by id — `vector-store::ids_sorted`/
/// `embedding_snapshot` guarantee that.
pub fn full_build(records: Vec<(Uuid, Vec<f32>)>, params: HnswParams) -> GraphSnapshot {
    let mut snapshot = GraphSnapshot::empty(params);
    for (id, embedding) in records {
        snapshot.insert(id, embedding);
    }
    snapshot
}

/// Incremental update (spec.md §4.5 "Incremental update"): for each
/// `added` id insert a new labelled node; for each `updated` id soft-delete
/// the old label and insert a fresh one; for each `deleted` id soft-delete
/// its label. Graph connectivity is never otherwise touched — that's the
/// accepted trade-off the spec names explicitly.
///
/// `fetch_embedding` resolves an id to its current embedding; it is only
/// called for `added`/`updated` ids, never for `deleted` ones.
pub fn apply_incremental<F>(snapshot: &mut GraphSnapshot, change_set: &ChangeSet, mut fetch_embedding: F)
where
    F: FnMut(Uuid) -> Option<Vec<f32>>,
{
    for &id in &change_set.added {
        if let Some(embedding) = fetch_embedding(id) {
            snapshot.insert(id, embedding);
        }
    }
    for &id in &change_set.updated {
        snapshot.soft_delete(id);
        if let Some(embedding) = fetch_embedding(id) {
            snapshot.insert(id, embedding);
        }
    }
    for &id in &change_set.deleted {
        snapshot.soft_delete(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HnswParams {
        HnswParams { m: 16, ef_construction: 200, ef_query: 50, churn_rebuild_threshold: 0.3 }
    }

    #[test]
    fn full_build_inserts_all_records_in_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let snapshot = full_build(vec![(a, vec![1.0]), (b, vec![2.0])], params());
        assert_eq!(snapshot.total_count(), 2);
        assert_eq!(snapshot.label_to_id.get(&0), Some(&a));
        assert_eq!(snapshot.label_to_id.get(&1), Some(&b));
    }

    #[test]
    fn incremental_update_handles_add_update_delete() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let mut snapshot = full_build(vec![(a, vec![1.0]), (b, vec![2.0])], params());

        let change = ChangeSet { added: vec![c], updated: vec![a], deleted: vec![b] };
        let embeddings = [(a, vec![9.0]), (c, vec![3.0])].into_iter().collect::<std::collections::HashMap<_, _>>();
        apply_incremental(&mut snapshot, &change, |id| embeddings.get(&id).cloned());

        // b is soft-deleted, not removed
        assert!(snapshot.is_deleted(snapshot.id_to_label[&b]));
        // a's old label is soft-deleted and it has a fresh one
        assert_eq!(snapshot.total_count(), 4); // original a, b, fresh a, c
        assert!(!snapshot.is_deleted(*snapshot.id_to_label.get(&a).unwrap()));
        assert!(!snapshot.is_deleted(*snapshot.id_to_label.get(&c).unwrap()));
    }
}
