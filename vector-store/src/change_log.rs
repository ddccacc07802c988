//! Session-scoped record of what an indexing session did to a collection
//! (spec.md §3 "Change Log"), consumed by the HNSW engine to decide
//! between an incremental update and a full rebuild.

use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    pub added: Vec<Uuid>,
    pub updated: Vec<Uuid>,
    pub deleted: Vec<Uuid>,
}

impl ChangeLog {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn total_writes(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }
}
