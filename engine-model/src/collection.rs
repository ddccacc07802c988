//! A named logical grouping of vector records (spec.md §3 "Collection").

use serde::{Deserialize, Serialize};

/// The engine only ever has these two collections; invariant 4 in spec.md
/// §3 forbids a query from mixing them, so the type is a closed enum rather
/// than an open `String` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Code,
    Temporal,
}

impl CollectionKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            CollectionKind::Code => "code",
            CollectionKind::Temporal => "temporal",
        }
    }
}

/// `collection_meta.json` — the schema-level record written by
/// `vector-store::finalise`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub schema_version: u32,
    pub kind: CollectionKind,
    pub embedding_model_id: String,
    pub dimension: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Set when the HNSW graph is known to need a full rebuild before the
    /// next query session (churn threshold exceeded, dimension/model
    /// changed, or an explicit clear was requested).
    pub hnsw_stale: bool,
    pub record_count: u64,
}

impl CollectionMeta {
    pub fn new(kind: CollectionKind, embedding_model_id: impl Into<String>, dimension: usize) -> Self {
        let now = chrono::Utc::now();
        Self {
            schema_version: 1,
            kind,
            embedding_model_id: embedding_model_id.into(),
            dimension,
            created_at: now,
            updated_at: now,
            hnsw_stale: true,
            record_count: 0,
        }
    }

    /// True when an existing on-disk collection can no longer be reused
    /// incrementally for the given model/dimension (spec.md §4.5 full
    /// rebuild trigger (b)).
    pub fn schema_changed(&self, embedding_model_id: &str, dimension: usize) -> bool {
        self.embedding_model_id != embedding_model_id || self.dimension != dimension
    }
}
