//! The persisted form of an embedded chunk.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunk::ChunkKind;

/// One row in a collection: a stable id, its dense embedding, and the
/// metadata needed to hydrate a query result without re-reading the source
/// file (for dirty/non-git files) or after resolving a git blob (for clean
/// ones).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub payload: Payload,
}

/// Chunk metadata plus provenance, stored alongside the embedding.
///
/// `text` is `None` for clean git files (see invariant 3 in spec.md §3):
/// the vector store reconstructs the text on demand from the git blob named
/// by `git_blob_hash`. It is `Some` for dirty or non-git files, and for all
/// temporal-collection chunks (commit messages/diffs have no "clean on
/// disk" notion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub path: String,
    pub chunk_index: u32,
    pub byte_start: usize,
    pub byte_end: usize,
    pub line_start: u32,
    pub line_end: u32,
    pub language: String,
    pub kind: ChunkKind,
    pub fingerprint: String,
    pub git_blob_hash: Option<String>,
    pub text: Option<String>,
    /// Present only for `kind == CommitMessage | CommitDiff`.
    pub commit_meta: Option<CommitPayloadMeta>,
}

/// Denormalised commit context carried on temporal-collection payloads so
/// the query executor can apply `author`/`time_range`/`diff_type` filters
/// during hydration without a second lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitPayloadMeta {
    pub commit_hash: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: i64,
    pub parents: Vec<String>,
    pub diff_type: Option<crate::commit::DiffType>,
}

impl VectorRecord {
    pub fn is_stale_blob(&self, current_blob_hash: Option<&str>) -> bool {
        match (&self.payload.git_blob_hash, current_blob_hash) {
            (Some(stored), Some(current)) => stored != current,
            _ => false,
        }
    }
}
