//! Git commit metadata shared between the temporal engine and the query
//! executor's payload-hydration path.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    Added,
    Modified,
    Deleted,
    Renamed,
    Binary,
}

/// One file touched by a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    /// Present for renames only.
    pub old_path: Option<String>,
    pub diff_type: DiffType,
    /// `None` for binary and rename-only diffs (metadata-only records,
    /// spec.md §4.7 point 2).
    pub diff_text: Option<String>,
}

/// One walked commit, before chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: i64,
    pub message: String,
    pub parents: Vec<String>,
    pub diffs: Vec<FileDiff>,
}
