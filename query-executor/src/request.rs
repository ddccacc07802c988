//! Query request/result shapes (spec.md §6 "Query request"/"Query result").

use std::time::Instant;

use chrono::{DateTime, Utc};
use engine_model::vector_record::CommitPayloadMeta;
use engine_model::{ChunkKind, DiffType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Semantic,
    Fts,
    Hybrid,
    Temporal,
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query_text: String,
    pub mode: QueryMode,
    pub limit: usize,
    pub min_score: f32,
    pub language: Option<String>,
    pub exclude_language: Option<String>,
    pub path_filter: Option<String>,
    pub exclude_path: Option<String>,
    pub case_sensitive: bool,
    pub fuzzy: bool,
    pub edit_distance: u8,
    pub regex: bool,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub diff_type: Option<DiffType>,
    pub author: Option<String>,
    pub chunk_type: Option<ChunkKind>,
    pub at_commit: Option<String>,
    pub deadline: Instant,
}

impl QueryRequest {
    /// A request with every optional filter unset, 10 results, a half-second
    /// deadline, semantic mode — the common case in tests and simple callers.
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            mode: QueryMode::Semantic,
            limit: 10,
            min_score: 0.0,
            language: None,
            exclude_language: None,
            path_filter: None,
            exclude_path: None,
            case_sensitive: false,
            fuzzy: false,
            edit_distance: 0,
            regex: false,
            time_range: None,
            diff_type: None,
            author: None,
            chunk_type: None,
            at_commit: None,
            deadline: Instant::now() + std::time::Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryResultPayloadMeta {
    pub language: String,
    pub kind: ChunkKind,
    pub fingerprint: String,
    pub commit_meta: Option<CommitPayloadMeta>,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub path: String,
    pub line_start: u32,
    pub line_end: u32,
    pub score: f32,
    pub snippet: String,
    pub payload_meta: QueryResultPayloadMeta,
}

#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub results: Vec<QueryResult>,
    /// Set when the caller's deadline was reached before every sub-task
    /// finished; `results` still holds whatever was ready (spec.md §4.9
    /// "Cancellation": "a partial timed out result is returned").
    pub timed_out: bool,
}
