use thiserror::Error;

use crate::lock::LockError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("io error at `{path}`: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("json codec error reading `{path}`: {source}")]
    Json { path: String, source: serde_json::Error },
    #[error("file discovery error: {0}")]
    Finder(#[from] file_finder::FinderError),
    #[error("chunk read error: {0}")]
    Read(#[from] chunker::ReadError),
    #[error("vector store error: {0}")]
    Store(#[from] vector_store::StoreError),
    #[error("fts error: {0}")]
    Fts(#[from] fts_engine::FtsError),
    #[error("temporal walk error: {0}")]
    Temporal(#[from] temporal_engine::TemporalError),
    #[error("hnsw engine error: {0}")]
    Hnsw(#[from] hnsw_engine::HnswError),
    #[error("writer lock unavailable: {0}")]
    Lock(#[from] LockError),
    #[error("file watch error: {0}")]
    Watch(String),
    #[error("indexing was cancelled")]
    Cancelled,
}

impl From<std::io::Error> for OrchestratorError {
    fn from(source: std::io::Error) -> Self {
        OrchestratorError::Io { path: String::new(), source }
    }
}

impl From<OrchestratorError> for engine_model::EngineError {
    fn from(err: OrchestratorError) -> Self {
        use engine_model::EngineError;
        match err {
            OrchestratorError::Cancelled => EngineError::cancelled(),
            OrchestratorError::Store(e) => e.into(),
            OrchestratorError::Fts(e) => e.into(),
            OrchestratorError::Temporal(e) => e.into(),
            OrchestratorError::Lock(e) => e.into(),
            other => EngineError::storage(other.to_string()),
        }
    }
}
