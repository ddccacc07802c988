use thiserror::Error;
use uuid::Uuid;

use crate::id_index::IdIndexError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at `{path}`: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("json codec error for record `{id}`: {source}")]
    Json { id: Uuid, source: serde_json::Error },
    #[error("id index error: {0}")]
    IdIndex(#[from] IdIndexError),
    #[error("no vector record known for id `{id}` in this session")]
    NotFound { id: Uuid },
    #[error("vector file for `{id}` is corrupted; isolated to a `.corrupt` file")]
    Corrupted { id: Uuid },
    #[error("content for `{path}` could not be retrieved by any tier: {reason}")]
    StaleContent { path: String, reason: String },
}

impl From<std::io::Error> for StoreError {
    fn from(source: std::io::Error) -> Self {
        StoreError::Io { path: String::new(), source }
    }
}

impl From<StoreError> for engine_model::EngineError {
    fn from(err: StoreError) -> Self {
        use engine_model::EngineError;
        match err {
            StoreError::StaleContent { path, reason } => {
                EngineError::stale_record(format!("{path}: {reason}"))
            }
            StoreError::Corrupted { id } => {
                EngineError::storage(format!("vector record `{id}` corrupted")).with_hint(
                    "the file was renamed to `.corrupt`; the next incremental pass will re-embed it",
                )
            }
            other => EngineError::storage(other.to_string()),
        }
    }
}
