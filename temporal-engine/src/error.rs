use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemporalError {
    #[error("failed to open git repository at `{path}`: {source}")]
    Open { path: String, source: git2::Error },
    #[error("git plumbing error: {0}")]
    Git(#[from] git2::Error),
    #[error("branch `{0}` not found")]
    BranchNotFound(String),
}

impl From<TemporalError> for engine_model::EngineError {
    fn from(err: TemporalError) -> Self {
        match &err {
            TemporalError::Open { .. } => engine_model::EngineError::configuration(err.to_string()),
            TemporalError::BranchNotFound(_) => engine_model::EngineError::configuration(err.to_string()),
            TemporalError::Git(_) => engine_model::EngineError::storage(err.to_string()),
        }
    }
}
