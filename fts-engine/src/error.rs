use thiserror::Error;

#[derive(Debug, Error)]
pub enum FtsError {
    #[error("io error opening fts index at `{path}`: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("query error: {0}")]
    Query(#[from] tantivy::query::QueryParserError),
    #[error("invalid regex pattern `{pattern}`: {source}")]
    InvalidRegex { pattern: String, source: tantivy::TantivyError },
}

impl From<FtsError> for engine_model::EngineError {
    fn from(err: FtsError) -> Self {
        engine_model::EngineError::storage(err.to_string())
    }
}
