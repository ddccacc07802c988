use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("vector store error: {0}")]
    Store(#[from] vector_store::StoreError),
    #[error("hnsw engine error: {0}")]
    Hnsw(#[from] hnsw_engine::HnswError),
    #[error("fts error: {0}")]
    Fts(#[from] fts_engine::FtsError),
    #[error("embedding error: {0}")]
    Embedder(#[from] embedding_dispatcher::EmbedderError),
    #[error("io error at `{path}`: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("query request named the `{0}` collection, which does not carry that mode")]
    UnsupportedMode(&'static str),
    #[error("query deadline was already in the past when the request arrived")]
    DeadlineExceeded,
}

impl From<QueryError> for engine_model::EngineError {
    fn from(err: QueryError) -> Self {
        use engine_model::EngineError;
        match err {
            QueryError::DeadlineExceeded => EngineError::query_timeout(err.to_string()),
            QueryError::Store(e) => e.into(),
            QueryError::Fts(e) => e.into(),
            QueryError::Hnsw(e) => e.into(),
            other => EngineError::storage(other.to_string()),
        }
    }
}
