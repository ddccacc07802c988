use thiserror::Error;

#[derive(Debug, Error)]
pub enum HnswError {
    #[error("io error at `{path}`: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("hnsw file `{path}` is truncated or has an unrecognised magic/version")]
    Corrupt { path: String },
    #[error("embedding for label {label} has dimension {actual}, expected {expected}")]
    DimensionMismatch { label: u32, expected: usize, actual: usize },
    #[error("hnsw graph dump/load at `{path}` failed: {message}")]
    Graph { path: String, message: String },
}

impl From<HnswError> for engine_model::EngineError {
    fn from(err: HnswError) -> Self {
        engine_model::EngineError::storage(err.to_string())
    }
}
