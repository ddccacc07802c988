//! Shared types used across every layer of the indexing and query engine.
//!
//! Nothing in this crate touches disk or the network: it is the data model
//! the rest of the workspace is built from, plus the structured error type
//! components use once an operation crosses a crate boundary.

pub mod chunk;
pub mod collection;
pub mod commit;
pub mod config;
pub mod error;
pub mod quantize;
pub mod vector_record;

pub use chunk::{Chunk, ChunkKind};
pub use collection::{CollectionKind, CollectionMeta};
pub use commit::{CommitRecord, DiffType, FileDiff};
pub use config::EngineConfig;
pub use error::{EngineError, ErrorKind};
pub use vector_record::{Payload, VectorRecord};
