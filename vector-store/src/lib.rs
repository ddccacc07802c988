//! L3 — filesystem-backed vector store: path-quantised vector files, a
//! binary id index, and the 3-tier content-retrieval rule for clean git
//! files (spec.md §4.4).

pub mod change_log;
pub mod content;
pub mod error;
pub mod id_index;
pub mod layout;
pub mod store;

pub use change_log::ChangeLog;
pub use content::{BlobSource, Git2BlobSource};
pub use error::StoreError;
pub use id_index::IdIndexEntry;
pub use store::VectorStore;
