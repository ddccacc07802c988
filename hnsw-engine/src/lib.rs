//! L3 — HNSW Engine: a persisted nearest-neighbour index over vectors the
//! engine hands it by label (spec.md §4.5).
//!
//! [`GraphSnapshot`] is the build-time state: labels, the label<->id map,
//! embeddings, and the soft-delete bitset (spec.md §9). [`format::write`]
//! persists the label map/bitset; [`format::write_graph`] persists the
//! actual `hnsw_rs` graph via its own `file_dump`. A query session loads
//! that graph back once with [`format::load_graph`] and [`search::search`]
//! searches it read-only (spec.md §5) instead of rebuilding it from
//! embeddings on every call.

pub mod build;
pub mod error;
pub mod format;
pub mod graph;
pub mod search;
pub mod snapshot;

pub use build::{apply_incremental, full_build, ChangeSet};
pub use error::HnswError;
pub use graph::QueryGraph;
pub use search::{search, Hit};
pub use snapshot::{GraphSnapshot, HnswParams};
