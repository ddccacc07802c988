//! L3 — Temporal Engine: walks git history and produces the chunks that
//! feed the temporal collection (spec.md §4.7).

mod chunking;
mod diff;
mod error;
mod walker;

pub use chunking::{commit_chunks, TemporalChunk};
pub use error::TemporalError;
pub use walker::{BranchSelector, TemporalWalker, WalkOptions};
