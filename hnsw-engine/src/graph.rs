//! The actual `hnsw_rs` graph, as opposed to [`crate::snapshot::GraphSnapshot`]
//! which only tracks labels, ids, embeddings, and soft-deletes. A
//! [`QueryGraph`] is either built directly from a snapshot right after an
//! indexing pass, or loaded back read-only from what
//! [`crate::format::write_graph`] dumped (spec.md §5: "the HNSW graph is
//! loaded once per query session and shared read-only").
//!
//! `Hnsw<'a, T, D>` loaded from disk borrows from the `HnswIo` that owns
//! its backing buffers, which would make a struct holding both
//! self-referential. `Loaded` manages that by hand: `HnswIo` is
//! heap-allocated behind a raw pointer, the borrowed `Hnsw` is held in a
//! `ManuallyDrop` with its lifetime extended to `'static`, and a custom
//! `Drop` impl frees the two in the right order. This mirrors the
//! `LoadedHnsw`/`HnswInner` split other `hnsw_rs`-based vector indexes in
//! the wild use for the same reason.

use std::mem::ManuallyDrop;
use std::path::Path;

use hnsw_rs::dist::DistCosine;
use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::hnswio::HnswIo;

use crate::error::HnswError;
use crate::snapshot::GraphSnapshot;

const MAX_LAYER: usize = 16;

/// A graph ready to search: either built in memory (right after
/// `full_build`/`apply_incremental`, before it's dumped to disk) or
/// reloaded from a previous dump. Empty snapshots never reach `hnsw_rs`
/// at all — there is nothing to insert or search.
pub enum QueryGraph {
    Empty,
    Owned(Hnsw<'static, f32, DistCosine>),
    Loaded(LoadedGraph),
}

impl QueryGraph {
    /// Builds the graph from every label in the snapshot, live or
    /// soft-deleted — deletions are filtered out of results after the
    /// search, not before it's built (spec.md §4.5).
    pub fn build(snapshot: &GraphSnapshot) -> Self {
        if snapshot.embeddings.is_empty() {
            return QueryGraph::Empty;
        }
        let labels: Vec<u32> = snapshot.embeddings.keys().copied().collect();
        let hnsw =
            Hnsw::<f32, DistCosine>::new(snapshot.params.m, labels.len(), MAX_LAYER, snapshot.params.ef_construction, DistCosine {});
        for &label in &labels {
            hnsw.insert((&snapshot.embeddings[&label], label as usize));
        }
        QueryGraph::Owned(hnsw)
    }

    /// Loads a graph `Hnsw::file_dump` wrote at `dir/{basename}.hnsw.graph`
    /// and `dir/{basename}.hnsw.data`.
    pub fn load(dir: &Path, basename: &str) -> Result<Self, HnswError> {
        let io_ptr: *mut HnswIo = Box::into_raw(Box::new(HnswIo::new(dir, basename)));
        // SAFETY: `io_ptr` is freed only in `LoadedGraph::drop`, after the
        // `Hnsw` borrowing from it is dropped first, so the reference
        // `load_hnsw` hands back stays valid for as long as we keep it.
        let load_result = unsafe { &mut *io_ptr }.load_hnsw::<f32, DistCosine>();
        let hnsw = match load_result {
            Ok(hnsw) => hnsw,
            Err(source) => {
                // SAFETY: nothing has borrowed from `io_ptr` yet, safe to reclaim.
                unsafe { drop(Box::from_raw(io_ptr)) };
                return Err(HnswError::Graph { path: dir.join(basename).display().to_string(), message: source.to_string() });
            }
        };
        // SAFETY: extending the borrow to `'static` is sound only because
        // `LoadedGraph::drop` frees `io_ptr` after dropping `hnsw` first.
        let hnsw: Hnsw<'static, f32, DistCosine> = unsafe { std::mem::transmute(hnsw) };
        Ok(QueryGraph::Loaded(LoadedGraph { io_ptr, hnsw: ManuallyDrop::new(hnsw) }))
    }

    pub(crate) fn inner(&self) -> Option<&Hnsw<'static, f32, DistCosine>> {
        match self {
            QueryGraph::Empty => None,
            QueryGraph::Owned(hnsw) => Some(hnsw),
            QueryGraph::Loaded(loaded) => Some(&loaded.hnsw),
        }
    }
}

pub struct LoadedGraph {
    io_ptr: *mut HnswIo,
    hnsw: ManuallyDrop<Hnsw<'static, f32, DistCosine>>,
}

impl Drop for LoadedGraph {
    fn drop(&mut self) {
        // SAFETY: `hnsw` borrows from `*io_ptr`; it must be dropped first.
        unsafe {
            ManuallyDrop::drop(&mut self.hnsw);
            drop(Box::from_raw(self.io_ptr));
        }
    }
}

// SAFETY: `io_ptr` only ever owns file-backed buffers reached through
// this struct, never aliased elsewhere; `Hnsw`'s search path takes `&self`
// and does no interior mutation that isn't already synchronised internally.
unsafe impl Send for LoadedGraph {}
unsafe impl Sync for LoadedGraph {}
