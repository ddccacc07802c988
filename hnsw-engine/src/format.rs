//! `hnsw_index.bin`: versioned binary persistence for a [`GraphSnapshot`]
//! (spec.md §6: "format produced by the chosen HNSW serialiser,
//! versioned; includes parameters, label map, and soft-delete bitset").
//!
//! The graph itself is persisted separately, by [`write_graph`]/
//! [`load_graph`], through `hnsw_rs`'s own `file_dump`/`HnswIo` mechanism
//! (spec.md §5: "the HNSW graph is loaded once per query session and
//! shared read-only") — a query session loads the built graph back
//! instead of re-inserting every embedding on every call. This file
//! stays label-map/bitset-only so a caller that only needs the id
//! mapping (e.g. to decide whether a rebuild is due) doesn't have to pay
//! for a graph load it won't use. Header shape modelled on
//! `helix_index/format.rs`'s fixed `Header`/`Entry` layout.
//!
//! Layout (all little-endian):
//! `magic[4] | version:u32 | m:u32 | ef_construction:u32 | ef_query:u32 |
//!  churn_threshold:f32 | next_label:u32 | label_map_len:u32 |
//!  label_map_entries | bitset_len:u32 | bitset_bytes`
//! Each label map entry: `label:u32 | id:[u8; 16]`.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use uuid::Uuid;

use crate::error::HnswError;
use crate::graph::QueryGraph;
use crate::snapshot::{GraphSnapshot, HnswParams};

const MAGIC: [u8; 4] = *b"SHNS";
const VERSION: u32 = 1;

pub fn write(path: &Path, snapshot: &GraphSnapshot) -> Result<(), HnswError> {
    let mut buf = Vec::with_capacity(64 + snapshot.label_to_id.len() * 20);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&(snapshot.params.m as u32).to_le_bytes());
    buf.extend_from_slice(&(snapshot.params.ef_construction as u32).to_le_bytes());
    buf.extend_from_slice(&(snapshot.params.ef_query as u32).to_le_bytes());
    buf.extend_from_slice(&snapshot.params.churn_rebuild_threshold.to_le_bytes());
    buf.extend_from_slice(&snapshot.next_label.to_le_bytes());

    let mut entries: Vec<(u32, Uuid)> = snapshot.label_to_id.iter().map(|(&l, &id)| (l, id)).collect();
    entries.sort_by_key(|(label, _)| *label);
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (label, id) in &entries {
        buf.extend_from_slice(&label.to_le_bytes());
        buf.extend_from_slice(id.as_bytes());
    }

    let max_label = entries.last().map(|(l, _)| *l).unwrap_or(0);
    let bitset = pack_bitset(&snapshot.deleted, max_label);
    buf.extend_from_slice(&(bitset.len() as u32).to_le_bytes());
    buf.extend_from_slice(&bitset);

    let tmp_path = path.with_extension("bin.tmp");
    let mut file = File::create(&tmp_path).map_err(|source| HnswError::Io { path: tmp_path.display().to_string(), source })?;
    file.write_all(&buf).map_err(|source| HnswError::Io { path: tmp_path.display().to_string(), source })?;
    file.sync_all().map_err(|source| HnswError::Io { path: tmp_path.display().to_string(), source })?;
    fs::rename(&tmp_path, path).map_err(|source| HnswError::Io { path: path.display().to_string(), source })?;
    Ok(())
}

/// Reads the label map, soft-delete bitset, and params back, leaving
/// `embeddings` empty. Query-time callers pair this with [`load_graph`]
/// for the actual vectors; indexing-time callers that need to mutate the
/// snapshot further (incremental update) re-hydrate `embeddings` from the
/// vector store themselves.
pub fn read(path: &Path) -> Result<GraphSnapshot, HnswError> {
    let bytes = fs::read(path).map_err(|source| HnswError::Io { path: path.display().to_string(), source })?;
    parse(&bytes, path)
}

/// Dumps the built graph via `hnsw_rs`'s own serialiser to
/// `dir/{basename}.hnsw.graph` and `dir/{basename}.hnsw.data`. Called once
/// per indexing pass, after the snapshot's label map/bitset have already
/// been written with [`write`].
pub fn write_graph(dir: &Path, basename: &str, snapshot: &GraphSnapshot) -> Result<(), HnswError> {
    let graph_path = || dir.join(basename).display().to_string();
    match QueryGraph::build(snapshot).inner() {
        Some(hnsw) => {
            hnsw.file_dump(dir, basename).map_err(|source| HnswError::Graph { path: graph_path(), message: source.to_string() })?;
        }
        None => {
            // nothing live to dump; drop any stale dump from a previous build.
            let _ = fs::remove_file(dir.join(format!("{basename}.hnsw.graph")));
            let _ = fs::remove_file(dir.join(format!("{basename}.hnsw.data")));
        }
    }
    Ok(())
}

/// Loads the graph [`write_graph`] dumped, read-only, for reuse across a
/// query session. Returns [`QueryGraph::Empty`] rather than erroring when
/// no dump exists yet (a fresh project that hasn't been indexed).
pub fn load_graph(dir: &Path, basename: &str) -> Result<QueryGraph, HnswError> {
    if !dir.join(format!("{basename}.hnsw.graph")).exists() {
        return Ok(QueryGraph::Empty);
    }
    QueryGraph::load(dir, basename)
}

fn parse(bytes: &[u8], path: &Path) -> Result<GraphSnapshot, HnswError> {
    let corrupt = || HnswError::Corrupt { path: path.display().to_string() };
    let mut offset = 0usize;

    let take = |bytes: &[u8], offset: &mut usize, n: usize| -> Result<&[u8], HnswError> {
        if bytes.len() < *offset + n {
            return Err(corrupt());
        }
        let slice = &bytes[*offset..*offset + n];
        *offset += n;
        Ok(slice)
    };

    if bytes.len() < 4 || &bytes[0..4] != MAGIC.as_slice() {
        return Err(corrupt());
    }
    offset += 4;

    let version = u32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().unwrap());
    if version != VERSION {
        return Err(corrupt());
    }

    let m = u32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().unwrap()) as usize;
    let ef_construction = u32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().unwrap()) as usize;
    let ef_query = u32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().unwrap()) as usize;
    let churn_rebuild_threshold = f32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().unwrap());
    let next_label = u32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().unwrap());

    let params = HnswParams { m, ef_construction, ef_query, churn_rebuild_threshold };
    let mut snapshot = GraphSnapshot::empty(params);
    snapshot.next_label = next_label;

    let entry_count = u32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().unwrap()) as usize;
    for _ in 0..entry_count {
        let label = u32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().unwrap());
        let id_bytes = take(bytes, &mut offset, 16)?;
        let id = Uuid::from_slice(id_bytes).map_err(|_| corrupt())?;
        snapshot.label_to_id.insert(label, id);
        snapshot.id_to_label.insert(id, label);
    }

    let bitset_len = u32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().unwrap()) as usize;
    let bitset_bytes = take(bytes, &mut offset, bitset_len)?;
    snapshot.deleted = unpack_bitset(bitset_bytes);

    Ok(snapshot)
}

fn pack_bitset(deleted: &std::collections::HashSet<u32>, max_label: u32) -> Vec<u8> {
    let byte_len = (max_label as usize / 8) + 1;
    let mut bytes = vec![0u8; byte_len];
    for &label in deleted {
        let byte_index = label as usize / 8;
        let bit_index = label as usize % 8;
        if byte_index < bytes.len() {
            bytes[byte_index] |= 1 << bit_index;
        }
    }
    bytes
}

fn unpack_bitset(bytes: &[u8]) -> std::collections::HashSet<u32> {
    let mut deleted = std::collections::HashSet::new();
    for (byte_index, &byte) in bytes.iter().enumerate() {
        for bit_index in 0..8 {
            if byte & (1 << bit_index) != 0 {
                deleted.insert((byte_index * 8 + bit_index) as u32);
            }
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_label_map_and_bitset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hnsw_index.bin");

        let params = HnswParams { m: 16, ef_construction: 200, ef_query: 50, churn_rebuild_threshold: 0.3 };
        let mut snapshot = GraphSnapshot::empty(params);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        snapshot.insert(a, vec![1.0]);
        snapshot.insert(b, vec![2.0]);
        snapshot.soft_delete(a);

        write(&path, &snapshot).unwrap();
        let loaded = read(&path).unwrap();

        assert_eq!(loaded.label_to_id, snapshot.label_to_id);
        assert_eq!(loaded.deleted, snapshot.deleted);
        assert_eq!(loaded.next_label, snapshot.next_label);
        assert_eq!(loaded.params.m, 16);
        assert!(loaded.embeddings.is_empty());
    }

    #[test]
    fn rejects_wrong_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hnsw_index.bin");
        fs::write(&path, b"NOPE1234").unwrap();
        assert!(matches!(read(&path), Err(HnswError::Corrupt { .. })));
    }

    #[test]
    fn write_graph_then_load_graph_finds_the_dumped_points() {
        let dir = tempfile::tempdir().unwrap();
        let params = HnswParams { m: 16, ef_construction: 200, ef_query: 50, churn_rebuild_threshold: 0.3 };
        let mut snapshot = GraphSnapshot::empty(params);
        snapshot.insert(Uuid::new_v4(), vec![1.0, 0.0, 0.0]);
        snapshot.insert(Uuid::new_v4(), vec![0.0, 1.0, 0.0]);

        write_graph(dir.path(), "hnsw_graph", &snapshot).unwrap();
        let graph = load_graph(dir.path(), "hnsw_graph").unwrap();

        let hits = crate::search::search(&graph, &snapshot, &[1.0, 0.0, 0.0], 1);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn load_graph_without_a_prior_dump_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let graph = load_graph(dir.path(), "hnsw_graph").unwrap();
        assert!(matches!(graph, QueryGraph::Empty));
    }
}
