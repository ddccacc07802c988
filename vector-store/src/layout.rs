//! On-disk layout under `<project>/.index/<collection>/` (spec.md §4.4, §6).

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use engine_model::quantize::quantize_path;
use uuid::Uuid;

use crate::error::StoreError;

pub fn collection_dir(project_root: &Path, dir_name: &str) -> PathBuf {
    project_root.join(".index").join(dir_name)
}

pub fn collection_meta_path(collection_dir: &Path) -> PathBuf {
    collection_dir.join("collection_meta.json")
}

pub fn id_index_path(collection_dir: &Path) -> PathBuf {
    collection_dir.join("id_index.bin")
}

pub fn hnsw_index_path(collection_dir: &Path) -> PathBuf {
    collection_dir.join("hnsw_index.bin")
}

/// Basename `hnsw_engine::format::write_graph`/`load_graph` dump the
/// actual HNSW graph under, inside `collection_dir` (alongside
/// `hnsw_index.bin`'s label map and bitset).
pub const HNSW_GRAPH_BASENAME: &str = "hnsw_graph";

/// Path of one vector's JSON file, relative to `collection_dir`, derived
/// deterministically from its path-quantised embedding.
pub fn vector_rel_path(id: Uuid, embedding: &[f32]) -> PathBuf {
    let segments = quantize_path(embedding);
    PathBuf::from("vectors")
        .join(&segments[0])
        .join(&segments[1])
        .join(&segments[2])
        .join(&segments[3])
        .join(format!("vector_{id}.json"))
}

/// Write-to-temp + rename, so a reader never observes a partially written
/// file (spec.md §4.4 `upsert`).
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io { path: parent.display().to_string(), source })?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let mut file = File::create(&tmp_path).map_err(|source| StoreError::Io { path: tmp_path.display().to_string(), source })?;
    file.write_all(bytes).map_err(|source| StoreError::Io { path: tmp_path.display().to_string(), source })?;
    file.sync_all().map_err(|source| StoreError::Io { path: tmp_path.display().to_string(), source })?;
    fs::rename(&tmp_path, path).map_err(|source| StoreError::Io { path: path.display().to_string(), source })?;
    Ok(())
}

/// Forward-slash normalised string form of a relative path, for storage in
/// the id index (spec.md §6: "use forward slashes").
pub fn to_forward_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
