//! File Fingerprint Registry (spec.md §3): `path -> (mtime, size,
//! content_hash, last_indexed_chunk_ids)`, persisted between indexing
//! runs so the orchestrator can decide what to re-chunk, re-embed, or
//! delete without re-reading every file on every pass.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::OrchestratorError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileFingerprint {
    pub mtime: i64,
    pub size: u64,
    pub content_hash: String,
    pub last_indexed_chunk_ids: Vec<Uuid>,
}

/// What the orchestrator should do with a file, given its previous
/// fingerprint (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDecision {
    Skip,
    ReEmbed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileFingerprintRegistry {
    entries: HashMap<String, FileFingerprint>,
}

impl FileFingerprintRegistry {
    pub fn load(path: &Path) -> Result<Self, OrchestratorError> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| OrchestratorError::Json { path: path.display().to_string(), source }),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(OrchestratorError::Io { path: path.display().to_string(), source }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), OrchestratorError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| OrchestratorError::Io { path: parent.display().to_string(), source })?;
        }
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|source| OrchestratorError::Json { path: path.display().to_string(), source })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes).map_err(|source| OrchestratorError::Io { path: tmp.display().to_string(), source })?;
        fs::rename(&tmp, path).map_err(|source| OrchestratorError::Io { path: path.display().to_string(), source })?;
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&FileFingerprint> {
        self.entries.get(path)
    }

    pub fn record(&mut self, path: String, fingerprint: FileFingerprint) {
        self.entries.insert(path, fingerprint);
    }

    pub fn remove(&mut self, path: &str) -> Option<FileFingerprint> {
        self.entries.remove(path)
    }

    pub fn known_paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Decides whether `path` needs re-embedding, only hashing its
    /// content when `mtime`/`size` alone can't settle the question —
    /// `compute_hash` is lazy for exactly that reason.
    pub fn decide(&self, path: &str, mtime: i64, size: u64, compute_hash: impl FnOnce() -> String) -> FileDecision {
        match self.entries.get(path) {
            None => FileDecision::ReEmbed,
            Some(existing) => {
                if existing.mtime == mtime && existing.size == size {
                    return FileDecision::Skip;
                }
                if existing.content_hash == compute_hash() {
                    FileDecision::Skip
                } else {
                    FileDecision::ReEmbed
                }
            }
        }
    }
}

/// SHA-256 of a whole file's bytes, hex-encoded — the `content_hash` half
/// of a fingerprint (separate from [`engine_model::Chunk::fingerprint_of`],
/// which hashes one chunk's text rather than the whole file).
pub fn content_hash_of_file(absolute_path: &Path) -> Result<String, OrchestratorError> {
    let bytes = fs::read(absolute_path)
        .map_err(|source| OrchestratorError::Io { path: absolute_path.display().to_string(), source })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_path_is_always_re_embedded() {
        let registry = FileFingerprintRegistry::default();
        let decision = registry.decide("a.rs", 1, 10, || "hash".to_string());
        assert_eq!(decision, FileDecision::ReEmbed);
    }

    #[test]
    fn unchanged_mtime_and_size_skips_without_hashing() {
        let mut registry = FileFingerprintRegistry::default();
        registry.record("a.rs".into(), FileFingerprint { mtime: 1, size: 10, content_hash: "h".into(), last_indexed_chunk_ids: vec![] });

        let mut hashed = false;
        let decision = registry.decide("a.rs", 1, 10, || {
            hashed = true;
            "h".to_string()
        });
        assert_eq!(decision, FileDecision::Skip);
        assert!(!hashed, "decide must not hash when mtime/size already match");
    }

    #[test]
    fn changed_mtime_but_same_content_hash_skips() {
        let mut registry = FileFingerprintRegistry::default();
        registry.record("a.rs".into(), FileFingerprint { mtime: 1, size: 10, content_hash: "h".into(), last_indexed_chunk_ids: vec![] });
        let decision = registry.decide("a.rs", 2, 10, || "h".to_string());
        assert_eq!(decision, FileDecision::Skip);
    }

    #[test]
    fn changed_content_hash_triggers_re_embed() {
        let mut registry = FileFingerprintRegistry::default();
        registry.record("a.rs".into(), FileFingerprint { mtime: 1, size: 10, content_hash: "h".into(), last_indexed_chunk_ids: vec![] });
        let decision = registry.decide("a.rs", 2, 11, || "h2".to_string());
        assert_eq!(decision, FileDecision::ReEmbed);
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fingerprints.json");
        let mut registry = FileFingerprintRegistry::default();
        registry.record("a.rs".into(), FileFingerprint { mtime: 1, size: 10, content_hash: "h".into(), last_indexed_chunk_ids: vec![Uuid::nil()] });
        registry.save(&path).unwrap();

        let reloaded = FileFingerprintRegistry::load(&path).unwrap();
        assert_eq!(reloaded.get("a.rs"), registry.get("a.rs"));
    }
}
