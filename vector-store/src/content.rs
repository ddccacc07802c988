//! 3-tier content retrieval for clean git files (spec.md §4.4):
//! (1) the current on-disk file, if its blob hash still matches; (2) the
//! git blob named by the stored hash; (3) a stale-record error.

use std::fs;
use std::path::Path;

use engine_model::Payload;

use crate::error::StoreError;

/// Abstraction over "resolve a git blob hash to its bytes", so this crate
/// doesn't have to open a `git2::Repository` itself for every hydrate call.
pub trait BlobSource: Send + Sync {
    fn resolve_blob(&self, blob_hash: &str) -> Option<Vec<u8>>;
}

/// `git2`-backed [`BlobSource`] over a single repository.
pub struct Git2BlobSource {
    repo: git2::Repository,
}

impl Git2BlobSource {
    pub fn open(project_root: &Path) -> Result<Self, StoreError> {
        let repo = git2::Repository::open(project_root)
            .map_err(|e| StoreError::Io { path: project_root.display().to_string(), source: std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()) })?;
        Ok(Self { repo })
    }
}

impl BlobSource for Git2BlobSource {
    fn resolve_blob(&self, blob_hash: &str) -> Option<Vec<u8>> {
        let oid = git2::Oid::from_str(blob_hash).ok()?;
        let blob = self.repo.find_blob(oid).ok()?;
        Some(blob.content().to_vec())
    }
}

/// The current `git hash-object` value of a working-tree file, or `None`
/// if it can't be computed (missing file, not in a repo context — this
/// function never needs a repository handle since content hashing is
/// path-independent of any particular checkout).
pub fn current_blob_hash(absolute_path: &Path) -> Option<String> {
    git2::Oid::hash_file(git2::ObjectType::Blob, absolute_path).ok().map(|oid| oid.to_string())
}

/// Reconstruct a chunk's text from its payload, following the 3-tier rule.
/// Dirty/non-git payloads already carry `text` and short-circuit tier 0.
pub fn retrieve_text(
    project_root: &Path,
    payload: &Payload,
    blob_source: &dyn BlobSource,
) -> Result<String, StoreError> {
    if let Some(text) = &payload.text {
        return Ok(text.clone());
    }

    let blob_hash = payload.git_blob_hash.as_deref().ok_or_else(|| StoreError::StaleContent {
        path: payload.path.clone(),
        reason: "payload has neither inline text nor a git blob hash".into(),
    })?;

    let absolute_path = project_root.join(&payload.path);
    if current_blob_hash(&absolute_path).as_deref() == Some(blob_hash) {
        if let Ok(bytes) = fs::read(&absolute_path) {
            if let Ok(text) = String::from_utf8(bytes) {
                return Ok(slice_chunk(&text, payload));
            }
        }
    }

    if let Some(bytes) = blob_source.resolve_blob(blob_hash) {
        if let Ok(text) = String::from_utf8(bytes) {
            return Ok(slice_chunk(&text, payload));
        }
    }

    Err(StoreError::StaleContent {
        path: payload.path.clone(),
        reason: format!("blob `{blob_hash}` not found on disk or in git history"),
    })
}

fn slice_chunk(whole_file: &str, payload: &Payload) -> String {
    let start = payload.byte_start.min(whole_file.len());
    let end = payload.byte_end.min(whole_file.len()).max(start);
    whole_file[start..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_model::ChunkKind;

    struct NeverResolves;
    impl BlobSource for NeverResolves {
        fn resolve_blob(&self, _blob_hash: &str) -> Option<Vec<u8>> {
            None
        }
    }

    fn payload(text: Option<&str>, git_blob_hash: Option<&str>) -> Payload {
        Payload {
            path: "src/a.rs".into(),
            chunk_index: 0,
            byte_start: 0,
            byte_end: 3,
            line_start: 1,
            line_end: 1,
            language: "rust".into(),
            kind: ChunkKind::Code,
            fingerprint: "fp".into(),
            git_blob_hash: git_blob_hash.map(String::from),
            text: text.map(String::from),
            commit_meta: None,
        }
    }

    #[test]
    fn tier0_returns_inline_text_without_touching_disk() {
        let p = payload(Some("abc"), None);
        let text = retrieve_text(Path::new("/nonexistent"), &p, &NeverResolves).unwrap();
        assert_eq!(text, "abc");
    }

    #[test]
    fn fails_stale_when_no_tier_resolves() {
        let p = payload(None, Some("deadbeef"));
        let err = retrieve_text(Path::new("/nonexistent"), &p, &NeverResolves).unwrap_err();
        assert!(matches!(err, StoreError::StaleContent { .. }));
    }
}
