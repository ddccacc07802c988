//! The unit of embedding: a contiguous byte range of a source file.

use serde::{Deserialize, Serialize};

/// A fixed-width, possibly overlapping slice of a source file, tagged with
/// enough metadata to re-embed or re-hydrate it later without re-reading the
/// whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Project-root-relative path, forward-slash normalised.
    pub path: String,
    /// Zero-based index of this chunk within its file.
    pub chunk_index: u32,
    pub byte_start: usize,
    pub byte_end: usize,
    pub line_start: u32,
    pub line_end: u32,
    /// Language tag derived from the file extension (`"rust"`, `"python"`, ...).
    pub language: String,
    /// SHA-256 of `text`'s bytes, hex-encoded.
    pub fingerprint: String,
    /// `git hash-object` of the whole source file, when the file is
    /// git-tracked and has no working-tree modifications.
    pub git_blob_hash: Option<String>,
    /// Raw chunk text. Present during indexing; dropped once the chunk has
    /// been embedded and the resulting [`crate::VectorRecord`] persisted,
    /// since clean git files reconstruct it on demand (3-tier retrieval,
    /// see `vector-store`).
    #[serde(skip)]
    pub text: String,
}

/// What kind of source chunk a vector record was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Code,
    CommitMessage,
    CommitDiff,
}

impl Chunk {
    pub fn fingerprint_of(text: &str) -> String {
        use sha2_hash::sha256_hex;
        sha256_hex(text.as_bytes())
    }
}

/// Thin wrapper so `engine-model` doesn't have to pull in `sha2` just for one
/// helper; the real hashing lives here so every crate computing a chunk
/// fingerprint agrees on the algorithm.
mod sha2_hash {
    pub fn sha256_hex(bytes: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = Chunk::fingerprint_of("fn main() {}");
        let b = Chunk::fingerprint_of("fn main() {}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_differs_on_content_change() {
        let a = Chunk::fingerprint_of("fn main() {}");
        let b = Chunk::fingerprint_of("fn main() { }");
        assert_ne!(a, b);
    }
}
