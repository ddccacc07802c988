//! Reads a discovered file into a [`ChunkStream`], resolving the
//! project-relative path and git blob hash the rest of the pipeline needs.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::splitter::{ChunkParams, ChunkStream};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read `{path}`: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("`{path}` is not valid UTF-8")]
    NotUtf8 { path: String },
}

/// Build a chunk stream for one file.
///
/// `project_relative_path` must already be forward-slash normalised
/// (spec.md §6: "All paths stored inside JSON payloads ... are relative to
/// the project root and use forward slashes").
pub fn chunk_file(
    absolute_path: &Path,
    project_relative_path: &str,
    git_blob_hash: Option<String>,
    params: ChunkParams,
) -> Result<ChunkStream, ReadError> {
    let bytes = fs::read(absolute_path).map_err(|source| ReadError::Io {
        path: project_relative_path.to_string(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|_| ReadError::NotUtf8 {
        path: project_relative_path.to_string(),
    })?;
    Ok(ChunkStream::new(project_relative_path.to_string(), text, git_blob_hash, params))
}

/// Forward-slash-normalise a path relative to `root`, as required by
/// spec.md §6.
pub fn normalise_relative_path(root: &Path, absolute: &Path) -> String {
    let rel = absolute.strip_prefix(root).unwrap_or(absolute);
    rel.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_windows_style_separators() {
        let root = Path::new("/repo");
        let abs = Path::new("/repo/src/main.rs");
        assert_eq!(normalise_relative_path(root, abs), "src/main.rs");
    }
}
