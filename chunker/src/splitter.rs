//! L1: model-aware fixed-size splitting (spec.md §4.2).
//!
//! No AST, no tree-sitter, no semantic boundaries — successive chunks
//! start at `k * (C - round(C * f))` for `k = 0, 1, ...` until the file is
//! consumed. The overlap is produced by the arithmetic alone; chunks are
//! never rewritten into each other.

use engine_model::Chunk;

use crate::language::language_for_path;

#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    /// `C`: the chunk size in bytes, selected from the model's entry in
    /// `ChunkingConfig` (or the table default) before construction.
    pub chunk_size_bytes: usize,
    /// `f`: the overlap fraction, 0.15 per spec.md §4.2.
    pub overlap_fraction: f32,
}

impl ChunkParams {
    fn step(&self) -> usize {
        let overlap = (self.chunk_size_bytes as f32 * self.overlap_fraction).round() as usize;
        // Guard against a pathological config producing a zero or negative
        // step, which would never terminate the walk below.
        self.chunk_size_bytes.saturating_sub(overlap).max(1)
    }
}

/// Precomputed byte-offset -> 1-based line-number lookup, built once per
/// file so each chunk's line range is an O(log n) binary search rather
/// than a rescan.
struct LineIndex {
    /// Byte offset immediately after each `\n` in the source (i.e. the
    /// byte offset where the next line begins).
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn build(text: &str) -> Self {
        let mut line_starts = vec![0usize];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    fn line_at(&self, byte_offset: usize) -> u32 {
        match self.line_starts.binary_search(&byte_offset) {
            Ok(idx) => idx as u32 + 1,
            Err(idx) => idx as u32,
        }
    }
}

/// A finite, single-pass, non-restartable sequence of chunks over one
/// file's text (spec.md §9: "Lazy sequences ... are finite, single-pass,
/// and non-restartable").
pub struct ChunkStream {
    text: String,
    path: String,
    language: String,
    git_blob_hash: Option<String>,
    params: ChunkParams,
    line_index: LineIndex,
    next_start: usize,
    chunk_index: u32,
    done: bool,
}

impl ChunkStream {
    pub fn new(path: impl Into<String>, text: String, git_blob_hash: Option<String>, params: ChunkParams) -> Self {
        let path = path.into();
        let language = language_for_path(&path);
        let line_index = LineIndex::build(&text);
        let done = text.is_empty();
        Self { text, path, language, git_blob_hash, params, line_index, next_start: 0, chunk_index: 0, done }
    }
}

impl Iterator for ChunkStream {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let len = self.text.len();
        let start = self.next_start;
        let raw_end = start.saturating_add(self.params.chunk_size_bytes).min(len);
        let end = floor_char_boundary(&self.text, raw_end);
        let start = floor_char_boundary(&self.text, start.min(end));

        if end >= len {
            self.done = true;
        } else {
            self.next_start += self.params.step();
        }

        let text = self.text[start..end].to_string();
        let fingerprint = Chunk::fingerprint_of(&text);
        let chunk = Chunk {
            path: self.path.clone(),
            chunk_index: self.chunk_index,
            byte_start: start,
            byte_end: end,
            line_start: self.line_index.line_at(start),
            line_end: self.line_index.line_at(end.saturating_sub(1).max(start)),
            language: self.language.clone(),
            fingerprint,
            git_blob_hash: self.git_blob_hash.clone(),
            text,
        };
        self.chunk_index += 1;
        Some(chunk)
    }
}

/// Back off to the nearest preceding UTF-8 character boundary so we never
/// split a multi-byte codepoint across two chunks.
fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: usize) -> ChunkParams {
        ChunkParams { chunk_size_bytes: size, overlap_fraction: 0.15 }
    }

    #[test]
    fn empty_file_produces_zero_chunks() {
        let chunks: Vec<_> = ChunkStream::new("a.rs", String::new(), None, params(100)).collect();
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_file_produces_one_chunk_spanning_whole_file() {
        let text = "fn main() {}".to_string();
        let chunks: Vec<_> = ChunkStream::new("a.rs", text.clone(), None, params(1000)).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].byte_start, 0);
        assert_eq!(chunks[0].byte_end, text.len());
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn chunk_round_trip_reproduces_original_file() {
        let text: String = (0..500).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        let p = params(100);
        let chunks: Vec<_> = ChunkStream::new("a.rs", text.clone(), None, p).collect();

        // Concatenating with overlap removed reproduces the file exactly.
        let mut reconstructed = String::new();
        let mut cursor = 0usize;
        for chunk in &chunks {
            if chunk.byte_start < cursor {
                reconstructed.push_str(&chunk.text[(cursor - chunk.byte_start)..]);
            } else {
                reconstructed.push_str(&chunk.text);
            }
            cursor = chunk.byte_end;
        }
        assert_eq!(reconstructed, text);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text: String = "x".repeat(777);
        let p = params(128);
        let a: Vec<_> = ChunkStream::new("a.rs", text.clone(), None, p).map(|c| (c.byte_start, c.byte_end)).collect();
        let b: Vec<_> = ChunkStream::new("a.rs", text, None, p).map(|c| (c.byte_start, c.byte_end)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn chunks_overlap_by_arithmetic_only() {
        let text = "x".repeat(1000);
        let p = params(200);
        let chunks: Vec<_> = ChunkStream::new("a.rs", text, None, p).collect();
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(pair[1].byte_start < pair[0].byte_end, "expected overlap between consecutive chunks");
            assert!(pair[1].byte_start > pair[0].byte_start, "expected forward progress");
        }
    }

    #[test]
    fn never_splits_utf8_codepoints() {
        let text = "héllo wörld ".repeat(50);
        let p = params(37);
        for chunk in ChunkStream::new("a.rs", text, None, p) {
            assert!(std::str::from_utf8(chunk.text.as_bytes()).is_ok());
        }
    }

    #[test]
    fn line_offsets_match_chunk_boundaries() {
        let text = "line1\nline2\nline3\n".to_string();
        let p = ChunkParams { chunk_size_bytes: 6, overlap_fraction: 0.0 };
        let chunks: Vec<_> = ChunkStream::new("a.rs", text, None, p).collect();
        assert_eq!(chunks[0].line_start, 1);
        assert!(chunks.last().unwrap().line_end >= 1);
    }
}
