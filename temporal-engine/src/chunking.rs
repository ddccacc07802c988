//! Converts a walked [`CommitRecord`] into the `commit_message` and
//! `commit_diff` chunks the embedding dispatcher consumes (spec.md §4.7
//! point 1-2). These flow through the same dispatcher as code chunks
//! (spec.md §4.7: "the same Embedding Dispatcher as code chunks"), so the
//! output here is a plain [`Chunk`] plus the commit metadata that will
//! ride along on the resulting [`Payload`].

use chunker::language_for_path;
use engine_model::vector_record::CommitPayloadMeta;
use engine_model::{Chunk, ChunkKind, CommitRecord, DiffType};

/// A temporal [`Chunk`] paired with the commit metadata its eventual
/// `Payload` needs (spec.md §3 "Vector Record" `commit_meta`).
pub struct TemporalChunk {
    pub chunk: Chunk,
    pub kind: ChunkKind,
    pub commit_meta: CommitPayloadMeta,
}

/// Produces one `commit_message` chunk carrying the full, untruncated
/// message, and one `commit_diff` chunk per non-binary, non-rename-only
/// touched file.
pub fn commit_chunks(record: &CommitRecord) -> Vec<TemporalChunk> {
    let mut chunks = Vec::with_capacity(1 + record.diffs.len());

    let base_meta = CommitPayloadMeta {
        commit_hash: record.hash.clone(),
        author_name: record.author_name.clone(),
        author_email: record.author_email.clone(),
        timestamp: record.timestamp,
        parents: record.parents.clone(),
        diff_type: None,
    };

    chunks.push(TemporalChunk {
        chunk: Chunk {
            path: record.hash.clone(),
            chunk_index: 0,
            byte_start: 0,
            byte_end: record.message.len(),
            line_start: 1,
            line_end: record.message.lines().count().max(1) as u32,
            language: "commit_message".to_string(),
            fingerprint: Chunk::fingerprint_of(&record.message),
            git_blob_hash: None,
            text: record.message.clone(),
        },
        kind: ChunkKind::CommitMessage,
        commit_meta: base_meta.clone(),
    });

    for (idx, diff) in record.diffs.iter().enumerate() {
        // Metadata-only diffs (binary, rename-only) still get a record
        // (spec.md §4.7: "metadata-only records"), but the text is a short
        // synthetic description rather than an actual diff body, since
        // there is nothing to embed otherwise.
        let text = diff.diff_text.clone().unwrap_or_else(|| describe_metadata_only(diff.diff_type, &diff.path));

        chunks.push(TemporalChunk {
            chunk: Chunk {
                path: diff.path.clone(),
                chunk_index: idx as u32,
                byte_start: 0,
                byte_end: text.len(),
                line_start: 1,
                line_end: text.lines().count().max(1) as u32,
                language: language_for_path(&diff.path),
                fingerprint: Chunk::fingerprint_of(&text),
                git_blob_hash: None,
                text,
            },
            kind: ChunkKind::CommitDiff,
            commit_meta: CommitPayloadMeta { diff_type: Some(diff.diff_type), ..base_meta.clone() },
        });
    }

    chunks
}

fn describe_metadata_only(diff_type: DiffType, path: &str) -> String {
    match diff_type {
        DiffType::Binary => format!("binary file changed: {path}"),
        DiffType::Renamed => format!("file renamed: {path}"),
        _ => format!("{path} changed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_model::FileDiff;

    fn sample_record() -> CommitRecord {
        CommitRecord {
            hash: "abc123".into(),
            author_name: "Alice".into(),
            author_email: "alice@example.com".into(),
            timestamp: 1_700_000_000,
            message: "fix: handle empty input\n\nDetails here.".into(),
            parents: vec!["parent1".into()],
            diffs: vec![
                FileDiff { path: "src/lib.rs".into(), old_path: None, diff_type: DiffType::Modified, diff_text: Some("- old\n+ new\n".into()) },
                FileDiff { path: "assets/logo.png".into(), old_path: None, diff_type: DiffType::Binary, diff_text: None },
            ],
        }
    }

    #[test]
    fn emits_one_message_chunk_and_one_per_touched_file() {
        let record = sample_record();
        let chunks = commit_chunks(&record);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].kind, ChunkKind::CommitMessage);
        assert_eq!(chunks[0].chunk.text, record.message);
        assert_eq!(chunks[1].kind, ChunkKind::CommitDiff);
        assert_eq!(chunks[1].chunk.path, "src/lib.rs");
    }

    #[test]
    fn binary_diff_gets_metadata_only_text() {
        let record = sample_record();
        let chunks = commit_chunks(&record);
        let binary_chunk = &chunks[2];
        assert_eq!(binary_chunk.commit_meta.diff_type, Some(DiffType::Binary));
        assert!(binary_chunk.chunk.text.contains("assets/logo.png"));
    }

    #[test]
    fn commit_message_chunk_is_never_truncated() {
        let mut record = sample_record();
        record.message = "x".repeat(50_000);
        let chunks = commit_chunks(&record);
        assert_eq!(chunks[0].chunk.text.len(), 50_000);
    }
}
