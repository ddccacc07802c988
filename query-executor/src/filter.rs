//! Post-search filtering (spec.md §4.9 step 5): applied to HNSW/FTS
//! candidates after the approximate search, before final ranking, so
//! filters never narrow the underlying probe width.

use chrono::{DateTime, Utc};
use engine_model::vector_record::CommitPayloadMeta;
use engine_model::{ChunkKind, DiffType};

use crate::request::QueryRequest;

/// One candidate's filterable attributes, independent of how it was found.
pub struct Candidate<'a> {
    pub path: &'a str,
    pub language: &'a str,
    pub kind: ChunkKind,
    pub score: f32,
    pub commit_meta: Option<&'a CommitPayloadMeta>,
}

pub fn passes(candidate: &Candidate<'_>, request: &QueryRequest) -> bool {
    if candidate.score < request.min_score {
        return false;
    }
    if let Some(language) = &request.language {
        if !candidate.language.eq_ignore_ascii_case(language) {
            return false;
        }
    }
    if let Some(exclude) = &request.exclude_language {
        if candidate.language.eq_ignore_ascii_case(exclude) {
            return false;
        }
    }
    if let Some(glob) = &request.path_filter {
        if !glob_match_path(glob, candidate.path) {
            return false;
        }
    }
    if let Some(glob) = &request.exclude_path {
        if glob_match_path(glob, candidate.path) {
            return false;
        }
    }
    if let Some(chunk_type) = request.chunk_type {
        if candidate.kind != chunk_type {
            return false;
        }
    }
    if let Some(meta) = candidate.commit_meta {
        if !commit_meta_passes(meta, request) {
            return false;
        }
    } else if request.author.is_some() || request.diff_type.is_some() || request.time_range.is_some() || request.at_commit.is_some() {
        // non-temporal candidates can never satisfy a commit-only filter.
        return false;
    }
    true
}

fn commit_meta_passes(meta: &CommitPayloadMeta, request: &QueryRequest) -> bool {
    if let Some(author) = &request.author {
        if !meta.author_name.eq_ignore_ascii_case(author) && !meta.author_email.eq_ignore_ascii_case(author) {
            return false;
        }
    }
    if let Some(diff_type) = request.diff_type {
        if meta.diff_type != Some(diff_type) {
            return false;
        }
    }
    if let Some((start, end)) = request.time_range {
        let timestamp = DateTime::<Utc>::from_timestamp(meta.timestamp, 0).unwrap_or_default();
        if timestamp < start || timestamp > end {
            return false;
        }
    }
    if let Some(commit_hash) = &request.at_commit {
        if &meta.commit_hash != commit_hash {
            return false;
        }
    }
    true
}

/// A `*`/`?`/`**` glob over a forward-slash path, extending
/// `file-finder`'s single-component matcher with `**` so callers can
/// filter by directory (`src/**/*.rs`).
pub fn glob_match_path(pattern: &str, path: &str) -> bool {
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let path_parts: Vec<&str> = path.split('/').collect();
    match_parts(&pattern_parts, &path_parts)
}

fn match_parts(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(&"**") => {
            if pattern.len() == 1 {
                return true;
            }
            (0..=path.len()).any(|i| match_parts(&pattern[1..], &path[i..]))
        }
        Some(component) => match path.first() {
            Some(path_component) if glob_match_component(component, path_component) => {
                match_parts(&pattern[1..], &path[1..])
            }
            _ => false,
        },
    }
}

fn glob_match_component(pattern: &str, text: &str) -> bool {
    fn helper(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => helper(&p[1..], t) || (!t.is_empty() && helper(p, &t[1..])),
            (Some(b'?'), Some(_)) => helper(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => helper(&p[1..], &t[1..]),
            _ => false,
        }
    }
    helper(pattern.as_bytes(), text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_star_matches_any_depth() {
        assert!(glob_match_path("src/**/*.rs", "src/a/b/c.rs"));
        assert!(glob_match_path("src/**/*.rs", "src/c.rs"));
        assert!(!glob_match_path("src/**/*.rs", "tests/c.rs"));
    }

    #[test]
    fn single_star_matches_one_component() {
        assert!(glob_match_path("src/*.rs", "src/a.rs"));
        assert!(!glob_match_path("src/*.rs", "src/a/b.rs"));
    }

    fn commit_meta(hash: &str) -> CommitPayloadMeta {
        CommitPayloadMeta {
            commit_hash: hash.into(),
            author_name: "alice".into(),
            author_email: "alice@example.com".into(),
            timestamp: 0,
            parents: vec![],
            diff_type: None,
        }
    }

    #[test]
    fn at_commit_rejects_records_from_other_commits() {
        let request = QueryRequest { at_commit: Some("abc123".into()), ..QueryRequest::new("x") };
        assert!(commit_meta_passes(&commit_meta("abc123"), &request));
        assert!(!commit_meta_passes(&commit_meta("def456"), &request));
    }

    #[test]
    fn at_commit_rejects_non_temporal_candidates() {
        let request = QueryRequest { at_commit: Some("abc123".into()), ..QueryRequest::new("x") };
        let candidate = Candidate { path: "a.rs", language: "rust", kind: ChunkKind::Code, score: 1.0, commit_meta: None };
        assert!(!passes(&candidate, &request));
    }
}
