//! Query modes exposed by the fts engine (spec.md §4.6): exact token
//! match, fuzzy match, and token-level regex. Hybrid (FTS + semantic) is
//! composed one layer up, in `query-executor`.

use tantivy::collector::TopDocs;
use tantivy::query::{FuzzyTermQuery, Query, RegexQuery, TermQuery};
use tantivy::schema::{IndexRecordOption, OwnedValue};
use tantivy::{TantivyDocument, Term};

use crate::error::FtsError;
use crate::index::FtsIndex;

#[derive(Debug, Clone)]
pub struct TextHit {
    pub path: String,
    pub language: String,
    pub text: String,
    pub score: f32,
}

/// Exact token match, case-sensitive or case-folded depending on `fields`
/// chosen (spec.md §4.6 "Exact token match with optional case
/// sensitivity").
pub fn exact(index: &FtsIndex, token: &str, case_sensitive: bool, limit: usize) -> Result<Vec<TextHit>, FtsError> {
    let fields = index.fields();
    let (field, term_text) = if case_sensitive {
        (fields.text_cs, token.to_string())
    } else {
        (fields.text_cf, token.to_ascii_lowercase())
    };
    let term = Term::from_field_text(field, &term_text);
    let query = TermQuery::new(term, IndexRecordOption::WithFreqsAndPositions);
    run(index, &query, limit)
}

/// Fuzzy match with a caller-supplied edit distance (spec.md §4.6 "Fuzzy
/// match with configurable edit distance 0-3").
pub fn fuzzy(index: &FtsIndex, token: &str, edit_distance: u8, limit: usize) -> Result<Vec<TextHit>, FtsError> {
    let edit_distance = edit_distance.min(3);
    let term = Term::from_field_text(index.fields().text_cf, &token.to_ascii_lowercase());
    let query = FuzzyTermQuery::new(term, edit_distance, true);
    run(index, &query, limit)
}

/// Token-level regex: the pattern is matched against individual indexed
/// tokens, never whole lines (spec.md §4.6's "bright-line constraint" —
/// `def\s+\w+` never matches; `def`, `test_.*`, `TODO` do, because
/// tantivy's `RegexQuery` runs over the term dictionary, which only ever
/// holds post-tokenization terms).
pub fn token_regex(index: &FtsIndex, pattern: &str, case_sensitive: bool, limit: usize) -> Result<Vec<TextHit>, FtsError> {
    let field = if case_sensitive { index.fields().text_cs } else { index.fields().text_cf };
    let query = RegexQuery::from_pattern(pattern, field)
        .map_err(|source| FtsError::InvalidRegex { pattern: pattern.to_string(), source })?;
    run(index, &query, limit)
}

fn run(index: &FtsIndex, query: &dyn Query, limit: usize) -> Result<Vec<TextHit>, FtsError> {
    let searcher = index.reader().searcher();
    let top_docs = searcher.search(query, &TopDocs::with_limit(limit))?;
    let fields = index.fields();

    let mut hits = Vec::with_capacity(top_docs.len());
    for (score, address) in top_docs {
        let doc: TantivyDocument = searcher.doc(address)?;
        let path = field_text(&doc, fields.path);
        let language = field_text(&doc, fields.language);
        let text = field_text(&doc, fields.text_stored);
        hits.push(TextHit { path, language, text, score });
    }
    Ok(hits)
}

fn field_text(doc: &TantivyDocument, field: tantivy::schema::Field) -> String {
    doc.get_first(field)
        .and_then(|v| if let OwnedValue::Str(s) = v { Some(s.clone()) } else { None })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> FtsIndex {
        let idx = FtsIndex::open_ram().unwrap();
        idx.upsert_file("src/auth.py", "python", "def login(user): pass # TODO harden this").unwrap();
        idx.upsert_file("src/math.py", "python", "def add(a, b): return a + b").unwrap();
        idx.finalise().unwrap();
        idx
    }

    #[test]
    fn exact_match_finds_the_token() {
        let idx = sample_index();
        let hits = exact(&idx, "login", false, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "src/auth.py");
    }

    #[test]
    fn token_regex_matches_def_but_not_multi_token_pattern() {
        let idx = sample_index();
        let defs = token_regex(&idx, "def", false, 10).unwrap();
        assert_eq!(defs.len(), 2);

        // "def login" spans two tokens; a regex over the term dictionary
        // can never match it, since each candidate term is one token.
        let multi = token_regex(&idx, "def login", false, 10).unwrap();
        assert!(multi.is_empty());
    }

    #[test]
    fn todo_regex_matches_uppercase_marker() {
        let idx = sample_index();
        let hits = token_regex(&idx, "TODO", true, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "src/auth.py");
    }

    #[test]
    fn fuzzy_match_tolerates_typo() {
        let idx = sample_index();
        let hits = fuzzy(&idx, "logn", 1, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "src/auth.py");
    }
}
