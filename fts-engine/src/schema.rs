//! FTS schema: one document per file (spec.md §4.6), with a case-folded
//! tokenized field for the default/fuzzy/regex modes and a case-sensitive
//! raw-token field for `case_sensitive` queries.

use tantivy::schema::{Field, Schema, STORED, STRING, TEXT};
use tantivy::tokenizer::{SimpleTokenizer, TextAnalyzer, TokenizerManager};

pub const CASE_SENSITIVE_TOKENIZER: &str = "code_cs";

#[derive(Debug, Clone, Copy)]
pub struct FtsFields {
    pub path: Field,
    pub language: Field,
    pub text_stored: Field,
    pub text_cf: Field,
    pub text_cs: Field,
}

pub fn build_schema() -> (Schema, FtsFields) {
    let mut builder = Schema::builder();
    let path = builder.add_text_field("path", STRING | STORED);
    let language = builder.add_text_field("language", STRING | STORED);
    let text_stored = builder.add_text_field("text", STORED);
    let text_cf = builder.add_text_field("text_cf", TEXT);

    let cs_indexing = tantivy::schema::TextFieldIndexing::default()
        .set_tokenizer(CASE_SENSITIVE_TOKENIZER)
        .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions);
    let cs_options = tantivy::schema::TextOptions::default().set_indexing_options(cs_indexing);
    let text_cs = builder.add_text_field("text_cs", cs_options);

    let schema = builder.build();
    (schema, FtsFields { path, language, text_stored, text_cf, text_cs })
}

/// Registers the case-sensitive tokenizer (plain whitespace/punctuation
/// splitting, no lower-casing filter) on an index's tokenizer manager.
/// `text_cf` uses tantivy's built-in `"default"` tokenizer, which already
/// lower-cases.
pub fn register_tokenizers(manager: &TokenizerManager) {
    manager.register(CASE_SENSITIVE_TOKENIZER, TextAnalyzer::builder(SimpleTokenizer::default()).build());
}
