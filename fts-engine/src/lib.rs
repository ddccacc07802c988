//! L3 — lexical (full-text) index, backed by tantivy. One document per
//! source file; exact / fuzzy / token-regex query modes (spec.md §4.6).

mod error;
mod index;
mod query;
mod schema;

pub use error::FtsError;
pub use index::FtsIndex;
pub use query::{exact, fuzzy, token_regex, TextHit};
pub use schema::{FtsFields, CASE_SENSITIVE_TOKENIZER};
