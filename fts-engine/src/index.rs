//! File-by-file lexical index (spec.md §4.6): one tantivy document per
//! source file, incrementally replaced on re-index and removed on
//! deletion.

use std::path::Path;
use std::sync::Mutex;

use tantivy::directory::MmapDirectory;
use tantivy::{doc, Index, IndexReader, IndexWriter, Term};

use crate::error::FtsError;
use crate::schema::{self, FtsFields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

pub struct FtsIndex {
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    fields: FtsFields,
}

impl FtsIndex {
    /// Opens (creating if necessary) a persistent fts index under
    /// `fts_index/` (spec.md §6 layout).
    pub fn open(dir: &Path) -> Result<Self, FtsError> {
        std::fs::create_dir_all(dir).map_err(|source| FtsError::Io { path: dir.display().to_string(), source })?;
        let (schema, fields) = schema::build_schema();
        let directory = MmapDirectory::open(dir)?;
        let index = Index::open_or_create(directory, schema)?;
        schema::register_tokenizers(index.tokenizers());
        let writer = index.writer(WRITER_HEAP_BYTES)?;
        let reader = index.reader()?;
        Ok(Self { index, writer: Mutex::new(writer), reader, fields })
    }

    /// In-memory index, for tests that don't want a tempdir.
    pub fn open_ram() -> Result<Self, FtsError> {
        let (schema, fields) = schema::build_schema();
        let index = Index::create_in_ram(schema);
        schema::register_tokenizers(index.tokenizers());
        let writer = index.writer(WRITER_HEAP_BYTES)?;
        let reader = index.reader()?;
        Ok(Self { index, writer: Mutex::new(writer), reader, fields })
    }

    pub fn fields(&self) -> &FtsFields {
        &self.fields
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn reader(&self) -> &IndexReader {
        &self.reader
    }

    /// Replaces `path`'s document with fresh content. Deletion + add in
    /// the same writer transaction is the closest tantivy gets to an
    /// upsert.
    pub fn upsert_file(&self, path: &str, language: &str, text: &str) -> Result<(), FtsError> {
        let writer = self.writer.lock().unwrap();
        writer.delete_term(Term::from_field_text(self.fields.path, path));
        writer.add_document(doc!(
            self.fields.path => path,
            self.fields.language => language,
            self.fields.text_stored => text,
            self.fields.text_cf => text,
            self.fields.text_cs => text,
        ))?;
        Ok(())
    }

    pub fn delete_file(&self, path: &str) -> Result<(), FtsError> {
        let writer = self.writer.lock().unwrap();
        writer.delete_term(Term::from_field_text(self.fields.path, path));
        Ok(())
    }

    /// Commits pending writes and reloads the reader so queries observe
    /// them (spec.md §4.6: "callers that request strict consistency wait
    /// for `finalise()`").
    pub fn finalise(&self) -> Result<(), FtsError> {
        self.writer.lock().unwrap().commit()?;
        self.reader.reload()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_finalise_makes_document_searchable() {
        let idx = FtsIndex::open_ram().unwrap();
        idx.upsert_file("src/auth.py", "python", "def login(user): pass").unwrap();
        idx.finalise().unwrap();

        let searcher = idx.reader().searcher();
        assert_eq!(searcher.num_docs(), 1);
    }

    #[test]
    fn replacing_a_file_keeps_one_document() {
        let idx = FtsIndex::open_ram().unwrap();
        idx.upsert_file("a.py", "python", "version one").unwrap();
        idx.finalise().unwrap();
        idx.upsert_file("a.py", "python", "version two").unwrap();
        idx.finalise().unwrap();

        let searcher = idx.reader().searcher();
        assert_eq!(searcher.num_docs(), 1);
    }

    #[test]
    fn delete_removes_the_document() {
        let idx = FtsIndex::open_ram().unwrap();
        idx.upsert_file("a.py", "python", "hello").unwrap();
        idx.finalise().unwrap();
        idx.delete_file("a.py").unwrap();
        idx.finalise().unwrap();

        let searcher = idx.reader().searcher();
        assert_eq!(searcher.num_docs(), 0);
    }
}
