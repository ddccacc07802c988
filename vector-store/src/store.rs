//! Filesystem-backed vector store (spec.md §4.4).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use engine_model::collection::CollectionKind;
use engine_model::{CollectionMeta, Payload, VectorRecord};
use uuid::Uuid;

use crate::change_log::ChangeLog;
use crate::content::{self, BlobSource};
use crate::error::StoreError;
use crate::id_index::{self, IdIndexEntry};
use crate::layout;

struct SessionState {
    /// Known vector file locations, relative to `collection_dir`. Loaded
    /// from the on-disk id index at `open` and kept current as the writer
    /// upserts/deletes, so the writer never needs to re-read its own
    /// output to answer `hydrate`/`delete` within the same session.
    locations: HashMap<Uuid, PathBuf>,
    change_log: ChangeLog,
}

pub struct VectorStore {
    project_root: PathBuf,
    collection_dir: PathBuf,
    kind: CollectionKind,
    embedding_model_id: String,
    dimension: usize,
    session: Mutex<SessionState>,
}

impl VectorStore {
    pub fn open(
        project_root: impl Into<PathBuf>,
        kind: CollectionKind,
        embedding_model_id: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, StoreError> {
        let project_root = project_root.into();
        let collection_dir = layout::collection_dir(&project_root, kind.dir_name());
        fs::create_dir_all(collection_dir.join("vectors"))
            .map_err(|source| StoreError::Io { path: collection_dir.display().to_string(), source })?;

        let locations = match id_index::read(&layout::id_index_path(&collection_dir)) {
            Ok(entries) => entries
                .into_iter()
                .filter_map(|e| Uuid::parse_str(&e.id).ok().map(|id| (id, PathBuf::from(e.path))))
                .collect(),
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            project_root,
            collection_dir,
            kind,
            embedding_model_id: embedding_model_id.into(),
            dimension,
            session: Mutex::new(SessionState { locations, change_log: ChangeLog::default() }),
        })
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Atomically writes the vector's JSON file and records `added` or
    /// `updated` in the session change log; id-index and HNSW updates are
    /// deferred to [`Self::finalise`].
    pub fn upsert(&self, id: Uuid, embedding: Vec<f32>, payload: Payload) -> Result<(), StoreError> {
        let rel_path = layout::vector_rel_path(id, &embedding);
        let abs_path = self.collection_dir.join(&rel_path);
        let record = VectorRecord { id, embedding, payload };
        let bytes = serde_json::to_vec_pretty(&record).map_err(|source| StoreError::Json { id, source })?;
        layout::atomic_write(&abs_path, &bytes)?;

        let mut session = self.session.lock().unwrap();
        let previous = session.locations.insert(id, rel_path.clone());
        match previous {
            Some(old_rel) if old_rel != rel_path => {
                // The embedding moved the record to a different quantised
                // path; invariant 2 (spec.md §3) requires exactly one live
                // file per id, so the stale one is removed.
                let _ = fs::remove_file(self.collection_dir.join(&old_rel));
                session.change_log.updated.push(id);
            }
            Some(_) => session.change_log.updated.push(id),
            None => session.change_log.added.push(id),
        }
        Ok(())
    }

    /// Unlinks the vector file and records `deleted`. Missing files are
    /// treated as already-deleted rather than an error, since a crash
    /// between unlink and change-log append must be safely re-playable.
    pub fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut session = self.session.lock().unwrap();
        if let Some(rel_path) = session.locations.remove(&id) {
            let abs_path = self.collection_dir.join(&rel_path);
            if abs_path.exists() {
                fs::remove_file(&abs_path).map_err(|source| StoreError::Io { path: abs_path.display().to_string(), source })?;
            }
        }
        session.change_log.deleted.push(id);
        Ok(())
    }

    /// Reads one vector's JSON file. A corrupted file is isolated by
    /// renaming it to `.corrupt` and surfacing [`StoreError::Corrupted`],
    /// per spec.md §7 — the caller treats the record as missing and it is
    /// re-embedded on the next incremental pass.
    pub fn hydrate(&self, id: Uuid) -> Result<VectorRecord, StoreError> {
        let rel_path = {
            let session = self.session.lock().unwrap();
            session.locations.get(&id).cloned().ok_or(StoreError::NotFound { id })?
        };
        let abs_path = self.collection_dir.join(&rel_path);
        let bytes = fs::read(&abs_path).map_err(|source| StoreError::Io { path: abs_path.display().to_string(), source })?;
        match serde_json::from_slice::<VectorRecord>(&bytes) {
            Ok(record) => Ok(record),
            Err(_) => {
                let corrupt_path = abs_path.with_extension("json.corrupt");
                let _ = fs::rename(&abs_path, &corrupt_path);
                Err(StoreError::Corrupted { id })
            }
        }
    }

    /// Reconstructs chunk text for a hydrated record via the 3-tier rule.
    pub fn retrieve_text(&self, payload: &Payload, blob_source: &dyn BlobSource) -> Result<String, StoreError> {
        content::retrieve_text(&self.project_root, payload, blob_source)
    }

    /// Rebuilds the id index from the current on-disk set, writes
    /// `collection_meta.json`, and drains the session change log for the
    /// HNSW engine to consume. Safe to call after any batch of
    /// upserts/deletes; the collection is consistent and readable by any
    /// reader the moment this returns.
    pub fn finalise(&self) -> Result<ChangeLog, StoreError> {
        let mut session = self.session.lock().unwrap();

        let mut entries: Vec<IdIndexEntry> = session
            .locations
            .iter()
            .map(|(id, rel)| IdIndexEntry { id: id.to_string(), path: layout::to_forward_slash(rel) })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        id_index::write(&layout::id_index_path(&self.collection_dir), &entries)?;

        let mut meta = self.load_meta().unwrap_or_else(|_| {
            CollectionMeta::new(self.kind, self.embedding_model_id.clone(), self.dimension)
        });
        meta.record_count = entries.len() as u64;
        meta.updated_at = chrono::Utc::now();
        if meta.schema_changed(&self.embedding_model_id, self.dimension) {
            meta.hnsw_stale = true;
            meta.embedding_model_id = self.embedding_model_id.clone();
            meta.dimension = self.dimension;
        }
        self.write_meta(&meta)?;

        Ok(std::mem::take(&mut session.change_log))
    }

    /// Marks the collection as needing a full HNSW rebuild before the
    /// next query session (churn threshold exceeded, or an explicit
    /// clear), without otherwise touching the stored vectors.
    pub fn mark_hnsw_stale(&self) -> Result<(), StoreError> {
        let mut meta = self.load_meta()?;
        meta.hnsw_stale = true;
        self.write_meta(&meta)
    }

    pub fn clear_hnsw_stale(&self) -> Result<(), StoreError> {
        let mut meta = self.load_meta()?;
        meta.hnsw_stale = false;
        self.write_meta(&meta)
    }

    pub fn meta(&self) -> Result<CollectionMeta, StoreError> {
        self.load_meta()
    }

    /// All known ids in deterministic (sorted) order, for the HNSW
    /// engine's full-build path (spec.md §4.5: "insert in a deterministic
    /// order (by id)").
    pub fn ids_sorted(&self) -> Vec<Uuid> {
        let session = self.session.lock().unwrap();
        let mut ids: Vec<Uuid> = session.locations.keys().copied().collect();
        ids.sort();
        ids
    }

    /// A snapshot iterator of `(id, embedding)` pairs for a full HNSW
    /// build, without handing the engine a back-reference into this store
    /// (spec.md §9: "the store hands the engine a snapshot iterator").
    pub fn embedding_snapshot(&self) -> Result<Vec<(Uuid, Vec<f32>)>, StoreError> {
        self.ids_sorted()
            .into_iter()
            .map(|id| self.hydrate(id).map(|record| (id, record.embedding)))
            .collect()
    }

    fn load_meta(&self) -> Result<CollectionMeta, StoreError> {
        let path = layout::collection_meta_path(&self.collection_dir);
        let bytes = fs::read(&path).map_err(|source| StoreError::Io { path: path.display().to_string(), source })?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json { id: Uuid::nil(), source })
    }

    fn write_meta(&self, meta: &CollectionMeta) -> Result<(), StoreError> {
        let path = layout::collection_meta_path(&self.collection_dir);
        let bytes = serde_json::to_vec_pretty(meta).map_err(|source| StoreError::Json { id: Uuid::nil(), source })?;
        layout::atomic_write(&path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_model::ChunkKind;

    fn payload(path: &str) -> Payload {
        Payload {
            path: path.into(),
            chunk_index: 0,
            byte_start: 0,
            byte_end: 3,
            line_start: 1,
            line_end: 1,
            language: "rust".into(),
            kind: ChunkKind::Code,
            fingerprint: "fp".into(),
            git_blob_hash: None,
            text: Some("abc".into()),
            commit_meta: None,
        }
    }

    #[test]
    fn upsert_then_finalise_then_hydrate_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path(), CollectionKind::Code, "model-a", 4).unwrap();
        let id = Uuid::new_v4();
        store.upsert(id, vec![0.1, 0.2, 0.3, 0.4], payload("src/a.rs")).unwrap();
        let log = store.finalise().unwrap();
        assert_eq!(log.added, vec![id]);

        let record = store.hydrate(id).unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.payload.path, "src/a.rs");

        let meta = store.meta().unwrap();
        assert_eq!(meta.record_count, 1);
    }

    #[test]
    fn delete_removes_file_and_drops_from_future_reads() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path(), CollectionKind::Code, "model-a", 4).unwrap();
        let id = Uuid::new_v4();
        store.upsert(id, vec![0.1, 0.2, 0.3, 0.4], payload("src/a.rs")).unwrap();
        store.finalise().unwrap();

        store.delete(id).unwrap();
        let log = store.finalise().unwrap();
        assert_eq!(log.deleted, vec![id]);
        assert!(matches!(store.hydrate(id), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn reopening_loads_prior_session_locations_from_id_index() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        {
            let store = VectorStore::open(dir.path(), CollectionKind::Code, "model-a", 4).unwrap();
            store.upsert(id, vec![0.1, 0.2, 0.3, 0.4], payload("src/a.rs")).unwrap();
            store.finalise().unwrap();
        }
        let reopened = VectorStore::open(dir.path(), CollectionKind::Code, "model-a", 4).unwrap();
        let record = reopened.hydrate(id).unwrap();
        assert_eq!(record.payload.path, "src/a.rs");
    }

    #[test]
    fn updating_with_a_new_embedding_removes_the_stale_quantised_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path(), CollectionKind::Code, "model-a", 4).unwrap();
        let id = Uuid::new_v4();
        store.upsert(id, vec![1.0, 1.0, 1.0, 1.0], payload("src/a.rs")).unwrap();
        store.finalise().unwrap();

        store.upsert(id, vec![-1.0, -1.0, -1.0, -1.0], payload("src/a.rs")).unwrap();
        let log = store.finalise().unwrap();
        assert_eq!(log.updated, vec![id]);

        // exactly one vector file should exist for this id
        let count = walk_vector_files(&dir.path().join(".index").join("code").join("vectors"));
        assert_eq!(count, 1);
    }

    fn walk_vector_files(dir: &Path) -> usize {
        let mut count = 0;
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    count += walk_vector_files(&path);
                } else if path.extension().map(|e| e == "json").unwrap_or(false) {
                    count += 1;
                }
            }
        }
        count
    }
}
