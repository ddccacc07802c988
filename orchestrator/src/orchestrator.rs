//! L4 — Indexing Orchestrator (spec.md §4.8): decides skip/re-embed/delete
//! per file, drives the full/incremental/reconcile/watch indexing modes,
//! and wires the File Finder, Chunker, Embedding Dispatcher, Vector Store,
//! HNSW Engine, FTS Engine, and Temporal Engine together into one indexing
//! session.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use chunker::{chunk_file, language_for_path, normalise_relative_path, ChunkParams};
use embedding_dispatcher::{dispatch, Embedder};
use engine_model::collection::CollectionKind;
use engine_model::config::EngineConfig;
use engine_model::vector_record::CommitPayloadMeta;
use engine_model::{Chunk, ChunkKind, CommitRecord, Payload};
use file_finder::{FileFinder, FinderOptions};
use fts_engine::FtsIndex;
use hnsw_engine::{ChangeSet as HnswChangeSet, GraphSnapshot, HnswParams};
use temporal_engine::{commit_chunks, BranchSelector, TemporalWalker, WalkOptions};
use vector_store::VectorStore;

use crate::error::OrchestratorError;
use crate::fingerprint::{content_hash_of_file, FileDecision, FileFingerprint, FileFingerprintRegistry};
use crate::lock::WriterLock;
use crate::watch::FileWatcher;

/// Which indexing path to run (spec.md §6 "Indexing request" `mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Re-embed every discovered file regardless of its fingerprint.
    Full,
    /// Re-embed only files whose fingerprint has changed since last run.
    Incremental,
    /// Full walk with mandatory deletion detection and a content-hash
    /// comparison on every file, for drift introduced outside a normal
    /// indexing session (branch switches, external edits).
    Reconcile,
    /// Long-running: watches the filesystem and re-indexes on debounced
    /// change, until cancelled.
    Watch,
}

/// spec.md §6 "Indexing request": what to index and how.
#[derive(Debug, Clone)]
pub struct IndexingRequest {
    pub mode: IndexMode,
    /// Wipe the targeted collection(s) before indexing.
    pub clear: bool,
    /// Force a deletion sweep even outside `Reconcile` mode.
    pub detect_deletions: bool,
    pub include_commits: bool,
    pub branch_selector: BranchSelector,
    pub max_commits: Option<usize>,
    pub since_date: Option<DateTime<Utc>>,
}

impl Default for IndexingRequest {
    fn default() -> Self {
        Self {
            mode: IndexMode::Incremental,
            clear: false,
            detect_deletions: false,
            include_commits: false,
            branch_selector: BranchSelector::default(),
            max_commits: None,
            since_date: None,
        }
    }
}

/// Cooperative cancellation, checked between files and between dispatcher
/// batches (spec.md §5: "an in-flight operation can be cancelled, and the
/// engine returns to a consistent, query-able state").
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn as_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexingReport {
    pub files_embedded: usize,
    pub files_skipped: usize,
    pub files_deleted: usize,
    pub chunks_embedded: usize,
    pub chunks_failed: usize,
    pub commits_indexed: usize,
    pub cancelled: bool,
}

/// Owns one project's indexing session state: the code and temporal vector
/// stores, the fts index, the file fingerprint registry, and (when the
/// project is a git repository) a handle used to decide which files are
/// "clean" for the 3-tier content-retrieval rule.
pub struct IndexingOrchestrator {
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
    code_store: VectorStore,
    temporal_store: VectorStore,
    fts: FtsIndex,
    registry: Mutex<FileFingerprintRegistry>,
    repo: Option<git2::Repository>,
}

impl IndexingOrchestrator {
    pub fn open(config: EngineConfig, embedder: Arc<dyn Embedder>) -> Result<Self, OrchestratorError> {
        let code_store = VectorStore::open(&config.project_root, CollectionKind::Code, &config.embedding_model_id, config.embedding_dimension)?;
        let temporal_store = VectorStore::open(&config.project_root, CollectionKind::Temporal, &config.embedding_model_id, config.embedding_dimension)?;
        let fts = FtsIndex::open(&config.fts_dir())?;
        let registry = FileFingerprintRegistry::load(&config.fingerprints_path())?;
        let repo = git2::Repository::open(&config.project_root).ok();

        Ok(Self {
            config,
            embedder,
            code_store,
            temporal_store,
            fts,
            registry: Mutex::new(registry),
            repo,
        })
    }

    /// Runs one indexing session under the per-project writer lock
    /// (spec.md §5: "one writer per collection at a time"). `Watch` blocks
    /// until `cancel` is triggered.
    pub fn run(&self, request: IndexingRequest, cancel: &CancellationToken) -> Result<IndexingReport, OrchestratorError> {
        let _lock = WriterLock::acquire(&self.config.project_root, &self.config.lock)?;
        if request.mode == IndexMode::Watch {
            self.watch(cancel)?;
            return Ok(IndexingReport::default());
        }
        self.index_files(&request, cancel)
    }

    fn index_files(&self, request: &IndexingRequest, cancel: &CancellationToken) -> Result<IndexingReport, OrchestratorError> {
        let mut report = IndexingReport::default();
        let finder = FileFinder::new(
            &self.config.project_root,
            FinderOptions { max_file_size_bytes: self.config.max_file_size_bytes, ..Default::default() },
        );
        let discovery = finder.discover()?;

        let mut registry = self.registry.lock().unwrap();

        if request.clear {
            let known: Vec<String> = registry.known_paths().cloned().collect();
            for path in known {
                self.remove_file(&mut registry, &path)?;
            }
            self.code_store.mark_hnsw_stale()?;
        }

        let mut seen = HashSet::new();
        for abs_path in &discovery.files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let rel = normalise_relative_path(&self.config.project_root, abs_path);
            seen.insert(rel.clone());

            let metadata = std::fs::metadata(abs_path).map_err(|source| OrchestratorError::Io { path: rel.clone(), source })?;
            let mtime = mtime_secs(&metadata);
            let size = metadata.len();

            let decision = self.decide(request.mode, &registry, &rel, mtime, size, abs_path);
            if decision == FileDecision::Skip {
                report.files_skipped += 1;
                continue;
            }

            let (embedded, failed) = self.embed_and_store_file(&mut registry, abs_path, &rel, cancel)?;
            report.chunks_embedded += embedded;
            report.chunks_failed += failed;
            report.files_embedded += 1;
        }

        let sweep_deletions = request.detect_deletions || request.mode == IndexMode::Full || request.mode == IndexMode::Reconcile;
        if sweep_deletions {
            let known: Vec<String> = registry.known_paths().cloned().collect();
            for path in known {
                if !seen.contains(&path) {
                    self.remove_file(&mut registry, &path)?;
                    report.files_deleted += 1;
                }
            }
        }

        registry.save(&self.config.fingerprints_path())?;
        drop(registry);

        self.finalize_collection(&self.code_store, request.mode == IndexMode::Full)?;
        self.fts.finalise()?;

        if request.include_commits {
            report.commits_indexed = self.index_commits(request, cancel)?;
        }

        Ok(report)
    }

    fn decide(&self, mode: IndexMode, registry: &FileFingerprintRegistry, rel: &str, mtime: i64, size: u64, abs_path: &Path) -> FileDecision {
        match mode {
            IndexMode::Full => FileDecision::ReEmbed,
            IndexMode::Incremental => registry.decide(rel, mtime, size, || content_hash_of_file(abs_path).unwrap_or_default()),
            IndexMode::Reconcile => {
                let hash = content_hash_of_file(abs_path).unwrap_or_default();
                match registry.get(rel) {
                    None => FileDecision::ReEmbed,
                    Some(existing) => {
                        if existing.content_hash == hash {
                            FileDecision::Skip
                        } else {
                            FileDecision::ReEmbed
                        }
                    }
                }
            }
            IndexMode::Watch => FileDecision::ReEmbed,
        }
    }

    /// Re-chunks, re-embeds, and re-persists one file: drops its previous
    /// records first (invariant 2 in spec.md §3: exactly one live vector
    /// record per chunk), then inserts fresh ones under new ids.
    fn embed_and_store_file(
        &self,
        registry: &mut FileFingerprintRegistry,
        abs_path: &Path,
        rel: &str,
        cancel: &CancellationToken,
    ) -> Result<(usize, usize), OrchestratorError> {
        if let Some(existing) = registry.get(rel).cloned() {
            for id in &existing.last_indexed_chunk_ids {
                self.code_store.delete(*id)?;
            }
        }

        let metadata = std::fs::metadata(abs_path).map_err(|source| OrchestratorError::Io { path: rel.to_string(), source })?;
        let mtime = mtime_secs(&metadata);
        let size = metadata.len();

        let git_blob_hash = self.clean_git_blob_hash(rel, abs_path);
        let chunk_size = self.config.chunking.chunk_size_for_model(&self.config.embedding_model_id);
        let params = ChunkParams { chunk_size_bytes: chunk_size, overlap_fraction: self.config.chunking.overlap_fraction };
        let chunks: Vec<Chunk> = chunk_file(abs_path, rel, git_blob_hash, params)?.collect();

        let outcome = dispatch(Arc::clone(&self.embedder), chunks, &self.config.dispatcher, cancel.as_flag());

        let mut new_ids = Vec::with_capacity(outcome.embedded.len());
        for embedded in &outcome.embedded {
            let id = Uuid::new_v4();
            let payload = payload_for(&embedded.chunk, ChunkKind::Code, None);
            self.code_store.upsert(id, embedded.embedding.clone(), payload)?;
            new_ids.push(id);
        }

        if let Ok(whole_text) = std::fs::read_to_string(abs_path) {
            self.fts.upsert_file(rel, &language_for_path(rel), &whole_text)?;
        }

        let content_hash = content_hash_of_file(abs_path)?;
        registry.record(rel.to_string(), FileFingerprint { mtime, size, content_hash, last_indexed_chunk_ids: new_ids });

        Ok((outcome.embedded.len(), outcome.failed.len()))
    }

    fn remove_file(&self, registry: &mut FileFingerprintRegistry, rel: &str) -> Result<(), OrchestratorError> {
        if let Some(existing) = registry.remove(rel) {
            for id in existing.last_indexed_chunk_ids {
                self.code_store.delete(id)?;
            }
        }
        self.fts.delete_file(rel)?;
        Ok(())
    }

    /// A file is "clean" for the 3-tier retrieval rule (spec.md §3
    /// invariant 3) when it is tracked and has no working-tree
    /// modifications against `HEAD`; only then is its blob hash stored in
    /// place of inline text.
    fn clean_git_blob_hash(&self, rel: &str, abs_path: &Path) -> Option<String> {
        let repo = self.repo.as_ref()?;
        let status = repo.status_file(Path::new(rel)).ok()?;
        if status.is_empty() {
            vector_store::content::current_blob_hash(abs_path)
        } else {
            None
        }
    }

    fn finalize_collection(&self, store: &VectorStore, force_full: bool) -> Result<(), OrchestratorError> {
        let change_log = store.finalise()?;
        let collection_dir = vector_store::layout::collection_dir(&self.config.project_root, store.kind().dir_name());
        let hnsw_path = vector_store::layout::hnsw_index_path(&collection_dir);
        let meta = store.meta()?;
        let needs_full = force_full || meta.hnsw_stale || !hnsw_path.exists();

        let mut snapshot = if needs_full {
            let records = store.embedding_snapshot()?;
            hnsw_engine::full_build(records, HnswParams::from(self.config.hnsw))
        } else {
            let mut snap = hnsw_engine::format::read(&hnsw_path)?;
            hydrate_live_embeddings(store, &mut snap)?;
            let change_set = HnswChangeSet { added: change_log.added, updated: change_log.updated, deleted: change_log.deleted };
            hnsw_engine::apply_incremental(&mut snap, &change_set, |id| store.hydrate(id).ok().map(|r| r.embedding));
            snap
        };

        if snapshot.needs_rebuild() {
            let records = store.embedding_snapshot()?;
            snapshot = hnsw_engine::full_build(records, HnswParams::from(self.config.hnsw));
        }

        hnsw_engine::format::write(&hnsw_path, &snapshot)?;
        hnsw_engine::format::write_graph(&collection_dir, vector_store::layout::HNSW_GRAPH_BASENAME, &snapshot)?;
        store.clear_hnsw_stale()?;
        Ok(())
    }

    fn index_commits(&self, request: &IndexingRequest, cancel: &CancellationToken) -> Result<usize, OrchestratorError> {
        let walker = TemporalWalker::open(&self.config.project_root)?;
        let options = WalkOptions {
            branch_selector: request.branch_selector.clone(),
            max_commits: request.max_commits,
            since_date: request.since_date,
            last_indexed_commit: self.last_indexed_commit(),
        };
        let commits: Vec<CommitRecord> = walker.walk(&options)?;

        let mut count = 0usize;
        let mut marker: Option<String> = None;

        for commit in &commits {
            if cancel.is_cancelled() {
                break;
            }

            let temporal_chunks = commit_chunks(commit);
            let mut meta_by_fingerprint: HashMap<String, (ChunkKind, CommitPayloadMeta)> = HashMap::new();
            for tc in &temporal_chunks {
                meta_by_fingerprint.insert(tc.chunk.fingerprint.clone(), (tc.kind, tc.commit_meta.clone()));
            }
            let chunks: Vec<Chunk> = temporal_chunks.into_iter().map(|tc| tc.chunk).collect();

            let outcome = dispatch(Arc::clone(&self.embedder), chunks, &self.config.dispatcher, cancel.as_flag());
            for embedded in outcome.embedded {
                let Some((kind, commit_meta)) = meta_by_fingerprint.get(&embedded.chunk.fingerprint).cloned() else { continue };
                // Deterministic id so re-walking an already-indexed commit
                // overwrites rather than duplicates its records.
                let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}:{}", commit.hash, embedded.chunk.fingerprint).as_bytes());
                let payload = payload_for(&embedded.chunk, kind, Some(commit_meta));
                self.temporal_store.upsert(id, embedded.embedding, payload)?;
            }

            if marker.is_none() {
                marker = Some(commit.hash.clone());
            }
            count += 1;
        }

        if let Some(hash) = marker {
            self.record_last_indexed_commit(&hash)?;
        }
        self.finalize_collection(&self.temporal_store, false)?;

        Ok(count)
    }

    fn last_indexed_commit_path(&self) -> PathBuf {
        vector_store::layout::collection_dir(&self.config.project_root, CollectionKind::Temporal.dir_name()).join("last_commit.txt")
    }

    fn last_indexed_commit(&self) -> Option<String> {
        std::fs::read_to_string(self.last_indexed_commit_path())
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn record_last_indexed_commit(&self, hash: &str) -> Result<(), OrchestratorError> {
        let path = self.last_indexed_commit_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| OrchestratorError::Io { path: parent.display().to_string(), source })?;
        }
        std::fs::write(&path, hash).map_err(|source| OrchestratorError::Io { path: path.display().to_string(), source })
    }

    /// Watches the project for filesystem changes and re-indexes affected
    /// files as their debounce window settles, until `cancel` fires
    /// (spec.md §4.8 "Watch operation").
    fn watch(&self, cancel: &CancellationToken) -> Result<(), OrchestratorError> {
        let watcher = FileWatcher::start(&self.config.project_root)?;
        let debounce = self.config.watch.debounce;
        let poll_interval = debounce.min(Duration::from_millis(100)).max(Duration::from_millis(10));

        while !cancel.is_cancelled() {
            std::thread::sleep(poll_interval);
            let settled = watcher.drain_settled(debounce);
            if settled.is_empty() {
                continue;
            }

            let mut registry = self.registry.lock().unwrap();
            for rel_path in settled {
                if cancel.is_cancelled() {
                    break;
                }
                let rel = rel_path.to_string_lossy().replace('\\', "/");
                let abs_path = watcher.project_root().join(&rel_path);
                if abs_path.exists() {
                    let _ = self.embed_and_store_file(&mut registry, &abs_path, &rel, cancel);
                } else {
                    let _ = self.remove_file(&mut registry, &rel);
                }
            }
            registry.save(&self.config.fingerprints_path())?;
            drop(registry);

            self.finalize_collection(&self.code_store, false)?;
            self.fts.finalise()?;
        }

        Ok(())
    }
}

fn hydrate_live_embeddings(store: &VectorStore, snap: &mut GraphSnapshot) -> Result<(), OrchestratorError> {
    let labels: Vec<(u32, Uuid)> = snap.label_to_id.iter().map(|(&l, &id)| (l, id)).collect();
    for (label, id) in labels {
        if snap.is_deleted(label) {
            continue;
        }
        if let Ok(record) = store.hydrate(id) {
            snap.embeddings.insert(label, record.embedding);
        }
    }
    Ok(())
}

fn payload_for(chunk: &Chunk, kind: ChunkKind, commit_meta: Option<CommitPayloadMeta>) -> Payload {
    let text = if commit_meta.is_some() || chunk.git_blob_hash.is_none() {
        Some(chunk.text.clone())
    } else {
        None
    };
    Payload {
        path: chunk.path.clone(),
        chunk_index: chunk.chunk_index,
        byte_start: chunk.byte_start,
        byte_end: chunk.byte_end,
        line_start: chunk.line_start,
        line_end: chunk.line_end,
        language: chunk.language.clone(),
        kind,
        fingerprint: chunk.fingerprint.clone(),
        git_blob_hash: chunk.git_blob_hash.clone(),
        text,
        commit_meta,
    }
}

fn mtime_secs(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding_dispatcher::{OnnxHttpConfig, OnnxHttpEmbedder};
    use engine_model::config::{ChunkingConfig, DispatcherConfig, HnswConfig, LockConfig, WatchConfig};

    fn test_embedder(dimension: usize) -> Arc<dyn Embedder> {
        Arc::new(
            OnnxHttpEmbedder::new(OnnxHttpConfig {
                endpoint: "test://local".into(),
                auth_token: None,
                dimension,
                max_input_length: 100_000,
                max_batch_tokens: 1_000_000,
                embedding_model_id: "test-model".into(),
                text_repr_version: "v1".into(),
            })
            .unwrap(),
        )
    }

    fn test_config(root: &Path) -> EngineConfig {
        EngineConfig {
            project_root: root.to_path_buf(),
            embedding_model_id: "test-model".into(),
            embedding_dimension: 4,
            max_file_size_bytes: 5 * 1024 * 1024,
            chunking: ChunkingConfig { overlap_fraction: 0.0, default_chunk_size_bytes: 4096, model_chunk_sizes: vec![] },
            dispatcher: DispatcherConfig { worker_pool_size: 2, ..DispatcherConfig::default() },
            hnsw: HnswConfig::default(),
            watch: WatchConfig::default(),
            lock: LockConfig::default(),
            query_worker_threads: 2,
        }
    }

    fn open_orchestrator(root: &Path) -> IndexingOrchestrator {
        IndexingOrchestrator::open(test_config(root), test_embedder(4)).unwrap()
    }

    #[test]
    fn full_index_embeds_every_discovered_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        std::fs::write(dir.path().join("b.py"), "def b(): pass").unwrap();

        let orch = open_orchestrator(dir.path());
        let report = orch.run(IndexingRequest { mode: IndexMode::Full, ..Default::default() }, &CancellationToken::new()).unwrap();

        assert_eq!(report.files_embedded, 2);
        assert_eq!(report.chunks_failed, 0);
        assert!(report.chunks_embedded >= 2);
    }

    #[test]
    fn incremental_skips_unchanged_file_and_reembeds_changed_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn b() {}").unwrap();

        let orch = open_orchestrator(dir.path());
        orch.run(IndexingRequest { mode: IndexMode::Full, ..Default::default() }, &CancellationToken::new()).unwrap();

        std::fs::write(dir.path().join("b.rs"), "fn b() { changed() }").unwrap();
        let report = orch.run(IndexingRequest { mode: IndexMode::Incremental, ..Default::default() }, &CancellationToken::new()).unwrap();

        assert_eq!(report.files_embedded, 1);
        assert_eq!(report.files_skipped, 1);
    }

    #[test]
    fn deletion_sweep_removes_vanished_file_vectors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        std::fs::write(dir.path().join("gone.rs"), "fn gone() {}").unwrap();

        let orch = open_orchestrator(dir.path());
        orch.run(IndexingRequest { mode: IndexMode::Full, ..Default::default() }, &CancellationToken::new()).unwrap();

        std::fs::remove_file(dir.path().join("gone.rs")).unwrap();
        let report = orch
            .run(IndexingRequest { mode: IndexMode::Incremental, detect_deletions: true, ..Default::default() }, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.files_deleted, 1);
    }

    #[test]
    fn reconcile_is_idempotent_on_a_second_pass() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();

        let orch = open_orchestrator(dir.path());
        orch.run(IndexingRequest { mode: IndexMode::Reconcile, ..Default::default() }, &CancellationToken::new()).unwrap();
        let second = orch.run(IndexingRequest { mode: IndexMode::Reconcile, ..Default::default() }, &CancellationToken::new()).unwrap();

        assert_eq!(second.files_embedded, 0);
        assert_eq!(second.files_skipped, 1);
    }

    #[test]
    fn cancellation_mid_walk_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn b() {}").unwrap();

        let orch = open_orchestrator(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = orch.run(IndexingRequest { mode: IndexMode::Full, ..Default::default() }, &cancel).unwrap();

        assert!(report.cancelled);
        assert_eq!(report.files_embedded, 0);
    }
}
