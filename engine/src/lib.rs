//! Top-level facade crate wiring the indexing and query engine into the
//! operational contract (spec.md §6) that a CLI, daemon, or server
//! frontend drives. Nothing here has a `main.rs` or reads a config file;
//! a frontend constructs an [`engine_model::EngineConfig`] and an
//! [`embedding_dispatcher::Embedder`] itself and hands them to [`Engine::open`].
//!
//! Mirrors the shape of the teacher's `hybrid-service` crate: one struct
//! owning the open collections, thin delegating methods, errors converted
//! to a single boundary type at every call (here, `engine_model::EngineError`
//! per spec.md §7, rather than `hybrid-service`'s ad hoc `ServiceError`).

use std::sync::Arc;

use embedding_dispatcher::Embedder;
use engine_model::config::EngineConfig;
use engine_model::EngineError;

pub use orchestrator::{CancellationToken, IndexMode, IndexingReport, IndexingRequest};
pub use query_executor::{QueryMode, QueryOutcome, QueryRequest, QueryResult};
pub use temporal_engine::BranchSelector;

pub struct Engine {
    orchestrator: orchestrator::IndexingOrchestrator,
    executor: query_executor::QueryExecutor,
}

impl Engine {
    /// Opens both the indexing and query paths against the same project
    /// root and embedder. Cheap: this only opens on-disk handles (vector
    /// stores, fts index, fingerprint registry), it does not index
    /// anything.
    pub fn open(config: EngineConfig, embedder: Arc<dyn Embedder>) -> Result<Self, EngineError> {
        let orchestrator = orchestrator::IndexingOrchestrator::open(config.clone(), Arc::clone(&embedder))?;
        let executor = query_executor::QueryExecutor::open(config, embedder)?;
        Ok(Self { orchestrator, executor })
    }

    /// Runs one indexing session (full, incremental, reconcile, or a
    /// blocking watch loop) under the per-project writer lock (spec.md
    /// §4.8, §5).
    pub fn index(&self, request: IndexingRequest, cancel: &CancellationToken) -> Result<IndexingReport, EngineError> {
        Ok(self.orchestrator.run(request, cancel)?)
    }

    /// Convenience for the common case: an incremental pass with
    /// deletion detection, no commit history.
    pub fn index_incremental(&self, cancel: &CancellationToken) -> Result<IndexingReport, EngineError> {
        self.index(IndexingRequest { mode: IndexMode::Incremental, detect_deletions: true, ..Default::default() }, cancel)
    }

    /// Convenience for a full reconcile pass (spec.md §4.8 "Reconcile
    /// operation"): unlinks vectors for vanished files, rebuilds drifted
    /// ones, and finalises both the vector store and the FTS engine.
    pub fn reconcile(&self, cancel: &CancellationToken) -> Result<IndexingReport, EngineError> {
        self.index(IndexingRequest { mode: IndexMode::Reconcile, detect_deletions: true, ..Default::default() }, cancel)
    }

    /// Runs one query end to end: parses filters, fans semantic/lexical/
    /// temporal sub-queries out in parallel, merges, hydrates payloads
    /// (spec.md §4.9).
    pub fn query(&self, request: QueryRequest) -> Result<QueryOutcome, EngineError> {
        Ok(self.executor.query(request)?)
    }
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

    fn test_config(root: &std::path::Path) -> EngineConfig {
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

    #[test]
    fn index_then_query_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("auth.rs"), "fn authenticate(user: &str) -> bool { true }").unwrap();
        std::fs::write(dir.path().join("math.py"), "def add(a, b): return a + b").unwrap();

        let embedder = test_embedder(4);
        let engine = Engine::open(test_config(dir.path()), embedder).unwrap();

        let cancel = CancellationToken::new();
        let report = engine.index(IndexingRequest { mode: IndexMode::Full, ..Default::default() }, &cancel).unwrap();
        assert_eq!(report.files_embedded, 2);
        assert!(!report.cancelled);

        let outcome = engine.query(QueryRequest::new("fn authenticate(user: &str) -> bool { true }")).unwrap();
        assert!(!outcome.timed_out);
        assert!(!outcome.results.is_empty());
        assert_eq!(outcome.results[0].path, "auth.rs");
    }

    #[test]
    fn reconcile_after_full_index_is_a_noop_report() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();

        let embedder = test_embedder(4);
        let engine = Engine::open(test_config(dir.path()), embedder).unwrap();
        let cancel = CancellationToken::new();

        engine.index(IndexingRequest { mode: IndexMode::Full, ..Default::default() }, &cancel).unwrap();
        let report = engine.reconcile(&cancel).unwrap();

        assert_eq!(report.files_embedded, 0);
        assert_eq!(report.files_deleted, 0);
    }
}
