//! L5 — Query Executor (spec.md §4.9): parses the requested mode, fans
//! the semantic and lexical sub-queries out across a couple of threads,
//! merges and filters the candidates, hydrates their text via the 3-tier
//! content rule, and returns a deterministically ordered, deadline-bounded
//! result set.

use std::sync::Arc;
use std::time::Instant;

use embedding_dispatcher::Embedder;
use engine_model::collection::CollectionKind;
use engine_model::config::EngineConfig;
use engine_model::ChunkKind;
use fts_engine::{FtsIndex, TextHit};
use hnsw_engine::GraphSnapshot;
use uuid::Uuid;
use vector_store::content::{BlobSource, Git2BlobSource};
use vector_store::VectorStore;

use crate::error::QueryError;
use crate::filter::{self, Candidate};
use crate::request::{QueryMode, QueryOutcome, QueryRequest, QueryResult, QueryResultPayloadMeta};

/// Additional margin this layer applies on top of `hnsw_engine::search`'s
/// own internal `k*2` over-fetch, so this layer's post-search language,
/// path, and min-score filters don't starve the caller's `limit` (spec.md
/// §4.9 step 5: "never narrowing the HNSW probe width below k·2").
const PROBE_OVERFETCH: usize = 4;

pub struct QueryExecutor {
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
    fts: FtsIndex,
    repo_present: bool,
}

struct NoBlobSource;

impl BlobSource for NoBlobSource {
    fn resolve_blob(&self, _blob_hash: &str) -> Option<Vec<u8>> {
        None
    }
}

impl QueryExecutor {
    pub fn open(config: EngineConfig, embedder: Arc<dyn Embedder>) -> Result<Self, QueryError> {
        let fts = FtsIndex::open(&config.fts_dir())?;
        let repo_present = git2::Repository::open(&config.project_root).is_ok();
        Ok(Self { config, embedder, fts, repo_present })
    }

    /// Runs one query end to end (spec.md §4.9). A deadline already in the
    /// past is rejected outright rather than silently returning nothing.
    pub fn query(&self, request: QueryRequest) -> Result<QueryOutcome, QueryError> {
        if request.deadline <= Instant::now() {
            return Err(QueryError::DeadlineExceeded);
        }

        match request.mode {
            QueryMode::Semantic => self.run_semantic(&request, CollectionKind::Code),
            QueryMode::Temporal => self.run_semantic(&request, CollectionKind::Temporal),
            QueryMode::Fts => self.run_fts_only(&request),
            QueryMode::Hybrid => self.run_hybrid(&request),
        }
    }

    /// Step 2: loading the id index + HNSW graph and generating the query
    /// embedding happen on separate threads and are joined before the
    /// actual search (spec.md §4.9 step 2). Loading the graph here means
    /// reading back what `hnsw_engine::format::write_graph` already built
    /// once at indexing time, not reinserting every embedding again.
    fn run_semantic(&self, request: &QueryRequest, collection: CollectionKind) -> Result<QueryOutcome, QueryError> {
        let (snapshot_result, embedding_result) = std::thread::scope(|scope| {
            let snapshot_handle = scope.spawn(|| self.load_snapshot(collection));
            let embedding_handle = scope.spawn(|| self.embedder.embed(&request.query_text));
            (snapshot_handle.join().expect("snapshot thread panicked"), embedding_handle.join().expect("embedding thread panicked"))
        });

        let (snapshot, graph) = snapshot_result?;
        let query_embedding = embedding_result.map_err(QueryError::from)?;

        if Instant::now() >= request.deadline {
            return Ok(QueryOutcome { results: Vec::new(), timed_out: true });
        }

        let store = self.open_store(collection)?;
        let probe_k = request.limit.max(1) * PROBE_OVERFETCH;
        let hits = hnsw_engine::search(&graph, &snapshot, &query_embedding, probe_k);
        let blob_source = self.blob_source();

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            if Instant::now() >= request.deadline {
                return Ok(QueryOutcome { results: finish(results, request.limit), timed_out: true });
            }

            let record = match store.hydrate(hit.id) {
                Ok(record) => record,
                // a record the graph still references but the store has
                // since lost (mid-rebuild race) is simply skipped.
                Err(_) => continue,
            };
            let score = 1.0 - hit.distance;
            let candidate = Candidate {
                path: &record.payload.path,
                language: &record.payload.language,
                kind: record.payload.kind,
                score,
                commit_meta: record.payload.commit_meta.as_ref(),
            };
            if !filter::passes(&candidate, request) {
                continue;
            }

            let snippet = store.retrieve_text(&record.payload, blob_source.as_ref())?;
            results.push(QueryResult {
                path: record.payload.path.clone(),
                line_start: record.payload.line_start,
                line_end: record.payload.line_end,
                score,
                snippet,
                payload_meta: QueryResultPayloadMeta {
                    language: record.payload.language.clone(),
                    kind: record.payload.kind,
                    fingerprint: record.payload.fingerprint.clone(),
                    commit_meta: record.payload.commit_meta.clone(),
                },
            });
        }

        Ok(QueryOutcome { results: finish(results, request.limit), timed_out: false })
    }

    fn run_fts_only(&self, request: &QueryRequest) -> Result<QueryOutcome, QueryError> {
        let hits = self.fts_hits(request)?;
        let results = self.hits_to_results(hits, request);
        Ok(QueryOutcome { results: finish(results, request.limit), timed_out: false })
    }

    /// Step 3: the FTS query runs in parallel with the semantic path; the
    /// two candidate sets are then merged by score (spec.md §4.9 step 3).
    fn run_hybrid(&self, request: &QueryRequest) -> Result<QueryOutcome, QueryError> {
        let (semantic_result, fts_result) = std::thread::scope(|scope| {
            let semantic_handle = scope.spawn(|| self.run_semantic(request, CollectionKind::Code));
            let fts_handle = scope.spawn(|| self.fts_hits(request));
            (semantic_handle.join().expect("semantic thread panicked"), fts_handle.join().expect("fts thread panicked"))
        });

        let mut semantic_outcome = semantic_result?;
        let fts_hits = fts_result?;
        let mut fts_results = self.hits_to_results(fts_hits, request);

        semantic_outcome.results.append(&mut fts_results);
        dedup_by_path_and_lines(&mut semantic_outcome.results);
        let timed_out = semantic_outcome.timed_out;
        Ok(QueryOutcome { results: finish(semantic_outcome.results, request.limit), timed_out })
    }

    fn fts_hits(&self, request: &QueryRequest) -> Result<Vec<TextHit>, QueryError> {
        let overfetch = request.limit.max(1) * PROBE_OVERFETCH;
        let hits = if request.regex {
            fts_engine::token_regex(&self.fts, &request.query_text, request.case_sensitive, overfetch)?
        } else if request.fuzzy {
            fts_engine::fuzzy(&self.fts, &request.query_text, request.edit_distance, overfetch)?
        } else {
            fts_engine::exact(&self.fts, &request.query_text, request.case_sensitive, overfetch)?
        };
        Ok(hits)
    }

    /// FTS hits are whole-file, so there is no chunk-level line range to
    /// recover from the index; the result spans the whole file, mirroring
    /// how `temporal_engine::commit_chunks` synthesises a line range for
    /// whole-message/whole-diff text (`text.lines().count().max(1)`).
    fn hits_to_results(&self, hits: Vec<TextHit>, request: &QueryRequest) -> Vec<QueryResult> {
        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let candidate = Candidate {
                path: &hit.path,
                language: &hit.language,
                kind: ChunkKind::Code,
                score: hit.score,
                commit_meta: None,
            };
            if !filter::passes(&candidate, request) {
                continue;
            }
            let line_end = hit.text.lines().count().max(1) as u32;
            results.push(QueryResult {
                path: hit.path.clone(),
                line_start: 1,
                line_end,
                score: hit.score,
                snippet: hit.text,
                payload_meta: QueryResultPayloadMeta {
                    language: hit.language,
                    kind: ChunkKind::Code,
                    fingerprint: String::new(),
                    commit_meta: None,
                },
            });
        }
        results
    }

    /// Reads the label map/bitset (`hnsw_index.bin`) and the built graph
    /// (`hnsw_graph.hnsw.*`) back. Neither requires touching the vector
    /// store: the graph already carries every embedding it was built
    /// with, so there's no per-query re-hydration from disk.
    fn load_snapshot(&self, collection: CollectionKind) -> Result<(GraphSnapshot, hnsw_engine::QueryGraph), QueryError> {
        let collection_dir = vector_store::layout::collection_dir(&self.config.project_root, collection.dir_name());
        let hnsw_path = vector_store::layout::hnsw_index_path(&collection_dir);
        let snapshot = if hnsw_path.exists() {
            hnsw_engine::format::read(&hnsw_path)?
        } else {
            GraphSnapshot::empty(hnsw_engine::HnswParams::from(self.config.hnsw))
        };
        let graph = hnsw_engine::format::load_graph(&collection_dir, vector_store::layout::HNSW_GRAPH_BASENAME)?;
        Ok((snapshot, graph))
    }

    /// Opens the collection fresh rather than caching a handle, so a long
    /// lived executor sees vectors an indexing session wrote after the
    /// executor itself started (spec.md §4.9 step 2: "loads id index").
    fn open_store(&self, collection: CollectionKind) -> Result<VectorStore, QueryError> {
        Ok(VectorStore::open(&self.config.project_root, collection, &self.config.embedding_model_id, self.config.embedding_dimension)?)
    }

    fn blob_source(&self) -> Box<dyn BlobSource> {
        if self.repo_present {
            if let Ok(source) = Git2BlobSource::open(&self.config.project_root) {
                return Box::new(source);
            }
        }
        Box::new(NoBlobSource)
    }
}

/// Total order: score descending, then the payload fingerprint ascending
/// as a stable tiebreaker (spec.md §5: results are "totally ordered ...
/// for reproducibility under ties" — the vector store's internal id isn't
/// part of the public result shape, so the content fingerprint plays that
/// role here).
fn finish(mut results: Vec<QueryResult>, limit: usize) -> Vec<QueryResult> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.payload_meta.fingerprint.cmp(&b.payload_meta.fingerprint))
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.line_start.cmp(&b.line_start))
    });
    results.truncate(limit);
    results
}

/// Collapses a semantic hit and an FTS hit that landed on the same
/// path/line range in hybrid mode, keeping whichever scored higher.
fn dedup_by_path_and_lines(results: &mut Vec<QueryResult>) {
    use std::collections::HashMap;

    let mut best_index: HashMap<(String, u32, u32), usize> = HashMap::new();
    let mut keep = vec![true; results.len()];
    for i in 0..results.len() {
        let key = (results[i].path.clone(), results[i].line_start, results[i].line_end);
        match best_index.get(&key).copied() {
            Some(existing) if results[existing].score >= results[i].score => keep[i] = false,
            Some(existing) => {
                keep[existing] = false;
                best_index.insert(key, i);
            }
            None => {
                best_index.insert(key, i);
            }
        }
    }
    let mut index = 0;
    results.retain(|_| {
        let k = keep[index];
        index += 1;
        k
    });
}
