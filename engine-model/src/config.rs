//! The small injected configuration struct the core consumes (spec.md §9:
//! "the core consumes a small injected configuration struct and does not
//! reach into any process-wide state"). Frontends (CLI/daemon/server,
//! outside this core) are responsible for parsing this from whatever
//! config file or flags they support; this crate only defines the shape.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-model chunk size table entry (spec.md §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSizeEntry {
    pub model_id: String,
    pub chunk_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub overlap_fraction: f32,
    pub default_chunk_size_bytes: usize,
    pub model_chunk_sizes: Vec<ChunkSizeEntry>,
}

impl ChunkingConfig {
    pub fn chunk_size_for_model(&self, model_id: &str) -> usize {
        self.model_chunk_sizes
            .iter()
            .find(|e| e.model_id == model_id)
            .map(|e| e.chunk_size_bytes)
            .unwrap_or(self.default_chunk_size_bytes)
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            overlap_fraction: 0.15,
            default_chunk_size_bytes: 1500,
            model_chunk_sizes: vec![
                ChunkSizeEntry { model_id: "text-embedding-3-small".into(), chunk_size_bytes: 2000 },
                ChunkSizeEntry { model_id: "text-embedding-3-large".into(), chunk_size_bytes: 2000 },
                ChunkSizeEntry { model_id: "voyage-code-3".into(), chunk_size_bytes: 1600 },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub max_request_tokens: usize,
    pub worker_pool_size: usize,
    pub request_timeout: Duration,
    pub batch_stall_timeout: Duration,
    pub retry_initial_backoff: Duration,
    pub retry_backoff_multiplier: f64,
    pub retry_backoff_cap: Duration,
    pub retry_max_attempts: u32,
    pub rate_limiter_capacity: f64,
    pub rate_limiter_refill_per_sec: f64,
    pub rate_limiter_max_wait: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_request_tokens: 120_000,
            worker_pool_size: 8,
            request_timeout: Duration::from_secs(30),
            batch_stall_timeout: Duration::from_millis(200),
            retry_initial_backoff: Duration::from_secs(1),
            retry_backoff_multiplier: 2.0,
            retry_backoff_cap: Duration::from_secs(30),
            retry_max_attempts: 3,
            rate_limiter_capacity: 120_000.0,
            rate_limiter_refill_per_sec: 20_000.0,
            rate_limiter_max_wait: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HnswConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_query: usize,
    /// Full rebuild is forced once `deleted / total` exceeds this fraction.
    pub churn_rebuild_threshold: f32,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self { m: 16, ef_construction: 200, ef_query: 50, churn_rebuild_threshold: 0.3 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WatchConfig {
    pub debounce: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce: Duration::from_millis(300) }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LockConfig {
    /// A writer lock older than this is considered abandoned and
    /// reclaimable (spec.md §5 "stale locks older than a configurable
    /// threshold are reclaimable").
    pub stale_after: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { stale_after: Duration::from_secs(60 * 30) }
    }
}

/// Top-level configuration the engine facade is constructed with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub project_root: PathBuf,
    pub embedding_model_id: String,
    pub embedding_dimension: usize,
    pub max_file_size_bytes: u64,
    pub chunking: ChunkingConfig,
    pub dispatcher: DispatcherConfig,
    pub hnsw: HnswConfig,
    pub watch: WatchConfig,
    pub lock: LockConfig,
    pub query_worker_threads: usize,
}

impl EngineConfig {
    pub fn index_dir(&self) -> PathBuf {
        self.project_root.join(".index")
    }

    pub fn fts_dir(&self) -> PathBuf {
        self.project_root.join("fts_index")
    }

    pub fn fingerprints_path(&self) -> PathBuf {
        self.project_root.join("fingerprints.json")
    }
}
