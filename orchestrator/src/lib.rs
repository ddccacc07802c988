//! L4 — Indexing Orchestrator (spec.md §4.8): decides what each file needs,
//! drives full/incremental/reconcile/watch indexing, and keeps the writer
//! lock, file fingerprint registry, and filesystem watcher that support it.

pub mod error;
pub mod fingerprint;
pub mod lock;
pub mod orchestrator;
pub mod watch;

pub use error::OrchestratorError;
pub use fingerprint::{content_hash_of_file, FileDecision, FileFingerprint, FileFingerprintRegistry};
pub use lock::{LockError, WriterLock};
pub use orchestrator::{CancellationToken, IndexMode, IndexingOrchestrator, IndexingReport, IndexingRequest};
pub use watch::FileWatcher;
