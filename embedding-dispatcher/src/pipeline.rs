//! L2 — Embedding Dispatcher pipeline (spec.md §4.3).
//!
//! Chunks flow through a bounded front-end queue where they're packed into
//! token-budgeted batches, then a bounded back-end queue that hands batches
//! to a fixed pool of workers calling the embedder. Both pools are sized
//! off `DispatcherConfig::worker_pool_size` (`W_vec`): front-end gets
//! `W_vec + 2` slots so producers can stay ahead of packing, back-end gets
//! `W_vec` slots, one per worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::bounded;
use engine_model::config::DispatcherConfig;
use engine_model::Chunk;

use crate::embedder::{Embedder, EmbedderError};
use crate::retry::{is_transient, BackoffSchedule};
use crate::token_bucket::TokenBucket;

/// A chunk that has been embedded, ready for `vector-store` to persist.
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A chunk the dispatcher gave up on after exhausting retries, or that was
/// rejected outright (e.g. it alone exceeds the provider's token budget).
pub struct FailedChunk {
    pub chunk: Chunk,
    pub error: EmbedderError,
}

pub struct DispatchOutcome {
    pub embedded: Vec<EmbeddedChunk>,
    pub failed: Vec<FailedChunk>,
}

struct Batch {
    chunks: Vec<Chunk>,
}

/// One worker's result for one batch: whatever embedded, plus whatever is
/// still failed after the whole-batch retry and, for survivors of that,
/// the per-chunk retry pass (spec.md §4.3 "Partial batch failure").
#[derive(Default)]
struct BatchOutcome {
    embedded: Vec<EmbeddedChunk>,
    failed: Vec<FailedChunk>,
}

/// Runs the full dispatcher pipeline over `chunks` to completion: packs
/// them into token-budgeted batches, embeds every batch through `W_vec`
/// worker threads sharing one [`TokenBucket`], retries transient failures
/// with backoff, and returns everything that succeeded or was abandoned.
///
/// `cancelled` is polled between batches and inside the worker loop so a
/// caller can stop an in-flight dispatch (e.g. a file changed again mid
/// embed) without waiting for every queued batch to drain.
pub fn dispatch(
    embedder: Arc<dyn Embedder>,
    chunks: Vec<Chunk>,
    config: &DispatcherConfig,
    cancelled: Arc<AtomicBool>,
) -> DispatchOutcome {
    let worker_count = config.worker_pool_size.max(1);
    let (batch_tx, batch_rx) = bounded::<Batch>(worker_count);
    let (result_tx, result_rx) = bounded::<BatchOutcome>(worker_count + 2);

    let bucket = Arc::new(TokenBucket::new(
        config.rate_limiter_capacity,
        config.rate_limiter_refill_per_sec,
        config.rate_limiter_max_wait,
    ));

    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let batch_rx = batch_rx.clone();
        let result_tx = result_tx.clone();
        let embedder = Arc::clone(&embedder);
        let bucket = Arc::clone(&bucket);
        let cancelled = Arc::clone(&cancelled);
        let config = config.clone();
        workers.push(std::thread::spawn(move || {
            while let Ok(batch) = batch_rx.recv() {
                if cancelled.load(Ordering::Relaxed) {
                    let failed = batch
                        .chunks
                        .into_iter()
                        .map(|chunk| FailedChunk { chunk, error: cancelled_error() })
                        .collect();
                    let _ = result_tx.send(BatchOutcome { embedded: Vec::new(), failed });
                    continue;
                }
                let outcome = match embed_batch_with_retry(embedder.as_ref(), bucket.as_ref(), &config, batch.chunks) {
                    Ok(embedded) => BatchOutcome { embedded, failed: Vec::new() },
                    Err((batch_chunks, batch_err)) => {
                        retry_chunks_individually(embedder.as_ref(), bucket.as_ref(), batch_chunks, &batch_err)
                    }
                };
                let _ = result_tx.send(outcome);
            }
        }));
    }
    drop(batch_rx);
    drop(result_tx);

    let producer = {
        let max_batch_tokens = embedder.max_batch_tokens().min(config.max_request_tokens);
        let embedder = Arc::clone(&embedder);
        let cancelled = Arc::clone(&cancelled);
        std::thread::spawn(move || {
            pack_and_send(embedder.as_ref(), chunks, max_batch_tokens, batch_tx, cancelled)
        })
    };

    let mut embedded = Vec::new();
    let mut failed = producer.join().unwrap_or_default();
    for mut outcome in result_rx {
        embedded.append(&mut outcome.embedded);
        failed.append(&mut outcome.failed);
    }
    for worker in workers {
        let _ = worker.join();
    }

    DispatchOutcome { embedded, failed }
}

/// Packs chunks into batches under `max_batch_tokens` and sends each batch
/// on `batch_tx` as soon as it's full, rather than waiting for the whole
/// input — this is the "front-end" half of the pipeline. Returns chunks
/// that were rejected before ever reaching a worker (a single chunk whose
/// own token count exceeds the batch budget).
fn pack_and_send(
    embedder: &dyn Embedder,
    chunks: Vec<Chunk>,
    max_batch_tokens: usize,
    batch_tx: crossbeam_channel::Sender<Batch>,
    cancelled: Arc<AtomicBool>,
) -> Vec<FailedChunk> {
    let mut rejected = Vec::new();
    let mut current = Vec::new();
    let mut current_tokens = 0usize;

    for chunk in chunks {
        if cancelled.load(Ordering::Relaxed) {
            rejected.push(FailedChunk { chunk, error: cancelled_error() });
            continue;
        }
        let tokens = embedder.count_tokens(&chunk.text);
        if tokens > max_batch_tokens {
            rejected.push(FailedChunk {
                chunk,
                error: EmbedderError::InputTooLong { max_length: max_batch_tokens, actual_length: tokens },
            });
            continue;
        }
        if current_tokens + tokens > max_batch_tokens && !current.is_empty() {
            if batch_tx.send(Batch { chunks: std::mem::take(&mut current) }).is_err() {
                break;
            }
            current_tokens = 0;
        }
        current_tokens += tokens;
        current.push(chunk);
    }
    if !current.is_empty() {
        let _ = batch_tx.send(Batch { chunks: current });
    }
    drop(batch_tx);
    rejected
}

/// Embeds one batch, retrying the whole batch on a transient failure with
/// the backoff schedule from `config`. A batch that still fails once
/// those retries are exhausted is handed back with its original chunks
/// and the last error, for [`retry_chunks_individually`] to isolate
/// (spec.md §4.3 "Partial batch failure").
fn embed_batch_with_retry(
    embedder: &dyn Embedder,
    bucket: &TokenBucket,
    config: &DispatcherConfig,
    chunks: Vec<Chunk>,
) -> Result<Vec<EmbeddedChunk>, (Vec<Chunk>, EmbedderError)> {
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let tokens: f64 = chunks.iter().map(|c| embedder.count_tokens(&c.text) as f64).sum();

    let mut schedule = BackoffSchedule::new(config);
    loop {
        if bucket.acquire(tokens.max(1.0)).is_err() {
            return Err((chunks, EmbedderError::ProviderFailure {
                message: "rate limiter wait exceeded configured maximum".into(),
            }));
        }

        match embedder.embed_batch(&texts) {
            Ok(vectors) => {
                return Ok(chunks
                    .into_iter()
                    .zip(vectors)
                    .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
                    .collect());
            }
            Err(err) if is_transient(&err) && !schedule.exhausted() => {
                if let Some(delay) = schedule.next_delay() {
                    std::thread::sleep(delay);
                    continue;
                }
            }
            Err(err) => return Err((chunks, err)),
        }
    }
}

/// Spec.md §4.3 "Partial batch failure": once the whole batch has given
/// up, each of its chunks gets exactly one more attempt on its own before
/// being logged and skipped, so one bad chunk doesn't sink the rest of an
/// otherwise-healthy batch.
fn retry_chunks_individually(
    embedder: &dyn Embedder,
    bucket: &TokenBucket,
    chunks: Vec<Chunk>,
    batch_error: &EmbedderError,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for chunk in chunks {
        let tokens = embedder.count_tokens(&chunk.text).max(1) as f64;
        if bucket.acquire(tokens).is_err() {
            tracing::warn!(path = %chunk.path, error = %batch_error, "chunk skipped: rate limiter wait exceeded after batch failure");
            outcome.failed.push(FailedChunk { chunk, error: batch_error.clone() });
            continue;
        }
        match embedder.embed(&chunk.text) {
            Ok(embedding) => outcome.embedded.push(EmbeddedChunk { chunk, embedding }),
            Err(err) => {
                tracing::warn!(path = %chunk.path, error = %err, "chunk skipped after individual retry following batch failure");
                outcome.failed.push(FailedChunk { chunk, error: err });
            }
        }
    }
    outcome
}

fn cancelled_error() -> EmbedderError {
    EmbedderError::ProviderFailure { message: "dispatch cancelled".into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::{Embedder, EmbedderInfo, ProviderKind};
    use std::sync::Mutex;
    use std::time::Duration;

    struct CountingEmbedder {
        info: EmbedderInfo,
        calls: Mutex<usize>,
        fail_first_n_batches: usize,
    }

    impl Embedder for CountingEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            self.embed_batch(&[text]).map(|mut v| v.remove(0))
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.fail_first_n_batches {
                return Err(EmbedderError::ProviderFailure { message: "transient".into() });
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }

        fn info(&self) -> &EmbedderInfo {
            &self.info
        }

        fn count_tokens(&self, text: &str) -> usize {
            text.len()
        }

        fn max_batch_tokens(&self) -> usize {
            1000
        }
    }

    fn chunk(path: &str, text: &str) -> Chunk {
        Chunk {
            path: path.into(),
            chunk_index: 0,
            byte_start: 0,
            byte_end: text.len(),
            line_start: 1,
            line_end: 1,
            language: "rust".into(),
            fingerprint: Chunk::fingerprint_of(text),
            git_blob_hash: None,
            text: text.into(),
        }
    }

    fn info() -> EmbedderInfo {
        EmbedderInfo {
            provider: ProviderKind::OnnxHttp,
            embedding_model_id: "test".into(),
            dimension: 1,
            text_repr_version: "v1".into(),
        }
    }

    fn test_config() -> DispatcherConfig {
        let mut c = DispatcherConfig::default();
        c.worker_pool_size = 2;
        c.retry_initial_backoff = Duration::from_millis(1);
        c.retry_backoff_cap = Duration::from_millis(5);
        c.retry_max_attempts = 3;
        c.rate_limiter_capacity = 10_000.0;
        c.rate_limiter_refill_per_sec = 10_000.0;
        c
    }

    #[test]
    fn embeds_every_chunk_when_provider_succeeds() {
        let embedder: Arc<dyn Embedder> =
            Arc::new(CountingEmbedder { info: info(), calls: Mutex::new(0), fail_first_n_batches: 0 });
        let chunks = vec![chunk("a.rs", "one"), chunk("b.rs", "two"), chunk("c.rs", "three")];
        let outcome = dispatch(embedder, chunks, &test_config(), Arc::new(AtomicBool::new(false)));
        assert_eq!(outcome.embedded.len(), 3);
        assert!(outcome.failed.is_empty());
    }

    #[test]
    fn retries_transient_failures_then_succeeds() {
        let embedder: Arc<dyn Embedder> =
            Arc::new(CountingEmbedder { info: info(), calls: Mutex::new(0), fail_first_n_batches: 1 });
        let chunks = vec![chunk("a.rs", "one")];
        let outcome = dispatch(embedder, chunks, &test_config(), Arc::new(AtomicBool::new(false)));
        assert_eq!(outcome.embedded.len(), 1);
        assert!(outcome.failed.is_empty());
    }

    #[test]
    fn reports_failure_once_retries_exhausted() {
        let embedder: Arc<dyn Embedder> =
            Arc::new(CountingEmbedder { info: info(), calls: Mutex::new(0), fail_first_n_batches: 100 });
        let chunks = vec![chunk("a.rs", "one")];
        let outcome = dispatch(embedder, chunks, &test_config(), Arc::new(AtomicBool::new(false)));
        assert!(outcome.embedded.is_empty());
        assert_eq!(outcome.failed.len(), 1);
    }

    /// Fails any multi-chunk `embed_batch` call outright (simulating one
    /// poison chunk in the batch) but succeeds on single-chunk calls
    /// unless the text is literally `"poison"`.
    struct PartialFailEmbedder {
        info: EmbedderInfo,
    }

    impl Embedder for PartialFailEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            self.embed_batch(&[text]).map(|mut v| v.remove(0))
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            if texts.len() > 1 {
                return Err(EmbedderError::ProviderFailure { message: "transient".into() });
            }
            if texts[0] == "poison" {
                return Err(EmbedderError::ProviderFailure { message: "still bad".into() });
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }

        fn info(&self) -> &EmbedderInfo {
            &self.info
        }

        fn count_tokens(&self, text: &str) -> usize {
            text.len()
        }

        fn max_batch_tokens(&self) -> usize {
            1000
        }
    }

    #[test]
    fn partial_batch_failure_retries_each_chunk_once_and_skips_survivors() {
        let embedder: Arc<dyn Embedder> = Arc::new(PartialFailEmbedder { info: info() });
        let chunks = vec![chunk("a.rs", "good"), chunk("b.rs", "poison"), chunk("c.rs", "fine")];
        let mut cfg = test_config();
        cfg.worker_pool_size = 1;
        let outcome = dispatch(embedder, chunks, &cfg, Arc::new(AtomicBool::new(false)));

        assert_eq!(outcome.embedded.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].chunk.path, "b.rs");
    }

    #[test]
    fn cancelling_before_dispatch_fails_every_chunk() {
        let embedder: Arc<dyn Embedder> =
            Arc::new(CountingEmbedder { info: info(), calls: Mutex::new(0), fail_first_n_batches: 0 });
        let chunks = vec![chunk("a.rs", "one"), chunk("b.rs", "two")];
        let outcome = dispatch(embedder, chunks, &test_config(), Arc::new(AtomicBool::new(true)));
        assert!(outcome.embedded.is_empty());
        assert_eq!(outcome.failed.len(), 2);
    }
}
