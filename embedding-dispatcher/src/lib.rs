//! L2 — Embedding Dispatcher: turns a stream of chunks into a stream of
//! embedded vectors through a provider-agnostic [`embedder::Embedder`]
//! trait, a token-budgeted batching [`pipeline`], a shared [`token_bucket`]
//! rate limiter, and [`retry`] backoff for transient provider failures.

pub mod config;
pub mod embedder;
pub mod pipeline;
pub mod retry;
pub mod token_bucket;

pub use embedder::{
    Embedder, EmbedderError, EmbedderInfo, OnnxHttpConfig, OnnxHttpEmbedder, OnnxStdIoConfig,
    OnnxStdIoEmbedder, ProviderKind,
};
pub use pipeline::{dispatch, DispatchOutcome, EmbeddedChunk, FailedChunk};
pub use token_bucket::{RateLimitExceeded, TokenBucket};
