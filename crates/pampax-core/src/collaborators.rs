//! External collaborator seams
//!
//! The span/reference producer, embedding provider, reranker, and memory
//! source are out of scope for this crate (they are invoked by the indexer
//! binary or supplied by the host application) but the retrieval pipeline
//! depends on their shape. These traits are the dependency-injection seams
//! production code uses; tests fulfil them with in-memory fakes rather than
//! mocked modules.

use crate::error::Result;
use crate::types::{MemoryItem, Reference, Span};
use async_trait::async_trait;

/// Given a file's bytes, produce its spans and reference edges. Implemented
/// by a tree-sitter/LSP-backed indexer outside this crate.
#[async_trait]
pub trait SpanExtractor: Send + Sync {
    async fn extract(
        &self,
        repo: &str,
        path: &str,
        content: &[u8],
        language: Option<&str>,
    ) -> Result<(Vec<Span>, Vec<Reference>)>;
}

/// Given a batch of texts and a model name, return one f32 vector per text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    fn dimension(&self) -> u32;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// A scored, reordered candidate returned by an optional reranker.
#[derive(Debug, Clone)]
pub struct RerankedCandidate {
    pub id: String,
    pub score: f32,
}

/// Given a query and candidate ids, return them reordered with scores.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<RerankedCandidate>>;
}

/// Produces [`MemoryItem`]s from the learning surface (outside this crate's
/// scope; typically fed by prior session interactions or an explicit
/// `remember` command).
#[async_trait]
pub trait MemorySource: Send + Sync {
    async fn items(&self, repo: &str) -> Result<Vec<MemoryItem>>;
}

/// Injectable clock so time-dependent logic (TTL expiry, backoff jitter
/// windows) is deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}
