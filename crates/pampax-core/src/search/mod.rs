//! Hybrid Search Orchestrator: runs lexical, vector, memory, and symbol
//! probes in parallel, fuses them via RRF, folds in a graph expansion, and
//! returns a ranked candidate list with per-item provenance.

use crate::collaborators::EmbeddingProvider;
use crate::graph::{ExpansionStrategy, GraphTraversal, TraversalResult};
use crate::retrieval::{early_stop, fuse, RankedItem, RetrievalConfig, Source};
use crate::storage::Storage;
use crate::types::{MemoryScope, ReferenceKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Where a fused candidate's score came from; carried through so the
/// evidence tracker (component K) can cite provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    Vector,
    Bm25,
    Memory,
    Symbol,
    Graph,
}

#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub id: String,
    pub score: f32,
    pub sources: Vec<(EvidenceSource, usize)>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub candidates: Vec<SearchCandidate>,
    pub graph: Option<TraversalResult>,
    pub degraded: bool,
}

pub struct SourceDeadlines {
    pub vector: Duration,
    pub bm25: Duration,
    pub memory: Duration,
    pub symbol: Duration,
}

impl Default for SourceDeadlines {
    fn default() -> Self {
        Self {
            vector: Duration::from_millis(250),
            bm25: Duration::from_millis(150),
            memory: Duration::from_millis(100),
            symbol: Duration::from_millis(100),
        }
    }
}

pub struct HybridSearchOrchestrator {
    storage: Arc<Storage>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    graph: Arc<GraphTraversal>,
    deadlines: SourceDeadlines,
}

impl HybridSearchOrchestrator {
    pub fn new(storage: Arc<Storage>, embedder: Option<Arc<dyn EmbeddingProvider>>, graph: Arc<GraphTraversal>) -> Self {
        Self {
            storage,
            embedder,
            graph,
            deadlines: SourceDeadlines::default(),
        }
    }

    pub fn with_deadlines(mut self, deadlines: SourceDeadlines) -> Self {
        self.deadlines = deadlines;
        self
    }

    /// Run the parallel probes, fuse with RRF, expand the graph for the
    /// top seeds, and fold those edges back into the result stream. A
    /// probe that misses its deadline degrades to an empty list rather
    /// than failing the whole search; `degraded` reflects that.
    pub async fn search(
        &self,
        repo: &str,
        query: &str,
        config: &RetrievalConfig,
        limit: usize,
        include_symbols: bool,
        token_budget: u64,
    ) -> crate::error::Result<SearchOutcome> {
        let storage = Arc::clone(&self.storage);
        let repo_owned = repo.to_string();
        let query_owned = query.to_string();

        let bm25_fut = {
            let storage = Arc::clone(&storage);
            let query = query_owned.clone();
            let deadline = self.deadlines.bm25;
            async move {
                run_with_deadline(deadline, async move {
                    tokio::task::spawn_blocking(move || storage.fts_search(&query, 50))
                        .await
                        .map_err(|e| crate::error::PampaxError::Internal(e.to_string()))?
                })
                .await
            }
        };

        let memory_fut = {
            let storage = Arc::clone(&storage);
            let query = query_owned.clone();
            let deadline = self.deadlines.memory;
            async move {
                run_with_deadline(deadline, async move {
                    tokio::task::spawn_blocking(move || storage.search_memory(Some(MemoryScope::Repo), &query, 20, false))
                        .await
                        .map_err(|e| crate::error::PampaxError::Internal(e.to_string()))?
                })
                .await
            }
        };

        let symbol_fut = {
            let storage = Arc::clone(&storage);
            let query = query_owned.clone();
            let repo = repo_owned.clone();
            let deadline = self.deadlines.symbol;
            async move {
                if !include_symbols {
                    return Ok(Vec::new());
                }
                run_with_deadline(deadline, async move {
                    tokio::task::spawn_blocking(move || storage.search_symbols_by_name(&repo, &query, 20, None))
                        .await
                        .map_err(|e| crate::error::PampaxError::Internal(e.to_string()))?
                })
                .await
            }
        };

        let vector_fut = {
            let storage = Arc::clone(&storage);
            let repo = repo_owned.clone();
            let query = query_owned.clone();
            let embedder = self.embedder.clone();
            let deadline = self.deadlines.vector;
            async move {
                let Some(embedder) = embedder else {
                    return Ok(Vec::new());
                };
                run_with_deadline(deadline, async move {
                    let vectors = embedder.embed(&[query]).await?;
                    let Some(vector) = vectors.into_iter().next() else {
                        return Ok(Vec::new());
                    };
                    let model = embedder.model_name().to_string();
                    tokio::task::spawn_blocking(move || storage.vector_search(&repo, &vector, &model, 50))
                        .await
                        .map_err(|e| crate::error::PampaxError::Internal(e.to_string()))?
                })
                .await
            }
        };

        let (bm25_res, memory_res, symbol_res, vector_res) =
            tokio::join!(bm25_fut, memory_fut, symbol_fut, vector_fut);

        let mut degraded = false;
        let bm25_list: Vec<(String, f32)> = bm25_res
            .unwrap_or_else(|_| {
                degraded = true;
                Vec::new()
            })
            .into_iter()
            .map(|(id, _content, score)| (id, score))
            .collect();
        let memory_list: Vec<(String, f32)> = memory_res
            .unwrap_or_else(|_| {
                degraded = true;
                Vec::new()
            })
            .into_iter()
            .map(|m| (m.id, m.weight))
            .collect();
        let symbol_list: Vec<(String, f32)> = symbol_res
            .unwrap_or_else(|_| {
                degraded = true;
                Vec::new()
            })
            .into_iter()
            .enumerate()
            .map(|(rank, s)| (s.id, 1.0 - (rank as f32 * 0.01)))
            .collect();
        // vector_search returns (id, distance) — lower is better; invert so
        // fuse()'s rank-by-position ordering (best first) still holds.
        let mut vector_list: Vec<(String, f32)> = vector_res
            .unwrap_or_else(|_| {
                degraded = true;
                Vec::new()
            })
            .into_iter()
            .map(|(id, dist)| (id, 1.0 - dist))
            .collect();
        vector_list.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let fused = fuse(
            &[
                (Source::Vector, vector_list.as_slice()),
                (Source::Bm25, bm25_list.as_slice()),
                (Source::Memory, memory_list.as_slice()),
                (Source::Symbol, symbol_list.as_slice()),
            ],
            config,
            limit.max(config.early_stop_threshold as usize),
        );
        let stopped = early_stop(&fused, config);

        let seeds = self.resolve_graph_seeds(&stopped);
        let graph_result = if !seeds.is_empty() && token_budget > 0 {
            let storage = Arc::clone(&self.storage);
            let graph = Arc::clone(&self.graph);
            let repo = repo_owned.clone();
            let query = query_owned.clone();
            let max_depth = config.max_depth;
            let result = tokio::task::spawn_blocking(move || {
                let estimator = |_: &str| 32u64;
                graph.traverse(
                    &storage,
                    &repo,
                    &seeds,
                    Some(&[ReferenceKind::Call, ReferenceKind::Reference, ReferenceKind::Implement]),
                    max_depth,
                    ExpansionStrategy::Breadth,
                    token_budget,
                    &query,
                    &estimator,
                )
            })
            .await
            .map_err(|e| crate::error::PampaxError::Internal(e.to_string()))??;
            Some(result)
        } else {
            None
        };

        let mut candidates: Vec<SearchCandidate> = stopped
            .into_iter()
            .map(|item| SearchCandidate {
                id: item.id,
                score: item.score,
                sources: item
                    .source_ranks
                    .into_iter()
                    .map(|(s, rank)| (map_source(s), rank))
                    .collect(),
            })
            .collect();

        if let Some(graph) = &graph_result {
            let existing: std::collections::HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
            for (rank, node) in graph.visited_nodes.iter().enumerate() {
                if !existing.contains(node.as_str()) {
                    candidates.push(SearchCandidate {
                        id: node.clone(),
                        score: 1.0 / (config.rrf_k + rank as f32),
                        sources: vec![(EvidenceSource::Graph, rank)],
                    });
                }
            }
        }

        candidates.truncate(limit.max(1));

        Ok(SearchOutcome {
            candidates,
            graph: graph_result,
            degraded,
        })
    }

    /// Map fused candidate ids (a mix of chunk ids, span ids, and memory
    /// item ids) down to span ids the graph traversal can seed from. Ids
    /// that aren't chunk ids (symbol hits are already span ids) pass
    /// through unchanged; the cap keeps traversal fan-out bounded.
    fn resolve_graph_seeds(&self, items: &[RankedItem]) -> Vec<String> {
        let mut seeds = Vec::new();
        for item in items {
            if seeds.len() >= 8 {
                break;
            }
            match self.storage.find_chunk_by_id(&item.id) {
                Ok(Some(chunk)) => seeds.push(chunk.span_id),
                _ => seeds.push(item.id.clone()),
            }
        }
        seeds
    }
}

fn map_source(source: Source) -> EvidenceSource {
    match source {
        Source::Vector => EvidenceSource::Vector,
        Source::Bm25 => EvidenceSource::Bm25,
        Source::Memory => EvidenceSource::Memory,
        Source::Symbol => EvidenceSource::Symbol,
    }
}

async fn run_with_deadline<T, F>(deadline: Duration, fut: F) -> crate::error::Result<T>
where
    F: std::future::Future<Output = crate::error::Result<T>>,
    T: Default,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(inner) => inner,
        Err(_) => Ok(T::default()),
    }
}
