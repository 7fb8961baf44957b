//! Graph Traversal: bounded BFS/DFS over Reference edges from seed spans,
//! with a per-expansion token budget and an LRU traversal cache.
//!
//! Grounded on the teacher's adjacency-list-plus-reason idiom
//! (`advanced::dreams::ConnectionGraph`), generalized from an in-memory
//! memory-connection graph to a reference-edge table read through the
//! storage engine, with edge-kind filtering applied at enqueue rather than
//! post-hoc.

use crate::storage::Storage;
use crate::types::{Reference, ReferenceKind};
use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionStrategy {
    Breadth,
    Depth,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraversalResult {
    pub visited_nodes: Vec<String>,
    pub edges: Vec<Reference>,
    pub expansion_depth: u32,
    pub tokens_used: u64,
    pub token_budget: u64,
    pub truncated: bool,
    pub performance_ms: u64,
    pub cache_hit: bool,
}

struct CacheEntry {
    result: TraversalResult,
    expires_at: Instant,
}

/// Per-visited-chunk token estimator. Kept generic over a closure so the
/// traversal doesn't need to depend on a concrete tokenizer instance.
pub trait TokenEstimator {
    fn estimate(&self, span_id: &str) -> u64;
}

impl<F: Fn(&str) -> u64> TokenEstimator for F {
    fn estimate(&self, span_id: &str) -> u64 {
        self(span_id)
    }
}

pub struct GraphTraversal {
    cache: Mutex<LruCache<u64, CacheEntry>>,
    ttl: Duration,
}

impl Default for GraphTraversal {
    fn default() -> Self {
        Self::new(512, Duration::from_secs(300))
    }
}

impl GraphTraversal {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())),
            ttl,
        }
    }

    fn cache_key(
        start_spans: &[String],
        kinds: &[ReferenceKind],
        max_depth: u32,
        token_budget: u64,
        strategy: ExpansionStrategy,
        query: &str,
    ) -> u64 {
        let mut sorted_spans = start_spans.to_vec();
        sorted_spans.sort();
        let mut sorted_kinds: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        sorted_kinds.sort();
        let mut hasher = DefaultHasher::new();
        sorted_spans.hash(&mut hasher);
        sorted_kinds.hash(&mut hasher);
        max_depth.hash(&mut hasher);
        token_budget.hash(&mut hasher);
        matches!(strategy, ExpansionStrategy::Depth).hash(&mut hasher);
        query.hash(&mut hasher);
        hasher.finish()
    }

    /// Invalidate every cached result whose `visited_nodes` intersects
    /// `changed_nodes` (e.g. after a reindex touches those spans).
    pub fn invalidate_touching(&self, changed_nodes: &HashSet<String>) {
        let mut cache = self.cache.lock().unwrap();
        let stale: Vec<u64> = cache
            .iter()
            .filter(|(_, entry)| entry.result.visited_nodes.iter().any(|n| changed_nodes.contains(n)))
            .map(|(k, _)| *k)
            .collect();
        for k in stale {
            cache.pop(&k);
        }
    }

    /// Bounded traversal from `start_spans` over edges in `kinds` (or all
    /// kinds if `None`), honoring `max_depth` and `token_budget`.
    pub fn traverse(
        &self,
        storage: &Storage,
        repo: &str,
        start_spans: &[String],
        kinds: Option<&[ReferenceKind]>,
        max_depth: u32,
        strategy: ExpansionStrategy,
        token_budget: u64,
        query: &str,
        estimator: &dyn TokenEstimator,
    ) -> crate::error::Result<TraversalResult> {
        let started = Instant::now();
        let kinds_vec: Vec<ReferenceKind> = kinds.map(|k| k.to_vec()).unwrap_or_else(|| {
            vec![
                ReferenceKind::Call,
                ReferenceKind::Import,
                ReferenceKind::Inherit,
                ReferenceKind::Implement,
                ReferenceKind::Reference,
                ReferenceKind::Define,
            ]
        });
        let key = Self::cache_key(start_spans, &kinds_vec, max_depth, token_budget, strategy, query);

        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(&key) {
                if entry.expires_at > Instant::now() {
                    let mut result = entry.result.clone();
                    result.cache_hit = true;
                    result.performance_ms = started.elapsed().as_millis() as u64;
                    return Ok(result);
                }
                cache.pop(&key);
            }
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut visited_order: Vec<String> = Vec::new();
        let mut all_edges: Vec<Reference> = Vec::new();
        let mut tokens_used: u64 = 0;
        let mut truncated = false;
        let mut depth_reached: u32 = 0;

        let mut queue: VecDeque<(String, u32)> = VecDeque::new();
        for s in start_spans {
            if visited.insert(s.clone()) {
                visited_order.push(s.clone());
                tokens_used += estimator.estimate(s);
                queue.push_back((s.clone(), 0));
            }
        }
        if tokens_used > token_budget {
            truncated = true;
        }

        while let Some((node, depth)) = if matches!(strategy, ExpansionStrategy::Breadth) {
            queue.pop_front()
        } else {
            queue.pop_back()
        } {
            if truncated || depth >= max_depth {
                continue;
            }
            let edges = storage.outgoing_edges(&node, Some(&kinds_vec))?;
            for edge in edges {
                all_edges.push(edge.clone());
                let dst_spans = storage.find_spans_in_byte_range(
                    repo,
                    &edge.dst_path,
                    edge.dst_byte_start,
                    edge.dst_byte_end,
                );
                let candidates: Vec<String> = match dst_spans {
                    Ok(spans) if !spans.is_empty() => spans.into_iter().map(|s| s.id).collect(),
                    _ => vec![format!("{}:{}:{}", edge.dst_path, edge.dst_byte_start, edge.dst_byte_end)],
                };
                for candidate in candidates {
                    if visited.contains(&candidate) {
                        continue;
                    }
                    let cost = estimator.estimate(&candidate);
                    if tokens_used + cost > token_budget {
                        truncated = true;
                        break;
                    }
                    visited.insert(candidate.clone());
                    visited_order.push(candidate.clone());
                    tokens_used += cost;
                    depth_reached = depth_reached.max(depth + 1);
                    queue.push_back((candidate, depth + 1));
                }
                if truncated {
                    break;
                }
            }
            if truncated {
                break;
            }
        }

        let result = TraversalResult {
            visited_nodes: visited_order,
            edges: all_edges,
            expansion_depth: depth_reached,
            tokens_used,
            token_budget,
            truncated,
            performance_ms: started.elapsed().as_millis() as u64,
            cache_hit: false,
        };

        self.cache.lock().unwrap().put(
            key,
            CacheEntry {
                result: result.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{span_id, Span, SpanKind};

    fn seed_chain(storage: &Storage) -> (String, String, String) {
        storage.upsert_file("r", "a.rs", "h", None, 1, chrono::Utc::now()).unwrap();
        storage.upsert_file("r", "b.rs", "h", None, 1, chrono::Utc::now()).unwrap();
        storage.upsert_file("r", "c.rs", "h", None, 1, chrono::Utc::now()).unwrap();
        let a = span_id("r", "a.rs", 0, 10, SpanKind::Function, "a_fn", None, None, &[]);
        let b = span_id("r", "b.rs", 0, 10, SpanKind::Function, "b_fn", None, None, &[]);
        let c = span_id("r", "c.rs", 0, 10, SpanKind::Function, "c_fn", None, None, &[]);
        for (id, path, name) in [(&a, "a.rs", "a_fn"), (&b, "b.rs", "b_fn"), (&c, "c.rs", "c_fn")] {
            storage
                .insert_span(&Span {
                    id: id.clone(),
                    repo: "r".to_string(),
                    path: path.to_string(),
                    byte_start: 0,
                    byte_end: 10,
                    kind: SpanKind::Function,
                    name: name.to_string(),
                    signature: None,
                    doc: None,
                    parents: vec![],
                })
                .unwrap();
        }
        storage
            .insert_reference(&Reference {
                id: "ref_ab".to_string(),
                src_span_id: a.clone(),
                dst_path: "b.rs".to_string(),
                dst_byte_start: 0,
                dst_byte_end: 10,
                kind: ReferenceKind::Call,
                confidence: 0.9,
            })
            .unwrap();
        storage
            .insert_reference(&Reference {
                id: "ref_bc".to_string(),
                src_span_id: b.clone(),
                dst_path: "c.rs".to_string(),
                dst_byte_start: 0,
                dst_byte_end: 10,
                kind: ReferenceKind::Call,
                confidence: 0.9,
            })
            .unwrap();
        (a, b, c)
    }

    #[test]
    fn breadth_traversal_respects_max_depth() {
        let storage = Storage::open_in_memory().unwrap();
        let (a, b, _c) = seed_chain(&storage);
        let graph = GraphTraversal::default();
        let estimator = |_: &str| 1u64;
        let result = graph
            .traverse(&storage, "r", &[a], None, 1, ExpansionStrategy::Breadth, 1000, "q", &estimator)
            .unwrap();
        assert!(result.visited_nodes.contains(&b));
        assert!(!result.truncated);
    }

    #[test]
    fn token_budget_truncates_traversal() {
        let storage = Storage::open_in_memory().unwrap();
        let (a, _b, _c) = seed_chain(&storage);
        let graph = GraphTraversal::default();
        let estimator = |_: &str| 1u64;
        let result = graph
            .traverse(&storage, "r", &[a], None, 5, ExpansionStrategy::Breadth, 1, "q", &estimator)
            .unwrap();
        assert!(result.truncated);
    }

    #[test]
    fn second_call_is_cache_hit() {
        let storage = Storage::open_in_memory().unwrap();
        let (a, _b, _c) = seed_chain(&storage);
        let graph = GraphTraversal::default();
        let estimator = |_: &str| 1u64;
        let first = graph
            .traverse(&storage, "r", &[a.clone()], None, 2, ExpansionStrategy::Breadth, 1000, "q", &estimator)
            .unwrap();
        assert!(!first.cache_hit);
        let second = graph
            .traverse(&storage, "r", &[a], None, 2, ExpansionStrategy::Breadth, 1000, "q", &estimator)
            .unwrap();
        assert!(second.cache_hit);
    }

    #[test]
    fn invalidate_touching_evicts_matching_entries() {
        let storage = Storage::open_in_memory().unwrap();
        let (a, b, _c) = seed_chain(&storage);
        let graph = GraphTraversal::default();
        let estimator = |_: &str| 1u64;
        graph
            .traverse(&storage, "r", &[a.clone()], None, 2, ExpansionStrategy::Breadth, 1000, "q", &estimator)
            .unwrap();
        let mut changed = HashSet::new();
        changed.insert(b);
        graph.invalidate_touching(&changed);
        let after = graph
            .traverse(&storage, "r", &[a], None, 2, ExpansionStrategy::Breadth, 1000, "q", &estimator)
            .unwrap();
        assert!(!after.cache_hit);
    }
}
