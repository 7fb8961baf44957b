//! Seed-Mix Optimizer: derives source weights and traversal limits from
//! intent, confidence, and policy.

use crate::intent::Intent;
use crate::policy::RetrievalPolicy;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const WEIGHT_RANGE: (f32, f32) = (0.0, 5.0);
const DEFAULT_RRF_K: f32 = 60.0;
const DEFAULT_DROP_RATIO: f32 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub vector_weight: f32,
    pub bm25_weight: f32,
    pub memory_weight: f32,
    pub symbol_weight: f32,
    pub max_depth: u32,
    pub early_stop_threshold: u32,
    pub confidence_multiplier: f32,
    pub rrf_k: f32,
    pub drop_ratio: f32,
}

fn clamp_weight(v: f32) -> f32 {
    v.clamp(WEIGHT_RANGE.0, WEIGHT_RANGE.1)
}

fn baseline_weights(intent: Intent) -> (f32, f32, f32, f32, f32) {
    // (vector, bm25, memory, symbol, confidence_multiplier)
    match intent {
        Intent::Symbol => (1.5, 1.0, 0.5, 3.0, 1.3),
        Intent::Config => (1.0, 2.5, 1.5, 0.5, 1.0),
        Intent::Api => (1.5, 1.5, 0.5, 2.0, 1.1),
        Intent::Incident => (1.0, 1.0, 3.0, 0.5, 1.2),
        Intent::Search => (1.5, 1.5, 1.0, 1.0, 1.0),
    }
}

/// Confidence band -> (max_depth scale, early_stop scale, weight multiplier).
/// Below 0.4 the caller collapses depth/threshold to their minima; at or
/// above 0.6 the weight multiplier scales up further, with an extra boost
/// once confidence reaches 0.7.
fn confidence_band(confidence: f32) -> (f32, f32, f32) {
    if confidence < 0.4 {
        (0.0, 0.0, 1.0)
    } else if confidence >= 0.7 {
        (1.0, 1.0, 1.3)
    } else if confidence >= 0.6 {
        (1.0, 1.0, 1.15)
    } else {
        (1.0, 1.0, 1.0)
    }
}

fn fingerprint(intent: Intent, confidence: f32, policy: &RetrievalPolicy) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let band = (confidence * 10.0) as u32;
    let mut hasher = DefaultHasher::new();
    intent.as_str().hash(&mut hasher);
    band.hash(&mut hasher);
    policy.max_depth.hash(&mut hasher);
    policy.early_stop_threshold.hash(&mut hasher);
    policy.include_symbols.hash(&mut hasher);
    policy.include_files.hash(&mut hasher);
    policy.include_content.hash(&mut hasher);
    for (label, weight) in &policy.seed_weights {
        label.hash(&mut hasher);
        (*weight as u32).hash(&mut hasher);
    }
    hasher.finish()
}

/// Instance-scoped cache in front of `optimize()`'s derivation, the same
/// shape as `GraphTraversal`'s traversal cache: owned by whoever holds the
/// optimizer, not process-global state. Construct one per `Storage`/session
/// and reuse it across calls.
pub struct SeedMixOptimizer {
    entries: Mutex<LruCache<u64, RetrievalConfig>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for SeedMixOptimizer {
    fn default() -> Self {
        Self::new(512)
    }
}

impl SeedMixOptimizer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Hit-rate telemetry for this optimizer's result cache: `(hits, misses)`.
    pub fn cache_stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    /// Derive a Retrieval Config from `(intent, confidence, policy)`. Results
    /// are cached by a fingerprint of intent class, confidence band, and
    /// policy; callers never see a stale config across distinct inputs.
    pub fn optimize(&self, intent: Intent, confidence: f32, policy: &RetrievalPolicy) -> RetrievalConfig {
        let confidence = confidence.clamp(0.0, 1.0);
        let key = fingerprint(intent, confidence, policy);
        if let Some(hit) = self.entries.lock().unwrap().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let (vector, bm25, memory, symbol, base_multiplier) = baseline_weights(intent);
        let (depth_scale, stop_scale, band_multiplier) = confidence_band(confidence);

        let (max_depth, early_stop_threshold) = if confidence < 0.4 {
            (1, 1)
        } else {
            (
                ((policy.max_depth as f32) * depth_scale).round().max(1.0) as u32,
                ((policy.early_stop_threshold as f32) * stop_scale).round().max(1.0) as u32,
            )
        };

        let multiplier = base_multiplier * band_multiplier;
        let config = RetrievalConfig {
            vector_weight: clamp_weight(vector * multiplier),
            bm25_weight: clamp_weight(bm25),
            memory_weight: clamp_weight(memory),
            symbol_weight: clamp_weight(symbol * multiplier),
            max_depth: max_depth.clamp(1, 10),
            early_stop_threshold: early_stop_threshold.clamp(1, 50),
            confidence_multiplier: multiplier,
            rrf_k: DEFAULT_RRF_K,
            drop_ratio: DEFAULT_DROP_RATIO,
        };
        self.entries.lock().unwrap().put(key, config.clone());
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{build_policy, ContextHints};

    #[test]
    fn low_confidence_collapses_depth_and_threshold() {
        let policy = build_policy(Intent::Symbol, 0.3, false, &ContextHints::default(), None);
        let optimizer = SeedMixOptimizer::default();
        let config = optimizer.optimize(Intent::Symbol, 0.3, &policy);
        assert_eq!(config.max_depth, 1);
        assert_eq!(config.early_stop_threshold, 1);
    }

    #[test]
    fn symbol_intent_boosts_symbol_weight() {
        let policy = build_policy(Intent::Symbol, 0.8, false, &ContextHints::default(), None);
        let optimizer = SeedMixOptimizer::default();
        let config = optimizer.optimize(Intent::Symbol, 0.8, &policy);
        assert!(config.symbol_weight > config.memory_weight);
    }

    #[test]
    fn incident_intent_boosts_memory_weight() {
        let policy = build_policy(Intent::Incident, 0.8, false, &ContextHints::default(), None);
        let optimizer = SeedMixOptimizer::default();
        let config = optimizer.optimize(Intent::Incident, 0.8, &policy);
        assert!(config.memory_weight > config.symbol_weight);
    }

    #[test]
    fn all_weights_stay_within_declared_range() {
        let policy = build_policy(Intent::Api, 1.0, false, &ContextHints::default(), None);
        let optimizer = SeedMixOptimizer::default();
        let config = optimizer.optimize(Intent::Api, 1.0, &policy);
        for w in [config.vector_weight, config.bm25_weight, config.memory_weight, config.symbol_weight] {
            assert!((0.0..=5.0).contains(&w));
        }
    }

    #[test]
    fn repeated_calls_are_served_from_cache() {
        let policy = build_policy(Intent::Config, 0.9, false, &ContextHints::default(), None);
        let optimizer = SeedMixOptimizer::default();
        let before = optimizer.cache_stats();
        let _ = optimizer.optimize(Intent::Config, 0.9, &policy);
        let _ = optimizer.optimize(Intent::Config, 0.9, &policy);
        let after = optimizer.cache_stats();
        assert!(after.0 > before.0);
    }
}
