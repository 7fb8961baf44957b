//! Reciprocal Rank Fusion over per-source ranked lists, generalized from
//! the teacher's two-source (keyword/semantic) fusion to four
//! (vector, bm25, memory, symbol) weighted sources.

use super::seedmix::RetrievalConfig;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Vector,
    Bm25,
    Memory,
    Symbol,
}

/// A fused result item: its id, combined score, and the per-source ranks
/// that contributed to it (preserved so evidence can cite provenance).
#[derive(Debug, Clone, PartialEq)]
pub struct RankedItem {
    pub id: String,
    pub score: f32,
    pub source_ranks: Vec<(Source, usize)>,
}

fn weight_for(config: &RetrievalConfig, source: Source) -> f32 {
    match source {
        Source::Vector => config.vector_weight,
        Source::Bm25 => config.bm25_weight,
        Source::Memory => config.memory_weight,
        Source::Symbol => config.symbol_weight,
    }
}

/// Fuse `sources` (each a ranked `(id, _)` list, rank implied by index)
/// into a single score-sorted list capped at `limit`. Ties break by rank
/// stability: more contributing sources, then better (lower) best rank.
pub fn fuse(sources: &[(Source, &[(String, f32)])], config: &RetrievalConfig, limit: usize) -> Vec<RankedItem> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut ranks: HashMap<String, Vec<(Source, usize)>> = HashMap::new();

    for (source, results) in sources {
        let weight = weight_for(config, *source);
        for (rank, (id, _)) in results.iter().enumerate() {
            *scores.entry(id.clone()).or_default() += weight * (1.0 / (config.rrf_k + rank as f32));
            ranks.entry(id.clone()).or_default().push((*source, rank));
        }
    }

    let mut items: Vec<RankedItem> = scores
        .into_iter()
        .map(|(id, score)| {
            let source_ranks = ranks.remove(&id).unwrap_or_default();
            RankedItem { id, score, source_ranks }
        })
        .collect();

    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.source_ranks.len().cmp(&a.source_ranks.len()))
            .then_with(|| {
                let a_best = a.source_ranks.iter().map(|(_, r)| *r).min().unwrap_or(usize::MAX);
                let b_best = b.source_ranks.iter().map(|(_, r)| *r).min().unwrap_or(usize::MAX);
                a_best.cmp(&b_best)
            })
    });
    items.truncate(limit);
    items
}

/// Walk a score-sorted list, emitting items until `threshold` is reached
/// or a significant score drop is detected (successive ratio below
/// `config.drop_ratio`), whichever first — but never below `threshold`
/// items when the decay observed up to that point is smooth.
pub fn early_stop(items: &[RankedItem], config: &RetrievalConfig) -> Vec<RankedItem> {
    let threshold = config.early_stop_threshold as usize;
    if items.len() <= threshold {
        return items.to_vec();
    }
    for i in threshold..items.len() {
        let prev = items[i - 1].score;
        let cur = items[i].score;
        if prev > 0.0 && cur / prev < config.drop_ratio {
            return items[..i].to_vec();
        }
    }
    items[..threshold].to_vec()
}
