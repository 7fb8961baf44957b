//! Evidence Tracker: typed provenance records attached to each item in a
//! context bundle, so a caller can explain why an item was included
//! rather than just that it was.
//!
//! Grounded on the `SearchResult`/`MatchType` tagging idiom in the
//! teacher's `memory/mod.rs` — there a result carries `keyword_score`,
//! `semantic_score`, and a `MatchType` alongside the combined score; here
//! the same shape generalizes to the four hybrid-search sources plus
//! graph, intent, learning, cache, and performance provenance.

use crate::intent::Intent;
use crate::search::EvidenceSource;
use crate::types::{MemoryKind, ReferenceKind};
use serde::{Deserialize, Serialize};

/// One piece of provenance for why a context item was included, or how it
/// was produced. An item typically accumulates several — e.g. a `Search`
/// record for its fused rank, a `Graph` record if it arrived via
/// expansion, and a `Cache` record for the embedding lookup that scored it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    /// Matched by one of the four hybrid-search probes at the given
    /// pre-fusion rank (0 = best) and raw score.
    Search {
        source: EvidenceSource,
        rank: usize,
        score: f32,
    },
    /// Pulled in by graph expansion from a seed span, `hops` edges away
    /// via `kind` edges.
    Graph {
        from_span: String,
        kind: ReferenceKind,
        hops: u32,
    },
    /// The query's classified intent that shaped this item's tier
    /// priority (via `intent_multiplier`).
    Intent { intent: Intent, confidence: f32 },
    /// Backed by a memory item from the learning surface.
    Learning {
        memory_id: String,
        kind: MemoryKind,
        weight: f32,
    },
    /// An embedding or packing-profile cache lookup that contributed to
    /// this item's score or packing.
    Cache { cache_name: &'static str, hit: bool },
    /// Timing for a named pipeline stage, surfaced for slow-path
    /// diagnosis rather than scoring.
    Performance { stage: &'static str, elapsed_ms: u64 },
}

impl Evidence {
    /// The `kind` discriminant as emitted in JSON, for grouping/filtering
    /// without matching the full enum.
    pub fn kind(&self) -> &'static str {
        match self {
            Evidence::Search { .. } => "search",
            Evidence::Graph { .. } => "graph",
            Evidence::Intent { .. } => "intent",
            Evidence::Learning { .. } => "learning",
            Evidence::Cache { .. } => "cache",
            Evidence::Performance { .. } => "performance",
        }
    }
}

/// Evidence accumulated for one context item, in the order it was
/// recorded (first evidence tends to be the strongest signal).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceTrail(pub Vec<Evidence>);

impl EvidenceTrail {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, evidence: Evidence) -> &mut Self {
        self.0.push(evidence);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every distinct search source that contributed, in first-seen order.
    pub fn search_sources(&self) -> Vec<EvidenceSource> {
        let mut seen = Vec::new();
        for e in &self.0 {
            if let Evidence::Search { source, .. } = e {
                if !seen.contains(source) {
                    seen.push(*source);
                }
            }
        }
        seen
    }

    /// Whether graph expansion contributed any evidence for this item.
    pub fn graph_enhanced(&self) -> bool {
        self.0.iter().any(|e| matches!(e, Evidence::Graph { .. }))
    }

    /// Sum of elapsed time across recorded performance stages, for a
    /// coarse per-item cost estimate.
    pub fn total_elapsed_ms(&self) -> u64 {
        self.0
            .iter()
            .filter_map(|e| match e {
                Evidence::Performance { elapsed_ms, .. } => Some(*elapsed_ms),
                _ => None,
            })
            .sum()
    }
}

/// Build the `Search` evidence records for one fused candidate from its
/// `(EvidenceSource, rank)` contributions, as produced by
/// [`crate::search::SearchCandidate::sources`].
pub fn search_evidence(contributions: &[(EvidenceSource, usize)], fused_score: f32) -> Vec<Evidence> {
    contributions
        .iter()
        .map(|(source, rank)| Evidence::Search {
            source: *source,
            rank: *rank,
            score: fused_score,
        })
        .collect()
}
