//! `pampax search`: classify intent, build a retrieval policy, run the
//! hybrid search orchestrator, and report ranked hits with provenance.

use std::sync::Arc;

use colored::Colorize;
use pampax_core::error::Result;
use pampax_core::graph::GraphTraversal;
use pampax_core::intent::{Intent, IntentClassifier};
use pampax_core::policy::{build_policy, ContextHints};
use pampax_core::retrieval::SeedMixOptimizer;
use pampax_core::storage::Storage;
use pampax_core::EmbeddingProvider;
use pampax_core::HybridSearchOrchestrator;
use serde::Serialize;

use crate::collaborators::HashEmbeddingProvider;
use crate::commands::{debug_lower, truncate};

/// Flat token budget handed to the graph expansion stage. Not yet exposed
/// as a CLI flag; packing-profile-derived budgets are out of scope here.
const DEFAULT_TOKEN_BUDGET: u64 = 4096;

#[derive(Serialize)]
pub struct EntityReport {
    pub entity_type: String,
    pub text: String,
    pub position: usize,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub sources: Vec<String>,
    pub preview: Option<String>,
}

#[derive(Serialize)]
pub struct SearchReport {
    pub query: String,
    pub intent: String,
    pub confidence: f32,
    pub forced: bool,
    pub degraded: bool,
    pub graph_enhanced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<EntityReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_policies: Option<Vec<String>>,
    pub hits: Vec<SearchHit>,
}

fn resolve_preview(storage: &Storage, id: &str) -> Option<String> {
    if let Ok(Some(chunk)) = storage.find_chunk_by_id(id) {
        return Some(truncate(&chunk.content, 160));
    }
    if let Ok(Some(span)) = storage.find_span_by_id(id) {
        return Some(truncate(&span.signature.unwrap_or(span.name), 160));
    }
    None
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    storage: Arc<Storage>,
    graph: Arc<GraphTraversal>,
    optimizer: &SeedMixOptimizer,
    repo: &str,
    query: &str,
    intent_override: Option<Intent>,
    policy_override: Option<Intent>,
    limit: usize,
    include_symbols: bool,
    explain_intent: bool,
) -> Result<SearchReport> {
    let classifier = IntentClassifier::new();
    let classification = match intent_override {
        Some(intent) => classifier.force_intent(query, intent),
        None => classifier.classify(query),
    };

    let policy_intent = policy_override.unwrap_or(classification.intent);
    let hints = ContextHints::default();
    let policy = build_policy(
        policy_intent,
        classification.confidence,
        classification.forced,
        &hints,
        None,
    );
    let retrieval_config = optimizer.optimize(policy_intent, classification.confidence, &policy);

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbeddingProvider::default());
    let orchestrator = HybridSearchOrchestrator::new(Arc::clone(&storage), Some(embedder), Arc::clone(&graph));

    let outcome = orchestrator
        .search(
            repo,
            query,
            &retrieval_config,
            limit,
            include_symbols || policy.include_symbols,
            DEFAULT_TOKEN_BUDGET,
        )
        .await?;

    let hits = outcome
        .candidates
        .into_iter()
        .map(|c| SearchHit {
            preview: resolve_preview(&storage, &c.id),
            sources: c.sources.into_iter().map(|(s, _)| debug_lower(s)).collect(),
            id: c.id,
            score: c.score,
        })
        .collect();

    let (entities, suggested_policies) = if explain_intent {
        let entities = classification
            .entities
            .iter()
            .map(|e| EntityReport {
                entity_type: debug_lower(e.entity_type),
                text: e.text.clone(),
                position: e.position,
            })
            .collect();
        (Some(entities), Some(classification.suggested_policies.clone()))
    } else {
        (None, None)
    };

    Ok(SearchReport {
        query: query.to_string(),
        intent: classification.intent.as_str().to_string(),
        confidence: classification.confidence,
        forced: classification.forced,
        degraded: outcome.degraded,
        graph_enhanced: outcome.graph.is_some(),
        entities,
        suggested_policies,
        hits,
    })
}

pub fn render_text(report: &SearchReport) {
    println!("{}", "=== Pampax Search ===".cyan().bold());
    println!("{}: {}", "Query".white().bold(), report.query);
    println!(
        "{}: {} (confidence {:.2}{})",
        "Intent".white().bold(),
        report.intent,
        report.confidence,
        if report.forced { ", forced" } else { "" }
    );
    if report.degraded {
        println!("{}", "one or more probes missed their deadline and degraded".yellow());
    }
    if report.graph_enhanced {
        println!("{}", "graph expansion contributed additional candidates".dimmed());
    }
    if let Some(entities) = &report.entities {
        println!("{}", "Entities:".white().bold());
        for e in entities {
            println!("  - {} [{}] @ {}", e.text, e.entity_type, e.position);
        }
    }
    if let Some(policies) = &report.suggested_policies {
        println!("{}: {}", "Suggested policies".white().bold(), policies.join(", "));
    }
    println!("{}", "Hits:".white().bold());
    for (i, hit) in report.hits.iter().enumerate() {
        println!(
            "  {}. {} (score {:.4}) [{}]",
            i + 1,
            hit.id,
            hit.score,
            hit.sources.join(",")
        );
        if let Some(preview) = &hit.preview {
            println!("     {}", preview.dimmed());
        }
    }
}
