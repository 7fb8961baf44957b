//! Property-style checks against `pampax-core` invariants: identity
//! stability, cascade integrity, budget/ordering guarantees that must hold
//! regardless of the exact inputs exercised.

use chrono::Utc;

use pampax_core::assemble::{assemble, AssembleOptions, AssemblyItem};
use pampax_core::evidence::EvidenceTrail;
use pampax_core::graph::{ExpansionStrategy, GraphTraversal};
use pampax_core::intent::Intent;
use pampax_core::policy::{build_policy, ContextHints};
use pampax_core::retrieval::{early_stop, fuse, RankedItem, RetrievalConfig, SeedMixOptimizer, Source};
use pampax_core::storage::{default_priorities, Storage};
use pampax_core::types::{
    span_id, CapsuleStrategy, Chunk, Embedding, Reference, ReferenceKind, Span, SpanKind, TierBudgets,
};

fn seed_file_and_span(storage: &Storage, repo: &str, path: &str, name: &str) -> String {
    storage.upsert_file(repo, path, "h", None, 10, Utc::now()).unwrap();
    let id = span_id(repo, path, 0, 10, SpanKind::Function, name, None, None, &[]);
    storage
        .insert_span(&Span {
            id: id.clone(),
            repo: repo.to_string(),
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
    id
}

// --- 1: span identity stable across re-parse ---------------------------

#[test]
fn span_identity_is_stable_across_reparse() {
    let first = span_id("repo", "a.rs", 10, 40, SpanKind::Function, "foo", Some("fn foo()"), None, &[]);
    let second = span_id("repo", "a.rs", 10, 40, SpanKind::Function, "foo", Some("fn foo()"), None, &[]);
    assert_eq!(first, second);

    // Any field changing (here: the doc comment) must change the id —
    // otherwise a doc edit would silently alias onto the old span.
    let third = span_id("repo", "a.rs", 10, 40, SpanKind::Function, "foo", Some("fn foo()"), Some("docs"), &[]);
    assert_ne!(first, third);
}

// --- 2: content hash stability + File singleton per (repo, path) -------

#[test]
fn file_is_a_singleton_per_repo_and_path_across_hash_changes() {
    let storage = Storage::open_in_memory().unwrap();
    let first = storage.upsert_file("repo", "a.rs", "hash_v1", None, 100, Utc::now()).unwrap();
    let second = storage.upsert_file("repo", "a.rs", "hash_v2", None, 120, Utc::now()).unwrap();

    assert_eq!(first.id, second.id, "re-indexing the same (repo, path) must not mint a new file id");

    let stored = storage.find_file_by_path("repo", "a.rs").unwrap().unwrap();
    assert_eq!(stored.content_hash, "hash_v2", "the file row must reflect the latest content hash");
    assert_eq!(stored.size, 120);
}

// --- 3: cascade delete leaves no orphaned chunk/embedding/reference -----

#[test]
fn deleting_a_span_cascades_to_chunks_embeddings_and_references() {
    let storage = Storage::open_in_memory().unwrap();
    let span = seed_file_and_span(&storage, "repo", "a.rs", "caller");

    let chunk = Chunk {
        id: "chunk_1".to_string(),
        span_id: span.clone(),
        content: "fn caller() {}".to_string(),
        content_hash: "h".to_string(),
    };
    storage.insert_chunk(&chunk).unwrap();
    storage
        .insert_embedding(&Embedding { chunk_id: chunk.id.clone(), model: "test-model".to_string(), dimension: 3, vector: vec![1.0, 0.0, 0.0] })
        .unwrap();
    storage
        .insert_reference(&Reference {
            id: "ref_1".to_string(),
            src_span_id: span.clone(),
            dst_path: "b.rs".to_string(),
            dst_byte_start: 0,
            dst_byte_end: 5,
            kind: ReferenceKind::Call,
            confidence: 0.9,
        })
        .unwrap();

    storage.delete_span(&span).unwrap();

    assert!(storage.find_chunk_by_id("chunk_1").unwrap().is_none());
    assert!(storage.find_embeddings_by_chunk("chunk_1").unwrap().is_empty());
    assert!(storage.outgoing_edges(&span, None).unwrap().is_empty());
}

// --- 4: FTS shadow table has exactly one row per live chunk -------------

#[test]
fn fts_shadow_table_tracks_live_chunks_one_to_one() {
    let storage = Storage::open_in_memory().unwrap();
    let span = seed_file_and_span(&storage, "repo", "a.rs", "widget");
    for i in 0..5 {
        storage
            .insert_chunk(&Chunk {
                id: format!("chunk_{i}"),
                span_id: span.clone(),
                content: format!("unique_token_{i} widget body"),
                content_hash: format!("h{i}"),
            })
            .unwrap();
    }
    let hits = storage.fts_search("widget", 100).unwrap();
    assert_eq!(hits.len(), 5);

    storage.delete_chunk("chunk_0").unwrap();
    storage.delete_chunk("chunk_1").unwrap();
    let hits_after = storage.fts_search("widget", 100).unwrap();
    assert_eq!(hits_after.len(), 3);
    assert!(!hits_after.iter().any(|(id, _, _)| id == "chunk_0" || id == "chunk_1"));
}

// --- 5: budget invariant -------------------------------------------------

fn item(id: &str, content: &str, score: f32) -> AssemblyItem {
    AssemblyItem {
        id: id.to_string(),
        path: "src/a.rs".to_string(),
        content: content.to_string(),
        score,
        source_weight: 1.0,
        entity_name: None,
        evidence: EvidenceTrail::new(),
    }
}

fn char_estimator(s: &str) -> u64 {
    (s.len() as u64 / 4).max(1)
}

#[test]
fn assembled_bundle_never_exceeds_its_declared_budget() {
    let items: Vec<AssemblyItem> = (0..15).map(|i| item(&format!("i{i}"), &"y".repeat(500), 1.0 - i as f32 * 0.02)).collect();
    let priorities = default_priorities();
    let tiers = TierBudgets { must_have: 0, important: 300, supplementary: 0, optional: 0, reserve: 0 };

    let bundle = assemble(
        "q",
        &items,
        &priorities,
        AssembleOptions {
            intent: Intent::Search,
            entities: vec![],
            tiers,
            capsule: CapsuleStrategy::default(),
            graph: None,
            estimator: &char_estimator,
        },
    );

    assert!(bundle.total_tokens <= bundle.budget);
    for group in &bundle.sources {
        assert!(group.tokens <= bundle.budget);
    }
}

// --- 6: idempotent optimization -----------------------------------------

fn retrieval_config() -> RetrievalConfig {
    let policy = build_policy(Intent::Search, 0.8, false, &ContextHints::default(), None);
    SeedMixOptimizer::default().optimize(Intent::Search, 0.8, &policy)
}

#[test]
fn rrf_fusion_is_deterministic_across_repeated_runs() {
    let config = retrieval_config();
    let bm25: Vec<(String, f32)> = vec![("a".to_string(), 5.0), ("b".to_string(), 4.0), ("c".to_string(), 3.0)];
    let vector: Vec<(String, f32)> = vec![("b".to_string(), 0.9), ("a".to_string(), 0.8), ("d".to_string(), 0.5)];
    let symbol: Vec<(String, f32)> = vec![("a".to_string(), 1.0)];
    let sources: Vec<(Source, &[(String, f32)])> = vec![(Source::Bm25, &bm25), (Source::Vector, &vector), (Source::Symbol, &symbol)];

    let first = fuse(&sources, &config, 10);
    let second = fuse(&sources, &config, 10);
    assert_eq!(
        first.iter().map(|i: &RankedItem| i.id.clone()).collect::<Vec<_>>(),
        second.iter().map(|i: &RankedItem| i.id.clone()).collect::<Vec<_>>(),
    );
}

#[test]
fn degradation_is_a_no_op_when_budget_covers_the_original_sum() {
    let items: Vec<AssemblyItem> = (0..5).map(|i| item(&format!("i{i}"), "fn small() {}", 1.0 - i as f32 * 0.05)).collect();
    let priorities = default_priorities();
    let original_tokens: u64 = items.iter().map(|i| char_estimator(&i.content)).sum();

    let tiers = TierBudgets { must_have: 0, important: original_tokens * 10, supplementary: 0, optional: 0, reserve: 0 };
    let bundle = assemble(
        "q",
        &items,
        &priorities,
        AssembleOptions {
            intent: Intent::Search,
            entities: vec![],
            tiers,
            capsule: CapsuleStrategy::default(),
            graph: None,
            estimator: &char_estimator,
        },
    );
    assert_eq!(bundle.optimized.applied.level, 0);
    assert_eq!(bundle.sources.iter().flat_map(|s| &s.items).count(), items.len());
}

// --- 7: early-stop monotonicity ------------------------------------------

#[test]
fn early_stop_threshold_is_monotonic_in_the_cutoff() {
    let ranked = vec![
        RankedItem { id: "a".to_string(), score: 1.0, source_ranks: vec![] },
        RankedItem { id: "b".to_string(), score: 0.9, source_ranks: vec![] },
        RankedItem { id: "c".to_string(), score: 0.85, source_ranks: vec![] },
        RankedItem { id: "d".to_string(), score: 0.1, source_ranks: vec![] },
        RankedItem { id: "e".to_string(), score: 0.05, source_ranks: vec![] },
    ];
    let base = retrieval_config();

    let loose_cfg = RetrievalConfig { early_stop_threshold: 2, drop_ratio: 0.2, ..base.clone() };
    let tight_cfg = RetrievalConfig { early_stop_threshold: 4, drop_ratio: 0.2, ..base.clone() };
    let loose = early_stop(&ranked, &loose_cfg);
    let tight = early_stop(&ranked, &tight_cfg);
    assert!(tight.len() >= loose.len(), "raising the early-stop threshold must never remove results");

    let even_looser_cfg = RetrievalConfig { early_stop_threshold: 1, drop_ratio: 0.2, ..base };
    let even_looser = early_stop(&ranked, &even_looser_cfg);
    assert!(even_looser.len() <= loose.len(), "lowering the threshold must never add results");
}

// --- 8: policy clamping ----------------------------------------------------

#[test]
fn every_built_policy_satisfies_its_declared_ranges() {
    for intent in [Intent::Symbol, Intent::Config, Intent::Api, Intent::Incident, Intent::Search] {
        let hints = ContextHints { max_depth: Some(9_999), early_stop_threshold: Some(0), seed_weight_overrides: Default::default() };
        let policy = build_policy(intent, 5.0, false, &hints, None);
        assert!((1..=10).contains(&policy.max_depth), "max_depth {} out of range", policy.max_depth);
        assert!((1..=50).contains(&policy.early_stop_threshold), "early_stop_threshold {} out of range", policy.early_stop_threshold);
        assert!((0.0..=1.0).contains(&policy.confidence), "confidence {} out of range", policy.confidence);
        for (label, weight) in &policy.seed_weights {
            assert!((0.0..=5.0).contains(weight), "seed weight for {label} out of range: {weight}");
        }
    }
}

// --- 10: edge-kind filter -------------------------------------------------

#[test]
fn traversal_restricted_to_a_kind_set_never_visits_nodes_reached_only_outside_it() {
    let storage = Storage::open_in_memory().unwrap();
    let src = seed_file_and_span(&storage, "repo", "a.rs", "caller");
    storage.upsert_file("repo", "b.rs", "h", None, 10, Utc::now()).unwrap();
    storage.upsert_file("repo", "c.rs", "h", None, 10, Utc::now()).unwrap();

    let called = span_id("repo", "b.rs", 0, 10, SpanKind::Function, "called", None, None, &[]);
    let imported = span_id("repo", "c.rs", 0, 10, SpanKind::Function, "imported", None, None, &[]);
    for (id, path, name) in [(&called, "b.rs", "called"), (&imported, "c.rs", "imported")] {
        storage
            .insert_span(&Span {
                id: id.clone(),
                repo: "repo".to_string(),
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
            id: "ref_call".to_string(),
            src_span_id: src.clone(),
            dst_path: "b.rs".to_string(),
            dst_byte_start: 0,
            dst_byte_end: 10,
            kind: ReferenceKind::Call,
            confidence: 0.9,
        })
        .unwrap();
    storage
        .insert_reference(&Reference {
            id: "ref_import".to_string(),
            src_span_id: src.clone(),
            dst_path: "c.rs".to_string(),
            dst_byte_start: 0,
            dst_byte_end: 10,
            kind: ReferenceKind::Import,
            confidence: 0.9,
        })
        .unwrap();

    let graph = GraphTraversal::default();
    let estimator = |_: &str| 1u64;
    let result = graph
        .traverse(&storage, "repo", &[src], Some(&[ReferenceKind::Call]), 3, ExpansionStrategy::Breadth, 10_000, "q", &estimator)
        .unwrap();

    assert!(result.visited_nodes.contains(&called), "the Call-reachable node must be visited");
    assert!(!result.visited_nodes.contains(&imported), "a node reached only via Import must not be visited when the kind set excludes it");
}
