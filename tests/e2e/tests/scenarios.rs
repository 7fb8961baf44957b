//! End-to-end scenarios exercising the public `pampax-core` API the way a
//! caller (the CLI, or an embedding host) actually would: seed storage
//! directly, run the real components, assert on their output.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use pampax_core::assemble::{assemble, AssembleOptions, AssemblyItem};
use pampax_core::error::{PampaxError, Result};
use pampax_core::evidence::EvidenceTrail;
use pampax_core::graph::{ExpansionStrategy, GraphTraversal};
use pampax_core::intent::{EntityType, Intent, IntentClassifier};
use pampax_core::policy::{build_policy, ContextHints};
use pampax_core::reliability::{CircuitBreaker, CircuitBreakerConfig, Operation};
use pampax_core::storage::{default_priorities, Storage};
use pampax_core::types::{span_id, CapsuleStrategy, Chunk, Reference, ReferenceKind, Span, SpanKind, TierBudgets};

fn seed_file_with_span(
    storage: &Storage,
    repo: &str,
    path: &str,
    name: &str,
    kind: SpanKind,
    content: &str,
) -> String {
    storage
        .upsert_file(repo, path, "h", Some("javascript"), content.len() as u64, Utc::now())
        .unwrap();
    let id = span_id(repo, path, 0, content.len() as u64, kind, name, None, None, &[]);
    storage
        .insert_span(&Span {
            id: id.clone(),
            repo: repo.to_string(),
            path: path.to_string(),
            byte_start: 0,
            byte_end: content.len() as u64,
            kind,
            name: name.to_string(),
            signature: None,
            doc: None,
            parents: vec![],
        })
        .unwrap();
    let chunk = Chunk {
        id: format!("chunk_{name}"),
        span_id: id.clone(),
        content: content.to_string(),
        content_hash: "h".to_string(),
    };
    storage.insert_chunk(&chunk).unwrap();
    id
}

/// Resolve a fused-candidate id (a chunk id) back to the file path it came
/// from, mirroring what the CLI's search report does for a preview.
fn path_for_chunk(storage: &Storage, chunk_id: &str) -> Option<String> {
    let chunk = storage.find_chunk_by_id(chunk_id).ok()??;
    let span = storage.find_span_by_id(&chunk.span_id).ok()??;
    Some(span.path)
}

// --- S1: symbol intent ------------------------------------------------

#[test]
fn s1_symbol_query_classifies_and_finds_definition() {
    let classifier = IntentClassifier::new();
    let result = classifier.classify("getUserById function");
    assert_eq!(result.intent, Intent::Symbol);
    assert!(result.confidence > 0.2, "confidence was {}", result.confidence);
    assert!(result
        .entities
        .iter()
        .any(|e| e.entity_type == EntityType::Function && e.text.contains("getUserById")));

    let storage = Storage::open_in_memory().unwrap();
    seed_file_with_span(
        &storage,
        "repo",
        "user.js",
        "getUserById",
        SpanKind::Function,
        "function getUserById(id) { return db.users.find(id); }",
    );
    seed_file_with_span(
        &storage,
        "repo",
        "other.js",
        "unrelated",
        SpanKind::Function,
        "function unrelated() { return 1; }",
    );

    let hits = storage.fts_search("getUserById", 10).unwrap();
    assert!(!hits.is_empty());
    let top_path = path_for_chunk(&storage, &hits[0].0).unwrap();
    assert_eq!(top_path, "user.js");
}

// --- S2: incident intent ----------------------------------------------

#[test]
fn s2_incident_query_classifies_and_finds_error_site() {
    let classifier = IntentClassifier::new();
    let result = classifier.classify("authentication error bug");
    assert_eq!(result.intent, Intent::Incident);
    assert!(result.confidence > 0.2, "confidence was {}", result.confidence);

    let storage = Storage::open_in_memory().unwrap();
    seed_file_with_span(
        &storage,
        "repo",
        "error.js",
        "ValidationError",
        SpanKind::Class,
        "class ValidationError extends Error { constructor(msg) { super(msg); } }",
    );
    seed_file_with_span(
        &storage,
        "repo",
        "user.js",
        "getUserById",
        SpanKind::Function,
        "function getUserById(id) { return db.users.find(id); }",
    );

    let hits = storage.fts_search("error", 10).unwrap();
    assert!(!hits.is_empty());
    let top_path = path_for_chunk(&storage, &hits[0].0).unwrap();
    assert_eq!(top_path, "error.js");
}

// --- S3: forced intent override ----------------------------------------

#[test]
fn s3_forced_intent_pins_confidence_and_policy() {
    let classifier = IntentClassifier::new();
    let result = classifier.force_intent("anything", Intent::Config);
    assert_eq!(result.intent, Intent::Config);
    assert_eq!(result.confidence, 1.0);
    assert!(result.forced);

    let forced_policy = build_policy(Intent::Config, result.confidence, result.forced, &ContextHints::default(), None);
    let baseline_policy = build_policy(Intent::Config, 1.0, false, &ContextHints::default(), None);
    assert_eq!(forced_policy.max_depth, baseline_policy.max_depth);
    assert_eq!(forced_policy.early_stop_threshold, baseline_policy.early_stop_threshold);
    assert_eq!(forced_policy.seed_weights, baseline_policy.seed_weights);
    assert!(forced_policy.forced);
}

// --- S4: graph expansion cap --------------------------------------------

fn seed_call_chain(storage: &Storage) -> (String, String, String) {
    storage.upsert_file("repo", "auth.js", "h", None, 1, Utc::now()).unwrap();
    storage.upsert_file("repo", "user.js", "h", None, 1, Utc::now()).unwrap();
    storage.upsert_file("repo", "model.js", "h", None, 1, Utc::now()).unwrap();

    let authenticate = span_id("repo", "auth.js", 0, 10, SpanKind::Function, "authenticate", None, None, &[]);
    let validate_user = span_id("repo", "user.js", 0, 10, SpanKind::Function, "validateUser", None, None, &[]);
    let user_model = span_id("repo", "model.js", 0, 10, SpanKind::Class, "UserModel", None, None, &[]);

    for (id, path, name, kind) in [
        (&authenticate, "auth.js", "authenticate", SpanKind::Function),
        (&validate_user, "user.js", "validateUser", SpanKind::Function),
        (&user_model, "model.js", "UserModel", SpanKind::Class),
    ] {
        storage
            .insert_span(&Span {
                id: id.clone(),
                repo: "repo".to_string(),
                path: path.to_string(),
                byte_start: 0,
                byte_end: 10,
                kind,
                name: name.to_string(),
                signature: None,
                doc: None,
                parents: vec![],
            })
            .unwrap();
    }

    storage
        .insert_reference(&Reference {
            id: "ref_auth_validate".to_string(),
            src_span_id: authenticate.clone(),
            dst_path: "user.js".to_string(),
            dst_byte_start: 0,
            dst_byte_end: 10,
            kind: ReferenceKind::Call,
            confidence: 0.9,
        })
        .unwrap();
    storage
        .insert_reference(&Reference {
            id: "ref_validate_model".to_string(),
            src_span_id: validate_user.clone(),
            dst_path: "model.js".to_string(),
            dst_byte_start: 0,
            dst_byte_end: 10,
            kind: ReferenceKind::Call,
            confidence: 0.9,
        })
        .unwrap();

    (authenticate, validate_user, user_model)
}

#[test]
fn s4_graph_neighbors_cap_bounds_expansion_depth() {
    let storage = Storage::open_in_memory().unwrap();
    let (authenticate, validate_user, user_model) = seed_call_chain(&storage);
    let graph = GraphTraversal::default();
    let estimator = |_: &str| 1u64;

    let two_hops = graph
        .traverse(&storage, "repo", &[authenticate.clone()], None, 2, ExpansionStrategy::Breadth, 10_000, "authenticate", &estimator)
        .unwrap();
    assert!(two_hops.visited_nodes.contains(&validate_user));
    assert!(two_hops.visited_nodes.contains(&user_model));

    let one_hop = graph
        .traverse(&storage, "repo", &[authenticate], None, 1, ExpansionStrategy::Breadth, 10_000, "authenticate", &estimator)
        .unwrap();
    assert!(one_hop.visited_nodes.contains(&validate_user));
    assert!(!one_hop.visited_nodes.contains(&user_model));
}

// --- S5: progressive degradation under a tight budget -------------------

/// A "medium" item: a one-line function header (the only part `make_capsule`
/// preserves for code) followed by enough filler body that it must be
/// truncated or capsule-compressed once the tier budget gets tight.
fn medium_item(i: usize) -> AssemblyItem {
    let filler: String = (0..6)
        .map(|l| format!("    // filler body line {l} padding item {i} out to a realistic size\n"))
        .collect();
    let content = format!("fn handler_{i}() {{\n{filler}}}");
    AssemblyItem {
        id: format!("item_{i}"),
        path: format!("src/handler_{i}.rs"),
        content,
        score: 1.0 - (i as f32 * 0.01),
        source_weight: 1.0,
        entity_name: None,
        evidence: EvidenceTrail::new(),
    }
}

fn char_estimator(s: &str) -> u64 {
    (s.len() as u64 / 4).max(1)
}

#[test]
fn s5_degrades_only_when_budget_is_tight() {
    let items: Vec<AssemblyItem> = (0..20).map(medium_item).collect();
    let priorities = default_priorities();

    // All 20 items land in the `important` tier under the default
    // priorities (see `classify_content_type`/`intent_multiplier`), so a
    // roomy budget concentrated there fits everything without degrading.
    let roomy = assemble(
        "handler",
        &items,
        &priorities,
        AssembleOptions {
            intent: Intent::Symbol,
            entities: vec![],
            tiers: TierBudgets { must_have: 0, important: 5000, supplementary: 0, optional: 0, reserve: 0 },
            capsule: CapsuleStrategy::default(),
            graph: None,
            estimator: &char_estimator,
        },
    );
    assert_eq!(roomy.optimized.applied.level, 0);

    // Same items, but the tier they land in gets only a sliver of the
    // 500-token total (the rest is held in `reserve`, unusable by any
    // tier) — too little even for one head-tail-truncated item, forcing
    // escalation all the way to capsule compression.
    let tight = assemble(
        "handler",
        &items,
        &priorities,
        AssembleOptions {
            intent: Intent::Symbol,
            entities: vec![],
            tiers: TierBudgets { must_have: 0, important: 10, supplementary: 0, optional: 0, reserve: 490 },
            capsule: CapsuleStrategy::default(),
            graph: None,
            estimator: &char_estimator,
        },
    );
    assert!(tight.optimized.applied.level >= 3, "level was {}", tight.optimized.applied.level);
    assert!(tight.total_tokens <= 500, "total_tokens was {}", tight.total_tokens);
    assert!(
        tight.sources.iter().flat_map(|s| &s.items).any(|i| i.capsule.is_some()),
        "expected at least one capsule in a heavily degraded bundle"
    );
}

// --- S6: circuit breaker fails fast without touching the failing op ----

struct FailingStorageProbe {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Operation<(), ()> for FailingStorageProbe {
    async fn call(&self, _input: ()) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PampaxError::StorageIo("simulated storage outage".to_string()))
    }
}

#[tokio::test]
async fn s6_circuit_opens_after_threshold_and_skips_the_inner_call() {
    let calls = Arc::new(AtomicU32::new(0));
    let breaker = CircuitBreaker::new(
        FailingStorageProbe { calls: Arc::clone(&calls) },
        "storage_probe",
        CircuitBreakerConfig { failure_threshold: 2, recovery_timeout: Duration::from_secs(30) },
    );

    assert!(breaker.call(()).await.is_err());
    assert!(breaker.call(()).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let start = Instant::now();
    let fourth = breaker.call(()).await;
    let elapsed = start.elapsed();

    match fourth {
        Err(PampaxError::CircuitOpen(name)) => assert_eq!(name, "storage_probe"),
        other => panic!("expected circuit open, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2, "circuit open must not invoke the inner operation again");
    assert!(elapsed < Duration::from_millis(10), "fast-fail took {elapsed:?}");
}
