//! Context Assembler / Degrader: turns a ranked candidate list into a
//! token-budgeted `ContextBundle`, tier by tier, degrading progressively
//! when a tier would otherwise overflow its slice of the budget.
//!
//! Grounded on the teacher's `advanced::compression` (capsule /
//! compression-ratio / quality-score idiom, `CompressedMemory`) and
//! `consolidation::phases` (named-phase, smallest-that-fits processing
//! idiom), generalized from memory compression to content-type-aware
//! context packing with six degradation levels instead of one.

use crate::evidence::EvidenceTrail;
use crate::graph::TraversalResult;
use crate::intent::Intent;
use crate::types::{CapsuleStrategy, TierBudgets};
use chrono::{DateTime, Utc};

/// Content type an assembled item is classified into, from path and
/// content heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContentType {
    Code,
    Test,
    Doc,
    Config,
    Example,
    Comment,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Code => "code",
            ContentType::Test => "test",
            ContentType::Doc => "doc",
            ContentType::Config => "config",
            ContentType::Example => "example",
            ContentType::Comment => "comment",
        }
    }
}

/// Classify an item by path first (most reliable signal), then content.
pub fn classify_content_type(path: &str, content: &str) -> ContentType {
    let lower = path.to_lowercase();
    if lower.contains("/test/") || lower.contains(".test.") || lower.contains("__tests__") {
        ContentType::Test
    } else if lower.ends_with(".md") || lower.ends_with(".rst") || lower.contains("readme") {
        ContentType::Doc
    } else if lower.ends_with(".env")
        || lower.ends_with(".yaml")
        || lower.ends_with(".yml")
        || lower.ends_with(".toml")
        || lower.ends_with("package.json")
    {
        ContentType::Config
    } else if lower.contains("/example/") || lower.contains("demo") {
        ContentType::Example
    } else if content.trim_start().starts_with("//") || content.trim_start().starts_with('#') {
        ContentType::Comment
    } else {
        ContentType::Code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    MustHave,
    Important,
    Supplementary,
    Optional,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::MustHave => "must_have",
            Tier::Important => "important",
            Tier::Supplementary => "supplementary",
            Tier::Optional => "optional",
        }
    }

    fn budget(&self, tiers: &TierBudgets) -> u64 {
        match self {
            Tier::MustHave => tiers.must_have,
            Tier::Important => tiers.important,
            Tier::Supplementary => tiers.supplementary,
            Tier::Optional => tiers.optional,
        }
    }
}

/// Threshold over adjusted priority above which an item lands in each
/// tier, checked top-down.
const TIER_THRESHOLDS: [(f32, Tier); 3] =
    [(0.75, Tier::MustHave), (0.5, Tier::Important), (0.25, Tier::Supplementary)];

fn tier_for(priority: f32) -> Tier {
    for (threshold, tier) in TIER_THRESHOLDS {
        if priority >= threshold {
            return tier;
        }
    }
    Tier::Optional
}

/// Per-intent content-type boost. Unlisted combinations default to 1.0.
fn intent_multiplier(intent: Intent, content_type: ContentType) -> f32 {
    use ContentType::*;
    use Intent::*;
    match (intent, content_type) {
        (Symbol, Code) | (Symbol, Example) => 1.3,
        (Incident, Code) | (Incident, Test) => 1.3,
        (Config, ContentType::Config) | (Config, Doc) => 1.3,
        (Api, Code) | (Api, Example) => 1.3,
        (Search, Doc) => 1.3,
        _ => 1.0,
    }
}

/// Progressive degradation level, lowest first. The engine escalates one
/// level at a time until a tier's items fit its budget slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DegradationLevel {
    None = 0,
    DropLowest = 1,
    SmartHeadTail = 2,
    Capsule = 3,
    TitlesOnly = 4,
    Emergency = 5,
}

impl DegradationLevel {
    fn next(self) -> Option<Self> {
        match self {
            DegradationLevel::None => Some(DegradationLevel::DropLowest),
            DegradationLevel::DropLowest => Some(DegradationLevel::SmartHeadTail),
            DegradationLevel::SmartHeadTail => Some(DegradationLevel::Capsule),
            DegradationLevel::Capsule => Some(DegradationLevel::TitlesOnly),
            DegradationLevel::TitlesOnly => Some(DegradationLevel::Emergency),
            DegradationLevel::Emergency => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapsuleMetadata {
    pub content_type: ContentType,
    pub preserved_elements: Vec<String>,
    pub quality_score: f32,
    pub compression_ratio: f32,
}

/// A candidate item fed into `assemble`, already resolved to its content.
#[derive(Debug, Clone)]
pub struct AssemblyItem {
    pub id: String,
    pub path: String,
    pub content: String,
    /// Fused relevance score from hybrid search, typically in `[0,1]`-ish
    /// range but not strictly bounded (RRF scores aren't normalized).
    pub score: f32,
    /// Weight of the strongest contributing evidence source.
    pub source_weight: f32,
    /// Symbol/entity name associated with this item, if any — checked
    /// against the query's extracted entities for a priority boost.
    pub entity_name: Option<String>,
    /// Provenance accumulated upstream (search contributions, graph hops,
    /// memory backing) — carried through unchanged into the assembled item.
    pub evidence: EvidenceTrail,
}

#[derive(Debug, Clone)]
pub struct AssembledItem {
    pub id: String,
    pub path: String,
    pub content_type: ContentType,
    pub tier: Tier,
    pub priority: f32,
    pub tokens: u64,
    pub content: String,
    pub capsule: Option<CapsuleMetadata>,
    pub degraded: bool,
    pub evidence: EvidenceTrail,
}

#[derive(Debug, Clone)]
pub struct SourceGroup {
    pub content_type: ContentType,
    pub items: Vec<AssembledItem>,
    pub tokens: u64,
}

#[derive(Debug, Clone)]
pub struct AppliedDegradation {
    pub level: u8,
    pub quality_score: f32,
    pub capsules_created: u32,
    pub strategy: String,
    pub items_processed: u32,
}

#[derive(Debug, Clone)]
pub struct OptimizedReport {
    pub strategy: String,
    pub truncated: bool,
    pub budget_used: f32,
    pub applied: AppliedDegradation,
}

#[derive(Debug, Clone)]
pub struct SavingsReport {
    pub original_tokens: u64,
    pub degraded_tokens: u64,
    pub savings_percentage: f32,
}

#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub query: String,
    pub sources: Vec<SourceGroup>,
    pub total_tokens: u64,
    pub budget: u64,
    pub budget_used: f32,
    pub assembled_at: DateTime<Utc>,
    pub graph_enhanced: bool,
    pub intent: Option<Intent>,
    pub graph_performance: Option<TraversalResult>,
    pub optimized: OptimizedReport,
    pub savings: SavingsReport,
}

pub struct AssembleOptions<'a> {
    pub intent: Intent,
    pub entities: Vec<String>,
    pub tiers: TierBudgets,
    pub capsule: CapsuleStrategy,
    pub graph: Option<TraversalResult>,
    pub estimator: &'a dyn Fn(&str) -> u64,
}

fn entity_boost(entities: &[String], item: &AssemblyItem) -> f32 {
    let haystack = format!("{} {}", item.path, item.entity_name.as_deref().unwrap_or(""));
    let haystack_lower = haystack.to_lowercase();
    if entities.iter().any(|e| !e.is_empty() && haystack_lower.contains(&e.to_lowercase())) {
        1.2
    } else {
        1.0
    }
}

/// Smart head-tail truncation: keep the first and last `keep_chars / 2`
/// characters, elide the middle with a sentinel. Falls back to returning
/// the content unchanged if it's already short enough.
fn smart_head_tail(content: &str, keep_chars: usize) -> String {
    if content.len() <= keep_chars || keep_chars < 32 {
        return content.to_string();
    }
    let half = keep_chars / 2;
    let head = &content[..content.floor_char_boundary(half)];
    let tail_start = content.len() - half;
    let tail = &content[content.floor_char_boundary(tail_start)..];
    format!("{head}\n/* ... elided {} chars ... */\n{tail}", content.len() - head.len() - tail.len())
}

trait FloorCharBoundary {
    fn floor_char_boundary(&self, idx: usize) -> usize;
}

impl FloorCharBoundary for str {
    fn floor_char_boundary(&self, idx: usize) -> usize {
        let mut i = idx.min(self.len());
        while i > 0 && !self.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

fn titles_only(content: &str, content_type: ContentType) -> String {
    content
        .lines()
        .filter(|l| match content_type {
            ContentType::Doc => l.trim_start().starts_with('#'),
            ContentType::Code | ContentType::Example => {
                let t = l.trim_start();
                t.starts_with("fn ")
                    || t.starts_with("pub fn ")
                    || t.starts_with("struct ")
                    || t.starts_with("class ")
                    || t.starts_with("def ")
                    || t.starts_with("impl ")
            }
            _ => false,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Type-aware capsule: preserve the structural elements each content type
/// is defined by, fall back to head-tail when nothing structural is
/// found or the resulting quality estimate is below `quality_threshold`.
fn make_capsule(item: &AssemblyItem, content_type: ContentType, strategy: &CapsuleStrategy) -> (String, CapsuleMetadata) {
    let preserved: Vec<String> = match content_type {
        ContentType::Code | ContentType::Example => item
            .content
            .lines()
            .filter(|l| {
                let t = l.trim_start();
                t.starts_with("fn ")
                    || t.starts_with("pub fn ")
                    || t.starts_with("struct ")
                    || t.starts_with("class ")
                    || t.starts_with("def ")
                    || t.starts_with("impl ")
            })
            .map(str::to_string)
            .collect(),
        ContentType::Test => item
            .content
            .lines()
            .filter(|l| {
                let t = l.trim_start();
                t.starts_with("describe(") || t.starts_with("it(") || t.starts_with("#[test]") || t.starts_with("assert")
            })
            .map(str::to_string)
            .collect(),
        ContentType::Doc => item
            .content
            .lines()
            .filter(|l| l.trim_start().starts_with('#') || l.trim_start().starts_with("```"))
            .map(str::to_string)
            .collect(),
        ContentType::Config | ContentType::Comment => Vec::new(),
    };

    let body = if preserved.is_empty() {
        smart_head_tail(&item.content, strategy.min_size.max(64) as usize)
    } else {
        preserved.join("\n")
    };
    let compression_ratio = if item.content.is_empty() { 1.0 } else { body.len() as f32 / item.content.len() as f32 };
    let quality_score = if preserved.is_empty() { 0.3 } else { (0.5 + 0.5 * (1.0 - compression_ratio)).clamp(0.0, 1.0) };

    if quality_score < strategy.quality_threshold {
        let minimal = format!("[content compressed: {} -> {} chars]", item.content.len(), body.len());
        return (
            minimal,
            CapsuleMetadata {
                content_type,
                preserved_elements: Vec::new(),
                quality_score,
                compression_ratio,
            },
        );
    }
    (
        body,
        CapsuleMetadata {
            content_type,
            preserved_elements: preserved,
            quality_score,
            compression_ratio,
        },
    )
}

/// Pack one tier's candidates under its budget slice, escalating
/// degradation level by level until everything fits (or Emergency is
/// reached, which always fits since it reduces every item to a single
/// line).
#[allow(clippy::too_many_arguments)]
fn pack_tier(
    tier: Tier,
    mut candidates: Vec<(AssemblyItem, ContentType, f32)>,
    budget: u64,
    capsule_strategy: &CapsuleStrategy,
    estimator: &dyn Fn(&str) -> u64,
) -> (Vec<AssembledItem>, DegradationLevel, u32, f32) {
    candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut level = DegradationLevel::None;
    let mut capsules_created = 0u32;
    let mut quality_sum = 0.0f32;
    let mut quality_count = 0u32;

    loop {
        let mut assembled = Vec::new();
        let mut used = 0u64;
        capsules_created = 0;
        quality_sum = 0.0;
        quality_count = 0;

        for (item, content_type, priority) in &candidates {
            let (content, capsule, degraded) = match level {
                DegradationLevel::None => (item.content.clone(), None, false),
                DegradationLevel::DropLowest => (item.content.clone(), None, false),
                DegradationLevel::SmartHeadTail => {
                    let target_chars = (budget as usize).saturating_mul(4).max(128);
                    (smart_head_tail(&item.content, target_chars), None, true)
                }
                DegradationLevel::Capsule => {
                    let (body, meta) = make_capsule(item, *content_type, capsule_strategy);
                    capsules_created += 1;
                    quality_sum += meta.quality_score;
                    quality_count += 1;
                    (body, Some(meta), true)
                }
                DegradationLevel::TitlesOnly => (titles_only(&item.content, *content_type), None, true),
                DegradationLevel::Emergency => (format!("{}: {}", item.path, item.entity_name.as_deref().unwrap_or(&item.id)), None, true),
            };
            let tokens = estimator(&content);

            if level == DegradationLevel::DropLowest && used + tokens > budget {
                continue;
            }
            if used + tokens > budget && !assembled.is_empty() {
                break;
            }
            used += tokens;
            assembled.push(AssembledItem {
                id: item.id.clone(),
                path: item.path.clone(),
                content_type: *content_type,
                tier,
                priority: *priority,
                tokens,
                content,
                capsule,
                degraded,
                evidence: item.evidence.clone(),
            });
        }

        // `DropLowest` can legitimately empty a tier out (every candidate
        // individually overflows the slice) without that being a genuine
        // fit — keep escalating toward capsule/titles/emergency instead of
        // reporting success on an empty tier that still had candidates.
        let fits = (used <= budget && (!assembled.is_empty() || candidates.is_empty()))
            || level == DegradationLevel::Emergency;
        if fits || level.next().is_none() {
            let avg_quality = if quality_count > 0 { quality_sum / quality_count as f32 } else { 1.0 };
            return (assembled, level, capsules_created, avg_quality);
        }
        level = level.next().unwrap();
    }
}

/// Assemble a query's candidate items into a token-budgeted bundle.
pub fn assemble(query: &str, items: &[AssemblyItem], profile_priorities: &std::collections::BTreeMap<String, f32>, options: AssembleOptions) -> ContextBundle {
    let original_tokens: u64 = items.iter().map(|i| (options.estimator)(&i.content)).sum();

    let mut staged: Vec<(AssemblyItem, ContentType, f32)> = items
        .iter()
        .cloned()
        .map(|item| {
            let content_type = classify_content_type(&item.path, &item.content);
            let type_priority = *profile_priorities.get(content_type.as_str()).unwrap_or(&0.5);
            let base = type_priority * item.score.max(0.0) * item.source_weight.max(0.0);
            let adjusted = base * intent_multiplier(options.intent, content_type) * entity_boost(&options.entities, &item);
            (item, content_type, adjusted.clamp(0.0, 5.0))
        })
        .collect();
    staged.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut by_tier: std::collections::BTreeMap<Tier, Vec<(AssemblyItem, ContentType, f32)>> = std::collections::BTreeMap::new();
    for entry in staged {
        let tier = tier_for(entry.2);
        by_tier.entry(tier).or_default().push(entry);
    }

    let mut all_assembled: Vec<AssembledItem> = Vec::new();
    let mut worst_level = DegradationLevel::None;
    let mut total_capsules = 0u32;
    let mut quality_scores = Vec::new();

    for tier in [Tier::MustHave, Tier::Important, Tier::Supplementary, Tier::Optional] {
        let Some(candidates) = by_tier.remove(&tier) else { continue };
        let budget = tier.budget(&options.tiers);
        let (assembled, level, capsules, quality) = pack_tier(tier, candidates, budget, &options.capsule, options.estimator);
        if level > worst_level {
            worst_level = level;
        }
        total_capsules += capsules;
        if capsules > 0 {
            quality_scores.push(quality);
        }
        all_assembled.extend(assembled);
    }

    let mut sources: std::collections::BTreeMap<&'static str, SourceGroup> = std::collections::BTreeMap::new();
    for item in &all_assembled {
        let group = sources.entry(item.content_type.as_str()).or_insert_with(|| SourceGroup {
            content_type: item.content_type,
            items: Vec::new(),
            tokens: 0,
        });
        group.tokens += item.tokens;
        group.items.push(item.clone());
    }
    let sources: Vec<SourceGroup> = sources.into_values().collect();

    let total_tokens: u64 = all_assembled.iter().map(|i| i.tokens).sum();
    let total_budget = options.tiers.sum();
    let budget_used = if total_budget == 0 { 0.0 } else { (total_tokens as f32 / total_budget as f32).clamp(0.0, 1.0) };
    let truncated = all_assembled.len() < items.len() || worst_level != DegradationLevel::None;
    let avg_quality = if quality_scores.is_empty() {
        1.0
    } else {
        quality_scores.iter().sum::<f32>() / quality_scores.len() as f32
    };

    let savings_percentage = if original_tokens == 0 {
        0.0
    } else {
        (1.0 - total_tokens as f32 / original_tokens as f32).clamp(0.0, 1.0) * 100.0
    };

    ContextBundle {
        query: query.to_string(),
        sources,
        total_tokens,
        budget: total_budget,
        budget_used,
        assembled_at: Utc::now(),
        graph_enhanced: options.graph.is_some(),
        intent: Some(options.intent),
        graph_performance: options.graph,
        optimized: OptimizedReport {
            strategy: "tier-pack".to_string(),
            truncated,
            budget_used,
            applied: AppliedDegradation {
                level: worst_level as u8,
                quality_score: avg_quality,
                capsules_created: total_capsules,
                strategy: match worst_level {
                    DegradationLevel::None => "none",
                    DegradationLevel::DropLowest => "drop-lowest",
                    DegradationLevel::SmartHeadTail => "smart-head-tail",
                    DegradationLevel::Capsule => "capsule",
                    DegradationLevel::TitlesOnly => "titles-only",
                    DegradationLevel::Emergency => "emergency",
                }
                .to_string(),
                items_processed: all_assembled.len() as u32,
            },
        },
        savings: SavingsReport {
            original_tokens,
            degraded_tokens: total_tokens,
            savings_percentage,
        },
    }
}

/// Options for the pure Markdown renderer.
#[derive(Debug, Clone)]
pub struct MarkdownOptions {
    pub emoji: bool,
    pub max_table_rows: usize,
    pub include_metadata: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self { emoji: false, max_table_rows: 50, include_metadata: true }
    }
}

/// Render a bundle to Markdown: headings per source group, an evidence
/// table, and a token report. Pure function of `(bundle, options)`.
pub fn render_markdown(bundle: &ContextBundle, options: &MarkdownOptions) -> String {
    let mut out = String::new();
    let check = if options.emoji { "\u{2705} " } else { "" };
    out.push_str(&format!("# Context for: {}\n\n", bundle.query));

    for group in &bundle.sources {
        out.push_str(&format!("## {}{} ({} tokens)\n\n", check, group.content_type.as_str(), group.tokens));
        for item in &group.items {
            out.push_str(&format!("### {}\n\n", item.path));
            out.push_str("```\n");
            out.push_str(&item.content);
            out.push_str("\n```\n\n");
        }
    }

    out.push_str("## Evidence\n\n");
    out.push_str("| path | type | tier | tokens |\n|---|---|---|---|\n");
    let mut rows = 0usize;
    for group in &bundle.sources {
        for item in &group.items {
            if rows >= options.max_table_rows {
                out.push_str(&format!("| ... {} more rows omitted ... | | | |\n", bundle.total_tokens.saturating_sub(rows as u64)));
                break;
            }
            out.push_str(&format!("| {} | {} | {} | {} |\n", item.path, item.content_type.as_str(), item.tier.as_str(), item.tokens));
            rows += 1;
        }
    }

    out.push_str("\n## Token report\n\n");
    out.push_str(&format!(
        "- total: {} / {} ({:.0}% used)\n",
        bundle.total_tokens,
        bundle.budget,
        bundle.budget_used * 100.0
    ));
    out.push_str(&format!(
        "- degradation: {} (level {})\n",
        bundle.optimized.applied.strategy, bundle.optimized.applied.level
    ));
    if bundle.optimized.applied.capsules_created > 0 {
        out.push_str(&format!(
            "- capsules created: {} (avg quality {:.2})\n",
            bundle.optimized.applied.capsules_created, bundle.optimized.applied.quality_score
        ));
    }
    out.push_str(&format!(
        "- savings: {} -> {} tokens ({:.1}%)\n",
        bundle.savings.original_tokens, bundle.savings.degraded_tokens, bundle.savings.savings_percentage
    ));

    if options.include_metadata {
        out.push_str(&format!("\n_assembled at {} for intent {:?}_\n", bundle.assembled_at.to_rfc3339(), bundle.intent));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator(s: &str) -> u64 {
        (s.len() as u64 / 4).max(1)
    }

    fn tiers(total: u64) -> TierBudgets {
        TierBudgets {
            must_have: total * 4 / 10,
            important: total * 3 / 10,
            supplementary: total * 2 / 10,
            optional: total / 10,
            reserve: 0,
        }
    }

    fn item(id: &str, path: &str, content: &str, score: f32) -> AssemblyItem {
        AssemblyItem {
            id: id.to_string(),
            path: path.to_string(),
            content: content.to_string(),
            score,
            source_weight: 1.0,
            entity_name: None,
            evidence: EvidenceTrail::new(),
        }
    }

    #[test]
    fn classifies_by_path() {
        assert_eq!(classify_content_type("src/foo.test.rs", "x"), ContentType::Test);
        assert_eq!(classify_content_type("README.md", "x"), ContentType::Doc);
        assert_eq!(classify_content_type("config.toml", "x"), ContentType::Config);
        assert_eq!(classify_content_type("examples/demo.rs", "x"), ContentType::Example);
        assert_eq!(classify_content_type("src/lib.rs", "fn main() {}"), ContentType::Code);
    }

    #[test]
    fn high_score_item_lands_in_must_have() {
        let items = vec![item("a", "src/a.rs", "fn a() {}", 1.0)];
        let priorities = crate::storage::default_priorities();
        let bundle = assemble(
            "q",
            &items,
            &priorities,
            AssembleOptions {
                intent: Intent::Symbol,
                entities: vec![],
                tiers: tiers(4000),
                capsule: CapsuleStrategy::default(),
                graph: None,
                estimator: &estimator,
            },
        );
        assert_eq!(bundle.sources[0].items[0].tier, Tier::MustHave);
    }

    #[test]
    fn degrades_when_tier_overflows() {
        let big_content = "x".repeat(10_000);
        let items: Vec<AssemblyItem> = (0..20).map(|i| item(&format!("a{i}"), "src/a.rs", &big_content, 1.0)).collect();
        let priorities = crate::storage::default_priorities();
        let bundle = assemble(
            "q",
            &items,
            &priorities,
            AssembleOptions {
                intent: Intent::Symbol,
                entities: vec![],
                tiers: tiers(1000),
                capsule: CapsuleStrategy::default(),
                graph: None,
                estimator: &estimator,
            },
        );
        assert!(bundle.optimized.applied.level > 0);
        assert!(bundle.total_tokens <= bundle.budget || bundle.optimized.applied.level == DegradationLevel::Emergency as u8);
    }

    #[test]
    fn entity_match_boosts_tier() {
        let mut low = item("a", "src/a.rs", "fn a() {}", 0.3);
        low.entity_name = Some("handle_request".to_string());
        let priorities = crate::storage::default_priorities();
        let bundle = assemble(
            "q",
            &[low],
            &priorities,
            AssembleOptions {
                intent: Intent::Search,
                entities: vec!["handle_request".to_string()],
                tiers: tiers(4000),
                capsule: CapsuleStrategy::default(),
                graph: None,
                estimator: &estimator,
            },
        );
        assert!(bundle.sources[0].items[0].priority > 0.3);
    }

    #[test]
    fn markdown_emission_includes_token_report() {
        let items = vec![item("a", "src/a.rs", "fn a() {}", 1.0)];
        let priorities = crate::storage::default_priorities();
        let bundle = assemble(
            "q",
            &items,
            &priorities,
            AssembleOptions {
                intent: Intent::Symbol,
                entities: vec![],
                tiers: tiers(4000),
                capsule: CapsuleStrategy::default(),
                graph: None,
                estimator: &estimator,
            },
        );
        let md = render_markdown(&bundle, &MarkdownOptions::default());
        assert!(md.contains("Token report"));
        assert!(md.contains("src/a.rs"));
    }

    #[test]
    fn evidence_trail_survives_assembly() {
        use crate::evidence::Evidence;
        use crate::search::EvidenceSource;

        let mut with_evidence = item("a", "src/a.rs", "fn a() {}", 1.0);
        with_evidence
            .evidence
            .push(Evidence::Search { source: EvidenceSource::Bm25, rank: 0, score: 1.0 });
        let priorities = crate::storage::default_priorities();
        let bundle = assemble(
            "q",
            &[with_evidence],
            &priorities,
            AssembleOptions {
                intent: Intent::Symbol,
                entities: vec![],
                tiers: tiers(4000),
                capsule: CapsuleStrategy::default(),
                graph: None,
                estimator: &estimator,
            },
        );
        assert!(!bundle.sources[0].items[0].evidence.is_empty());
        assert_eq!(bundle.sources[0].items[0].evidence.search_sources(), vec![EvidenceSource::Bm25]);
    }
}
