//! Data model
//!
//! Plain, serializable structs for every entity. Ownership of the
//! on-disk representation belongs exclusively to [`crate::storage::Storage`];
//! every other component only ever sees these value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic kind of a [`Span`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Function,
    Class,
    Method,
    Module,
    Interface,
    Constant,
    Variable,
    Comment,
    Test,
    Other,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Function => "function",
            SpanKind::Class => "class",
            SpanKind::Method => "method",
            SpanKind::Module => "module",
            SpanKind::Interface => "interface",
            SpanKind::Constant => "constant",
            SpanKind::Variable => "variable",
            SpanKind::Comment => "comment",
            SpanKind::Test => "test",
            SpanKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "function" => SpanKind::Function,
            "class" => SpanKind::Class,
            "method" => SpanKind::Method,
            "module" => SpanKind::Module,
            "interface" => SpanKind::Interface,
            "constant" => SpanKind::Constant,
            "variable" => SpanKind::Variable,
            "comment" => SpanKind::Comment,
            "test" => SpanKind::Test,
            _ => SpanKind::Other,
        }
    }
}

/// A tracked source file. `content_hash` is the SHA-256 hex digest of the
/// file's bytes and is the identity key alongside `(repo, path)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: String,
    pub repo: String,
    pub path: String,
    pub content_hash: String,
    pub language: Option<String>,
    pub size: u64,
    pub modified_time: DateTime<Utc>,
}

/// A contiguous, semantically meaningful byte range inside a [`File`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    pub repo: String,
    pub path: String,
    pub byte_start: u64,
    pub byte_end: u64,
    pub kind: SpanKind,
    pub name: String,
    pub signature: Option<String>,
    pub doc: Option<String>,
    /// Chain of enclosing span names, outermost first (e.g. `["Foo", "bar"]`
    /// for method `bar` on class `Foo`).
    pub parents: Vec<String>,
}

/// Deterministic id derivation for a [`Span`]: a reindex of unchanged
/// content must reproduce identical ids so chunks/embeddings/references
/// keyed off them stay stable.
pub fn span_id(
    repo: &str,
    path: &str,
    byte_start: u64,
    byte_end: u64,
    kind: SpanKind,
    name: &str,
    signature: Option<&str>,
    doc: Option<&str>,
    parents: &[String],
) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    repo.hash(&mut hasher);
    path.hash(&mut hasher);
    byte_start.hash(&mut hasher);
    byte_end.hash(&mut hasher);
    kind.as_str().hash(&mut hasher);
    name.hash(&mut hasher);
    signature.unwrap_or("").hash(&mut hasher);
    doc.unwrap_or("").hash(&mut hasher);
    for p in parents {
        p.hash(&mut hasher);
    }
    format!("span_{:016x}", hasher.finish())
}

/// The embeddable text slice for a [`Span`]. Exactly one chunk per
/// embedding-format version per span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub span_id: String,
    pub content: String,
    pub content_hash: String,
}

pub fn chunk_id(span_id: &str, content_hash: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    span_id.hash(&mut hasher);
    content_hash.hash(&mut hasher);
    format!("chunk_{:016x}", hasher.finish())
}

/// A dense vector associated with a [`Chunk`] under a particular model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub chunk_id: String,
    pub model: String,
    pub dimension: u32,
    pub vector: Vec<f32>,
}

/// Directed edge kinds between spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Call,
    Import,
    Inherit,
    Implement,
    Reference,
    Define,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Call => "call",
            ReferenceKind::Import => "import",
            ReferenceKind::Inherit => "inherit",
            ReferenceKind::Implement => "implement",
            ReferenceKind::Reference => "reference",
            ReferenceKind::Define => "define",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "call" => ReferenceKind::Call,
            "import" => ReferenceKind::Import,
            "inherit" => ReferenceKind::Inherit,
            "implement" => ReferenceKind::Implement,
            "reference" => ReferenceKind::Reference,
            "define" => ReferenceKind::Define,
            _ => return None,
        })
    }
}

/// A directed reference edge `src_span_id -> (dst_path, byte range)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    pub src_span_id: String,
    pub dst_path: String,
    pub dst_byte_start: u64,
    pub dst_byte_end: u64,
    pub kind: ReferenceKind,
    pub confidence: f32,
}

/// Scope a [`MemoryItem`] is visible in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    Repo,
    Global,
    Session,
}

impl MemoryScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryScope::Repo => "repo",
            MemoryScope::Global => "global",
            MemoryScope::Session => "session",
        }
    }
    pub fn parse(s: &str) -> Self {
        match s {
            "global" => MemoryScope::Global,
            "session" => MemoryScope::Session,
            _ => MemoryScope::Repo,
        }
    }
}

/// Kind of a learned [`MemoryItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Fact,
    Gotcha,
    Decision,
    Rule,
    Insight,
    User,
    System,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Fact => "fact",
            MemoryKind::Gotcha => "gotcha",
            MemoryKind::Decision => "decision",
            MemoryKind::Rule => "rule",
            MemoryKind::Insight => "insight",
            MemoryKind::User => "user",
            MemoryKind::System => "system",
        }
    }
    pub fn parse(s: &str) -> Self {
        match s {
            "gotcha" => MemoryKind::Gotcha,
            "decision" => MemoryKind::Decision,
            "rule" => MemoryKind::Rule,
            "insight" => MemoryKind::Insight,
            "user" => MemoryKind::User,
            "system" => MemoryKind::System,
            _ => MemoryKind::Fact,
        }
    }
}

/// An item produced by the learning surface: a fact, gotcha, rule, etc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub scope: MemoryScope,
    pub kind: MemoryKind,
    pub key: Option<String>,
    pub value: String,
    pub weight: f32,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub source_json: Option<String>,
}

impl MemoryItem {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(false)
    }
}

/// A tool/user session. Owns many [`Interaction`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub tool: String,
    pub user: Option<String>,
    pub repo: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// One query/response round-trip within a [`Session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: i64,
    pub session_id: String,
    pub query: String,
    pub bundle_id: Option<String>,
    /// -1 = unsatisfied, 0 = unknown, 1 = satisfied
    pub satisfied: i8,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Budget allocation across the five priority tiers used by the context
/// assembler, plus a reserve for leftover, non-spilling budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierBudgets {
    pub must_have: u64,
    pub important: u64,
    pub supplementary: u64,
    pub optional: u64,
    pub reserve: u64,
}

impl TierBudgets {
    pub fn sum(&self) -> u64 {
        self.must_have + self.important + self.supplementary + self.optional + self.reserve
    }
}

/// Capsule-summarization configuration for a [`PackingProfile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapsuleStrategy {
    pub enabled: bool,
    pub min_size: u64,
    pub max_size: u64,
    pub preserve_structure: bool,
    pub quality_threshold: f32,
}

impl Default for CapsuleStrategy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: 64,
            max_size: 1024,
            preserve_structure: true,
            quality_threshold: 0.4,
        }
    }
}

/// (repository, model) keyed packing configuration: content-type
/// priorities, tier budget allocation, capsule/truncation strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackingProfile {
    pub id: String,
    pub repository: String,
    pub model: String,
    /// content-type -> priority in [0,1]
    pub priorities: std::collections::BTreeMap<String, f32>,
    pub total_budget: u64,
    pub tiers: TierBudgets,
    pub capsule: CapsuleStrategy,
    pub truncation_strategy: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ttl_seconds: Option<i64>,
    pub metadata: serde_json::Value,
}

impl PackingProfile {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_seconds {
            Some(ttl) => now.signed_duration_since(self.updated_at).num_seconds() > ttl,
            None => false,
        }
    }
}

/// Cached reranker output, bounded by capacity and age.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankCacheEntry {
    pub provider: String,
    pub model: String,
    pub query_hash: String,
    pub serialized_result: String,
    pub created_at: DateTime<Utc>,
}

/// Status of an indexing/embedding batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Ok,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Ok => "ok",
            JobStatus::Error => "error",
        }
    }
    pub fn parse(s: &str) -> Self {
        match s {
            "ok" => JobStatus::Ok,
            "error" => JobStatus::Error,
            _ => JobStatus::Running,
        }
    }
}

/// One row per indexing/embedding batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: String,
    pub kind: String,
    pub status: JobStatus,
    pub error_text: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Aggregate statistics over a repository's indexed content, used to
/// synthesize a Packing Profile when none exists yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepoStats {
    pub file_count: u64,
    pub avg_chunk_size: f64,
    /// Fraction of files whose language looks documentation-oriented
    /// (markdown/restructured text) or whose spans carry doc comments.
    pub documentation_ratio: f64,
    /// Fraction of files in the single most common language.
    pub dominant_language_ratio: f64,
}
