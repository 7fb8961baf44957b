//! Schema migrations
//!
//! Each migration carries both an `up` and a `down` SQL script so
//! `Storage::rollback_to` can remove the tables/triggers added above a
//! target version, per the storage engine's rollback contract.

/// A single schema migration.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: files, spans, chunks, embeddings, FTS, references",
        up: MIGRATION_V1_UP,
        down: MIGRATION_V1_DOWN,
    },
    Migration {
        version: 2,
        description: "Memory items, sessions, interactions",
        up: MIGRATION_V2_UP,
        down: MIGRATION_V2_DOWN,
    },
    Migration {
        version: 3,
        description: "Packing profiles, rerank cache, job runs",
        up: MIGRATION_V3_UP,
        down: MIGRATION_V3_DOWN,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    repo TEXT NOT NULL,
    path TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    language TEXT,
    size INTEGER NOT NULL DEFAULT 0,
    modified_time TEXT NOT NULL,
    UNIQUE(repo, path)
);
CREATE INDEX IF NOT EXISTS idx_files_content_hash ON files(repo, content_hash);

CREATE TABLE IF NOT EXISTS spans (
    id TEXT PRIMARY KEY,
    repo TEXT NOT NULL,
    path TEXT NOT NULL,
    byte_start INTEGER NOT NULL,
    byte_end INTEGER NOT NULL,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    signature TEXT,
    doc TEXT,
    parents TEXT NOT NULL DEFAULT '[]',
    FOREIGN KEY (repo, path) REFERENCES files(repo, path) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_spans_path ON spans(repo, path);
CREATE INDEX IF NOT EXISTS idx_spans_kind ON spans(kind);
CREATE INDEX IF NOT EXISTS idx_spans_range ON spans(repo, path, byte_start, byte_end);
CREATE INDEX IF NOT EXISTS idx_spans_name ON spans(name);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    span_id TEXT NOT NULL REFERENCES spans(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_span ON chunks(span_id);

CREATE TABLE IF NOT EXISTS embeddings (
    chunk_id TEXT NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    model TEXT NOT NULL,
    dimension INTEGER NOT NULL,
    vector BLOB NOT NULL,
    PRIMARY KEY (chunk_id, model)
);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    id UNINDEXED,
    content,
    content='chunks',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, id, content) VALUES (new.rowid, new.id, new.content);
END;
CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, id, content) VALUES ('delete', old.rowid, old.id, old.content);
END;
CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, id, content) VALUES ('delete', old.rowid, old.id, old.content);
    INSERT INTO chunks_fts(rowid, id, content) VALUES (new.rowid, new.id, new.content);
END;

CREATE TABLE IF NOT EXISTS "references" (
    id TEXT PRIMARY KEY,
    src_span_id TEXT NOT NULL REFERENCES spans(id) ON DELETE CASCADE,
    dst_path TEXT NOT NULL,
    dst_byte_start INTEGER NOT NULL,
    dst_byte_end INTEGER NOT NULL,
    kind TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0
);
CREATE INDEX IF NOT EXISTS idx_references_src ON "references"(src_span_id);
CREATE INDEX IF NOT EXISTS idx_references_dst ON "references"(dst_path, dst_byte_start, dst_byte_end);
CREATE INDEX IF NOT EXISTS idx_references_kind ON "references"(kind);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

const MIGRATION_V1_DOWN: &str = r#"
DROP TRIGGER IF EXISTS chunks_au;
DROP TRIGGER IF EXISTS chunks_ad;
DROP TRIGGER IF EXISTS chunks_ai;
DROP TABLE IF EXISTS chunks_fts;
DROP TABLE IF EXISTS "references";
DROP TABLE IF EXISTS embeddings;
DROP TABLE IF EXISTS chunks;
DROP TABLE IF EXISTS spans;
DROP TABLE IF EXISTS files;
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memory_items (
    id TEXT PRIMARY KEY,
    scope TEXT NOT NULL,
    kind TEXT NOT NULL,
    key TEXT,
    value TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    expires_at TEXT,
    source_json TEXT
);
CREATE INDEX IF NOT EXISTS idx_memory_scope ON memory_items(scope);
CREATE INDEX IF NOT EXISTS idx_memory_key ON memory_items(key);
CREATE INDEX IF NOT EXISTS idx_memory_expires ON memory_items(expires_at);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    tool TEXT NOT NULL,
    user TEXT,
    repo TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE TABLE IF NOT EXISTS interactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    query TEXT NOT NULL,
    bundle_id TEXT,
    satisfied INTEGER NOT NULL DEFAULT 0,
    notes TEXT,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_interactions_session ON interactions(session_id, id);
"#;

const MIGRATION_V2_DOWN: &str = r#"
DROP TABLE IF EXISTS interactions;
DROP TABLE IF EXISTS sessions;
DROP TABLE IF EXISTS memory_items;
"#;

const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS packing_profiles (
    id TEXT PRIMARY KEY,
    repository TEXT NOT NULL,
    model TEXT NOT NULL,
    priorities TEXT NOT NULL,
    total_budget INTEGER NOT NULL,
    tier_must_have INTEGER NOT NULL,
    tier_important INTEGER NOT NULL,
    tier_supplementary INTEGER NOT NULL,
    tier_optional INTEGER NOT NULL,
    tier_reserve INTEGER NOT NULL,
    capsule_json TEXT NOT NULL,
    truncation_strategy TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    ttl_seconds INTEGER,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    UNIQUE(repository, model)
);

CREATE TABLE IF NOT EXISTS rerank_cache (
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    query_hash TEXT NOT NULL,
    serialized_result TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (provider, model, query_hash)
);
CREATE INDEX IF NOT EXISTS idx_rerank_created ON rerank_cache(created_at);

CREATE TABLE IF NOT EXISTS job_runs (
    id TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    error_text TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    PRIMARY KEY (id, kind)
);
"#;

const MIGRATION_V3_DOWN: &str = r#"
DROP TABLE IF EXISTS job_runs;
DROP TABLE IF EXISTS rerank_cache;
DROP TABLE IF EXISTS packing_profiles;
"#;
