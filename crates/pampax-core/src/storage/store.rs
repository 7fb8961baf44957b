//! Storage Engine core: connection lifecycle, pragmas, migrations, health.

use super::migrations::MIGRATIONS;
use crate::error::{PampaxError, Result};
use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Single-writer, many-reader embedded store. Holds one writer connection
/// behind a mutex (Storage is the single writer per the concurrency model)
/// and reuses it for reads too, since SQLite WAL already lets external
/// readers run concurrently against the file on disk.
pub struct Storage {
    pub(crate) conn: Mutex<Connection>,
    pub(crate) db_path: PathBuf,
}

impl Storage {
    /// Open (creating if necessary) the store at `db_path`, or the
    /// platform-default `<data dir>/pampax/pampax.sqlite` if `None`.
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj = ProjectDirs::from("dev", "pampax", "pampax").ok_or_else(|| {
                    PampaxError::Internal("could not determine project directories".to_string())
                })?;
                let dir = proj.data_dir();
                std::fs::create_dir_all(dir)?;
                dir.join("pampax.sqlite")
            }
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Self::configure_connection(&conn)?;
        let storage = Self {
            conn: Mutex::new(conn),
            db_path: path,
        };
        storage.migrate(None)?;
        Ok(storage)
    }

    /// Open an in-memory store, primarily for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        let storage = Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        };
        storage.migrate(None)?;
        Ok(storage)
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn current_version(conn: &Connection) -> Result<u32> {
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations'",
                [],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if !exists {
            return Ok(0);
        }
        let version: Option<u32> = conn
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(None);
        Ok(version.unwrap_or(0))
    }

    /// Apply every pending migration in version order, each inside its own
    /// transaction. Re-running past the highest applied version is a no-op.
    /// If `to` is given, apply only up to that version.
    pub fn migrate(&self, to: Option<u32>) -> Result<u32> {
        let mut conn = self.conn.lock().unwrap();
        let target = to.unwrap_or(u32::MAX);
        loop {
            let current = Self::current_version(&conn)?;
            let next = MIGRATIONS
                .iter()
                .find(|m| m.version == current + 1 && m.version <= target);
            let Some(migration) = next else { break };
            let tx = conn.transaction()?;
            tx.execute_batch(migration.up)?;
            tx.execute(
                "CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL)",
                [],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![migration.version, Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
        }
        Self::current_version(&conn)
    }

    /// Roll back to schema version `n`: run `down` scripts for every
    /// migration above `n`, highest version first.
    pub fn rollback_to(&self, n: u32) -> Result<u32> {
        let mut conn = self.conn.lock().unwrap();
        let mut versions: Vec<_> = MIGRATIONS.iter().filter(|m| m.version > n).collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        for migration in versions {
            let tx = conn.transaction()?;
            tx.execute_batch(migration.down)?;
            tx.execute(
                "DELETE FROM schema_migrations WHERE version = ?1",
                rusqlite::params![migration.version],
            )?;
            tx.commit()?;
        }
        Self::current_version(&conn)
    }

    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        Self::current_version(&conn)
    }

    /// Repopulate the FTS shadow table from `chunks` (used after bulk loads
    /// or to repair drift).
    pub fn rebuild_fts_index(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "INSERT INTO chunks_fts(chunks_fts) VALUES ('rebuild');",
        )?;
        Ok(())
    }

    /// Per-table reachability plus current schema version.
    pub fn health_check(&self) -> HealthReport {
        let conn = self.conn.lock().unwrap();
        let tables = [
            "files", "spans", "chunks", "embeddings", "\"references\"",
            "memory_items", "sessions", "interactions", "packing_profiles",
            "rerank_cache", "job_runs",
        ];
        let mut reachable = Vec::new();
        for t in tables {
            let ok = conn
                .query_row(&format!("SELECT 1 FROM {t} LIMIT 1"), [], |_| Ok(()))
                .map(|_| true)
                .unwrap_or_else(|e| matches!(e, rusqlite::Error::QueryReturnedNoRows));
            reachable.push((t.trim_matches('"').to_string(), ok));
        }
        let version = Self::current_version(&conn).unwrap_or(0);
        HealthReport {
            tables: reachable,
            schema_version: version,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub tables: Vec<(String, bool)>,
    pub schema_version: u32,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.tables.iter().all(|(_, ok)| *ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let s = Storage::open_in_memory().unwrap();
        let v1 = s.schema_version().unwrap();
        let v2 = s.migrate(None).unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1, MIGRATIONS.last().unwrap().version);
    }

    #[test]
    fn rollback_removes_tables() {
        let s = Storage::open_in_memory().unwrap();
        s.rollback_to(1).unwrap();
        assert_eq!(s.schema_version().unwrap(), 1);
        let conn = s.conn.lock().unwrap();
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name='memory_items'",
                [],
                |_| Ok(true),
            )
            .unwrap_or(false);
        assert!(!exists);
    }

    #[test]
    fn health_check_reports_all_tables() {
        let s = Storage::open_in_memory().unwrap();
        let report = s.health_check();
        assert!(report.healthy());
        assert_eq!(report.schema_version, MIGRATIONS.last().unwrap().version);
    }
}
