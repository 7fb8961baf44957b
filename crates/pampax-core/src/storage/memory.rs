//! Memory item, session, and interaction operations.

use super::store::Storage;
use crate::error::Result;
use crate::types::{Interaction, MemoryItem, MemoryKind, MemoryScope, Session};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<MemoryItem> {
    let scope: String = row.get("scope")?;
    let kind: String = row.get("kind")?;
    let created: String = row.get("created_at")?;
    let expires: Option<String> = row.get("expires_at")?;
    Ok(MemoryItem {
        id: row.get("id")?,
        scope: MemoryScope::parse(&scope),
        kind: MemoryKind::parse(&kind),
        key: row.get("key")?,
        value: row.get("value")?,
        weight: row.get("weight")?,
        created_at: parse_ts(&created),
        expires_at: expires.map(|e| parse_ts(&e)),
        source_json: row.get("source_json")?,
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl Storage {
    pub fn insert_memory_item(&self, item: &MemoryItem) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO memory_items (id, scope, kind, key, value, weight, created_at, expires_at, source_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET value = excluded.value, weight = excluded.weight, expires_at = excluded.expires_at",
            params![
                item.id,
                item.scope.as_str(),
                item.kind.as_str(),
                item.key,
                item.value,
                item.weight,
                item.created_at.to_rfc3339(),
                item.expires_at.map(|e| e.to_rfc3339()),
                item.source_json,
            ],
        )
        .map_err(|e| crate::error::PampaxError::storage_constraint("memory_item", item.id.clone(), e))?;
        Ok(())
    }

    pub fn delete_memory_item(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM memory_items WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Lexical/weight-ranked memory search. Expired items are excluded
    /// unless `include_expired` is set. Ranking is a monotonic combination
    /// of substring match and weight (see Open Questions: the exact
    /// memory-item ranking formula is left to the implementer).
    pub fn search_memory(
        &self,
        scope: Option<MemoryScope>,
        query: &str,
        limit: usize,
        include_expired: bool,
    ) -> Result<Vec<MemoryItem>> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let like = format!("%{}%", query.replace('%', ""));
        let scope_str = scope.map(|s| s.as_str().to_string()).unwrap_or_default();
        let has_scope = scope.is_some();
        let sql = "SELECT * FROM memory_items
             WHERE (value LIKE ?1 ESCAPE '\\' OR key LIKE ?1 ESCAPE '\\')
             AND (?2 = 1 OR expires_at IS NULL OR expires_at > ?3)
             AND (?4 = 0 OR scope = ?5)
             ORDER BY weight DESC LIMIT ?6";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(
                params![
                    like,
                    include_expired as i64,
                    now,
                    has_scope as i64,
                    scope_str,
                    limit as i64
                ],
                row_to_memory,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (id, tool, user, repo, started_at, finished_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                session.tool,
                session.user,
                session.repo,
                session.started_at.to_rfc3339(),
                session.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn finish_session(&self, session_id: &str, finished_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sessions SET finished_at = ?2 WHERE id = ?1",
            params![session_id, finished_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Record an interaction. Ids are assigned by SQLite's AUTOINCREMENT,
    /// which is monotonically increasing within a session's insert order.
    pub fn record_interaction(
        &self,
        session_id: &str,
        query: &str,
        bundle_id: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO interactions (session_id, query, bundle_id, satisfied, notes, timestamp)
             VALUES (?1, ?2, ?3, 0, NULL, ?4)",
            params![session_id, query, bundle_id, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn mark_interaction_satisfaction(&self, interaction_id: i64, satisfied: i8) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE interactions SET satisfied = ?2 WHERE id = ?1",
            params![interaction_id, satisfied],
        )?;
        Ok(())
    }

    pub fn find_interactions_by_session(&self, session_id: &str) -> Result<Vec<Interaction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, query, bundle_id, satisfied, notes, timestamp
             FROM interactions WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                let ts: String = row.get(5)?;
                Ok(Interaction {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    query: row.get(2)?,
                    bundle_id: row.get(3)?,
                    satisfied: row.get(4)?,
                    notes: row.get(5).ok(),
                    timestamp: parse_ts(&ts),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn find_session(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, tool, user, repo, started_at, finished_at FROM sessions WHERE id = ?1",
            params![session_id],
            |row| {
                let started: String = row.get(4)?;
                let finished: Option<String> = row.get(5)?;
                Ok(Session {
                    id: row.get(0)?,
                    tool: row.get(1)?,
                    user: row.get(2)?,
                    repo: row.get(3)?,
                    started_at: parse_ts(&started),
                    finished_at: finished.map(|f| parse_ts(&f)),
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }
}
