//! Span table operations.

use super::store::Storage;
use crate::error::Result;
use crate::types::{Span, SpanKind};
use rusqlite::{params, OptionalExtension};

fn row_to_span(row: &rusqlite::Row) -> rusqlite::Result<Span> {
    let parents_json: String = row.get("parents")?;
    let kind: String = row.get("kind")?;
    Ok(Span {
        id: row.get("id")?,
        repo: row.get("repo")?,
        path: row.get("path")?,
        byte_start: row.get::<_, i64>("byte_start")? as u64,
        byte_end: row.get::<_, i64>("byte_end")? as u64,
        kind: SpanKind::parse(&kind),
        name: row.get("name")?,
        signature: row.get("signature")?,
        doc: row.get("doc")?,
        parents: serde_json::from_str(&parents_json).unwrap_or_default(),
    })
}

impl Storage {
    /// Insert a span. Because [`crate::types::span_id`] is deterministic,
    /// reindexing unchanged content re-derives the same id and this becomes
    /// an idempotent upsert.
    pub fn insert_span(&self, span: &Span) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let parents_json = serde_json::to_string(&span.parents).unwrap_or_else(|_| "[]".into());
        conn.execute(
            "INSERT INTO spans (id, repo, path, byte_start, byte_end, kind, name, signature, doc, parents)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                byte_start = excluded.byte_start,
                byte_end = excluded.byte_end,
                name = excluded.name,
                signature = excluded.signature,
                doc = excluded.doc,
                parents = excluded.parents",
            params![
                span.id,
                span.repo,
                span.path,
                span.byte_start as i64,
                span.byte_end as i64,
                span.kind.as_str(),
                span.name,
                span.signature,
                span.doc,
                parents_json,
            ],
        )
        .map_err(|e| crate::error::PampaxError::storage_constraint("span", span.id.clone(), e))?;
        Ok(())
    }

    /// Delete a span. `ON DELETE CASCADE` on `chunks`, `embeddings` (via
    /// chunks), and `"references"` removes every dependent row.
    pub fn delete_span(&self, span_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM spans WHERE id = ?1", params![span_id])?;
        Ok(())
    }

    pub fn find_span_by_id(&self, span_id: &str) -> Result<Option<Span>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM spans WHERE id = ?1", params![span_id], row_to_span)
            .optional()
            .map_err(Into::into)
    }

    pub fn find_spans_by_path(&self, repo: &str, path: &str) -> Result<Vec<Span>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM spans WHERE repo = ?1 AND path = ?2 ORDER BY byte_start")?;
        let rows = stmt
            .query_map(params![repo, path], row_to_span)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn find_spans_in_byte_range(
        &self,
        repo: &str,
        path: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<Span>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM spans WHERE repo = ?1 AND path = ?2
             AND byte_start < ?4 AND byte_end > ?3
             ORDER BY byte_start",
        )?;
        let rows = stmt
            .query_map(params![repo, path, start as i64, end as i64], row_to_span)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn find_spans_by_kind(&self, repo: &str, kind: SpanKind) -> Result<Vec<Span>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM spans WHERE repo = ?1 AND kind = ?2 ORDER BY path")?;
        let rows = stmt
            .query_map(params![repo, kind.as_str()], row_to_span)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Case-insensitive substring/prefix search over span names.
    pub fn search_symbols_by_name(
        &self,
        repo: &str,
        pattern: &str,
        limit: usize,
        lang: Option<&str>,
    ) -> Result<Vec<Span>> {
        let conn = self.conn.lock().unwrap();
        let like = format!("%{}%", pattern.replace('%', "").replace('_', ""));
        let rows = if let Some(lang) = lang {
            let mut stmt = conn.prepare(
                "SELECT s.* FROM spans s JOIN files f ON f.repo = s.repo AND f.path = s.path
                 WHERE s.repo = ?1 AND s.name LIKE ?2 ESCAPE '\\' AND f.language = ?3
                 ORDER BY length(s.name) ASC LIMIT ?4",
            )?;
            stmt.query_map(params![repo, like, lang, limit as i64], row_to_span)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = conn.prepare(
                "SELECT * FROM spans WHERE repo = ?1 AND name LIKE ?2 ESCAPE '\\'
                 ORDER BY length(name) ASC LIMIT ?3",
            )?;
            stmt.query_map(params![repo, like, limit as i64], row_to_span)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
    }
}
