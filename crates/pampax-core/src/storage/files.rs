//! File table operations.

use super::store::Storage;
use crate::error::Result;
use crate::types::File;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<File> {
    let modified: String = row.get("modified_time")?;
    Ok(File {
        id: row.get("id")?,
        repo: row.get("repo")?,
        path: row.get("path")?,
        content_hash: row.get("content_hash")?,
        language: row.get("language")?,
        size: row.get::<_, i64>("size")? as u64,
        modified_time: DateTime::parse_from_rfc3339(&modified)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

impl Storage {
    /// Insert a new file row, or update it in place if `content_hash`
    /// changed. Span/chunk/embedding/reference ids are content-addressed
    /// (see `types::span_id`/`chunk_id`), so a changed hash means the spans
    /// extracted from the old content are stale: they're deleted here
    /// (cascading, via FK `ON DELETE CASCADE`, to their chunks/embeddings/
    /// references) before the row is updated, so the caller's fresh
    /// extraction lands on a clean slate instead of accumulating alongside
    /// superseded spans.
    pub fn upsert_file(
        &self,
        repo: &str,
        path: &str,
        content_hash: &str,
        language: Option<&str>,
        size: u64,
        modified_time: DateTime<Utc>,
    ) -> Result<File> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT id, content_hash FROM files WHERE repo = ?1 AND path = ?2",
                params![repo, path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((_, old_hash)) = &existing {
            if old_hash != content_hash {
                conn.execute(
                    "DELETE FROM spans WHERE repo = ?1 AND path = ?2",
                    params![repo, path],
                )?;
            }
        }
        let id = existing
            .map(|(id, _)| id)
            .unwrap_or_else(|| format!("file_{}", uuid::Uuid::new_v4()));
        conn.execute(
            "INSERT INTO files (id, repo, path, content_hash, language, size, modified_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(repo, path) DO UPDATE SET
                content_hash = excluded.content_hash,
                language = excluded.language,
                size = excluded.size,
                modified_time = excluded.modified_time",
            params![
                id,
                repo,
                path,
                content_hash,
                language,
                size as i64,
                modified_time.to_rfc3339()
            ],
        )
        .map_err(|e| crate::error::PampaxError::storage_constraint("file", format!("{repo}:{path}"), e))?;
        Ok(File {
            id,
            repo: repo.to_string(),
            path: path.to_string(),
            content_hash: content_hash.to_string(),
            language: language.map(str::to_string),
            size,
            modified_time,
        })
    }

    pub fn delete_file(&self, repo: &str, path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM spans WHERE repo = ?1 AND path = ?2",
            params![repo, path],
        )?;
        conn.execute(
            "DELETE FROM files WHERE repo = ?1 AND path = ?2",
            params![repo, path],
        )?;
        Ok(())
    }

    pub fn find_file_by_path(&self, repo: &str, path: &str) -> Result<Option<File>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM files WHERE repo = ?1 AND path = ?2",
            params![repo, path],
            row_to_file,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn find_files_by_repo(&self, repo: &str) -> Result<Vec<File>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM files WHERE repo = ?1 ORDER BY path")?;
        let rows = stmt
            .query_map(params![repo], row_to_file)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn find_files_by_content_hash(&self, repo: &str, content_hash: &str) -> Result<Vec<File>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM files WHERE repo = ?1 AND content_hash = ?2")?;
        let rows = stmt
            .query_map(params![repo, content_hash], row_to_file)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Language mix, average chunk size, and documentation ratio for
    /// `repo`, used to synthesize a default Packing Profile.
    pub fn repo_stats(&self, repo: &str) -> Result<crate::types::RepoStats> {
        let conn = self.conn.lock().unwrap();
        let file_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM files WHERE repo = ?1", params![repo], |r| r.get(0))?;
        if file_count == 0 {
            return Ok(crate::types::RepoStats::default());
        }

        let mut lang_stmt = conn.prepare(
            "SELECT language, COUNT(*) FROM files WHERE repo = ?1 GROUP BY language ORDER BY COUNT(*) DESC",
        )?;
        let lang_rows: Vec<(Option<String>, i64)> = lang_stmt
            .query_map(params![repo], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let dominant_count = lang_rows.first().map(|(_, n)| *n).unwrap_or(0);
        let doc_count: i64 = lang_rows
            .iter()
            .filter(|(lang, _)| matches!(lang.as_deref(), Some("markdown") | Some("rst") | Some("md")))
            .map(|(_, n)| n)
            .sum();

        let avg_chunk_size: f64 = conn
            .query_row(
                "SELECT AVG(LENGTH(c.content)) FROM chunks c
                 JOIN spans s ON s.id = c.span_id
                 WHERE s.repo = ?1",
                params![repo],
                |r| r.get::<_, Option<f64>>(0),
            )?
            .unwrap_or(0.0);

        Ok(crate::types::RepoStats {
            file_count: file_count as u64,
            avg_chunk_size,
            documentation_ratio: doc_count as f64 / file_count as f64,
            dominant_language_ratio: dominant_count as f64 / file_count as f64,
        })
    }
}
