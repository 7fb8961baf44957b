//! Job-run tracking and reranker result cache.

use super::store::Storage;
use crate::error::Result;
use crate::types::{JobRun, JobStatus, RerankCacheEntry};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<JobRun> {
    let status: String = row.get("status")?;
    let started: String = row.get("started_at")?;
    let finished: Option<String> = row.get("finished_at")?;
    Ok(JobRun {
        id: row.get("id")?,
        kind: row.get("kind")?,
        status: JobStatus::parse(&status),
        error_text: row.get("error_text")?,
        started_at: parse_ts(&started),
        finished_at: finished.map(|f| parse_ts(&f)),
    })
}

fn row_to_rerank_entry(row: &rusqlite::Row) -> rusqlite::Result<RerankCacheEntry> {
    let created: String = row.get("created_at")?;
    Ok(RerankCacheEntry {
        provider: row.get("provider")?,
        model: row.get("model")?,
        query_hash: row.get("query_hash")?,
        serialized_result: row.get("serialized_result")?,
        created_at: parse_ts(&created),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl Storage {
    pub fn start_job(&self, id: &str, kind: &str, started_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_runs (id, kind, status, error_text, started_at, finished_at)
             VALUES (?1, ?2, ?3, NULL, ?4, NULL)
             ON CONFLICT(id, kind) DO UPDATE SET status = excluded.status, started_at = excluded.started_at, error_text = NULL, finished_at = NULL",
            params![id, kind, JobStatus::Running.as_str(), started_at.to_rfc3339()],
        )
        .map_err(|e| crate::error::PampaxError::storage_constraint("job_run", format!("{id}:{kind}"), e))?;
        Ok(())
    }

    pub fn finish_job(
        &self,
        id: &str,
        kind: &str,
        status: JobStatus,
        error_text: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE job_runs SET status = ?3, error_text = ?4, finished_at = ?5 WHERE id = ?1 AND kind = ?2",
            params![id, kind, status.as_str(), error_text, finished_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn find_job(&self, id: &str, kind: &str) -> Result<Option<JobRun>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM job_runs WHERE id = ?1 AND kind = ?2",
            params![id, kind],
            row_to_job,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn find_jobs_by_kind(&self, kind: &str, limit: usize) -> Result<Vec<JobRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM job_runs WHERE kind = ?1 ORDER BY started_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![kind, limit as i64], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn put_rerank_cache(&self, entry: &RerankCacheEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO rerank_cache (provider, model, query_hash, serialized_result, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(provider, model, query_hash) DO UPDATE SET
                serialized_result = excluded.serialized_result,
                created_at = excluded.created_at",
            params![
                entry.provider,
                entry.model,
                entry.query_hash,
                entry.serialized_result,
                entry.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            crate::error::PampaxError::storage_constraint(
                "rerank_cache",
                format!("{}:{}:{}", entry.provider, entry.model, entry.query_hash),
                e,
            )
        })?;
        Ok(())
    }

    pub fn get_rerank_cache(
        &self,
        provider: &str,
        model: &str,
        query_hash: &str,
    ) -> Result<Option<RerankCacheEntry>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM rerank_cache WHERE provider = ?1 AND model = ?2 AND query_hash = ?3",
            params![provider, model, query_hash],
            row_to_rerank_entry,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Evict cache rows older than `max_age_seconds`. Returns the count
    /// removed; the in-memory LRU front (see [`crate::reliability::cache`])
    /// handles recency eviction, this handles unbounded disk growth.
    pub fn evict_rerank_cache_older_than(&self, max_age_seconds: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let removed = conn.execute(
            "DELETE FROM rerank_cache WHERE (julianday(?1) - julianday(created_at)) * 86400.0 > ?2",
            params![now, max_age_seconds],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_lifecycle_transitions() {
        let s = Storage::open_in_memory().unwrap();
        s.start_job("job_1", "index", Utc::now()).unwrap();
        let running = s.find_job("job_1", "index").unwrap().unwrap();
        assert_eq!(running.status, JobStatus::Running);
        s.finish_job("job_1", "index", JobStatus::Ok, None, Utc::now())
            .unwrap();
        let done = s.find_job("job_1", "index").unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Ok);
        assert!(done.finished_at.is_some());
    }

    #[test]
    fn rerank_cache_round_trip() {
        let s = Storage::open_in_memory().unwrap();
        let entry = RerankCacheEntry {
            provider: "local".to_string(),
            model: "m".to_string(),
            query_hash: "h1".to_string(),
            serialized_result: "[]".to_string(),
            created_at: Utc::now(),
        };
        s.put_rerank_cache(&entry).unwrap();
        let found = s.get_rerank_cache("local", "m", "h1").unwrap().unwrap();
        assert_eq!(found.serialized_result, "[]");
    }

    #[test]
    fn evicts_only_stale_cache_entries() {
        let s = Storage::open_in_memory().unwrap();
        s.put_rerank_cache(&RerankCacheEntry {
            provider: "local".to_string(),
            model: "m".to_string(),
            query_hash: "old".to_string(),
            serialized_result: "[]".to_string(),
            created_at: Utc::now() - chrono::Duration::days(2),
        })
        .unwrap();
        s.put_rerank_cache(&RerankCacheEntry {
            provider: "local".to_string(),
            model: "m".to_string(),
            query_hash: "fresh".to_string(),
            serialized_result: "[]".to_string(),
            created_at: Utc::now(),
        })
        .unwrap();
        let removed = s.evict_rerank_cache_older_than(3600).unwrap();
        assert_eq!(removed, 1);
        assert!(s.get_rerank_cache("local", "m", "fresh").unwrap().is_some());
    }
}
