//! Chunk, embedding, and FTS/vector search operations.

use super::store::Storage;
use crate::error::Result;
use crate::types::{Chunk, Embedding};
use rusqlite::{params, OptionalExtension};

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get("id")?,
        span_id: row.get("span_id")?,
        content: row.get("content")?,
        content_hash: row.get("content_hash")?,
    })
}

fn vector_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_vector(b: &[u8]) -> Vec<f32> {
    b.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

impl Storage {
    pub fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO chunks (id, span_id, content, content_hash) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET content = excluded.content, content_hash = excluded.content_hash",
            params![chunk.id, chunk.span_id, chunk.content, chunk.content_hash],
        )
        .map_err(|e| crate::error::PampaxError::storage_constraint("chunk", chunk.id.clone(), e))?;
        Ok(())
    }

    pub fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM chunks WHERE id = ?1", params![chunk_id])?;
        Ok(())
    }

    pub fn find_chunk_by_id(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM chunks WHERE id = ?1", params![chunk_id], row_to_chunk)
            .optional()
            .map_err(Into::into)
    }

    /// Chunks belonging to spans in `repo` that have no embedding row yet
    /// for `model`.
    pub fn find_chunks_pending_embedding(
        &self,
        repo: &str,
        model: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.* FROM chunks c
             JOIN spans s ON s.id = c.span_id
             WHERE s.repo = ?1
             AND NOT EXISTS (SELECT 1 FROM embeddings e WHERE e.chunk_id = c.id AND e.model = ?2)
             ORDER BY c.id LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt
            .query_map(params![repo, model, limit as i64, offset as i64], row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn insert_embedding(&self, embedding: &Embedding) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO embeddings (chunk_id, model, dimension, vector) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chunk_id, model) DO UPDATE SET dimension = excluded.dimension, vector = excluded.vector",
            params![
                embedding.chunk_id,
                embedding.model,
                embedding.dimension as i64,
                vector_to_blob(&embedding.vector)
            ],
        )
        .map_err(|e| {
            crate::error::PampaxError::storage_constraint(
                "embedding",
                format!("{}:{}", embedding.chunk_id, embedding.model),
                e,
            )
        })?;
        Ok(())
    }

    pub fn find_embeddings_by_chunk(&self, chunk_id: &str) -> Result<Vec<Embedding>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT chunk_id, model, dimension, vector FROM embeddings WHERE chunk_id = ?1")?;
        let rows = stmt
            .query_map(params![chunk_id], |row| {
                let blob: Vec<u8> = row.get(3)?;
                Ok(Embedding {
                    chunk_id: row.get(0)?,
                    model: row.get(1)?,
                    dimension: row.get::<_, i64>(2)? as u32,
                    vector: blob_to_vector(&blob),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Brute-force cosine-similarity top-k over stored embeddings for
    /// `model`. An ANN index may replace this without changing the
    /// signature; recall here is exact (1.0) by construction.
    pub fn vector_search(
        &self,
        repo: &str,
        query_vector: &[f32],
        model: &str,
        k: usize,
    ) -> Result<Vec<(String, f32)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT e.chunk_id, e.vector FROM embeddings e
             JOIN chunks c ON c.id = e.chunk_id
             JOIN spans s ON s.id = c.span_id
             WHERE s.repo = ?1 AND e.model = ?2",
        )?;
        let query_norm = norm(query_vector);
        let mut scored: Vec<(String, f32)> = stmt
            .query_map(params![repo, model], |row| {
                let chunk_id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((chunk_id, blob_to_vector(&blob)))
            })?
            .filter_map(|r| r.ok())
            .map(|(id, vec)| {
                let dist = cosine_distance(query_vector, &vec, query_norm);
                (id, dist)
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// FTS5 BM25-ranked lexical search. The query text is sanitized to
    /// avoid malformed FTS5 MATCH expressions (unbalanced quotes/operators).
    pub fn fts_search(&self, query: &str, k: usize) -> Result<Vec<(String, String, f32)>> {
        let conn = self.conn.lock().unwrap();
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(
            "SELECT c.id, c.content, bm25(chunks_fts) AS rank
             FROM chunks_fts
             JOIN chunks c ON c.id = chunks_fts.id
             WHERE chunks_fts MATCH ?1
             ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![sanitized, k as i64], |row| {
                let rank: f64 = row.get(2)?;
                // bm25() in SQLite is lower-is-better; flip sign so higher
                // is better for callers that sort descending.
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, -rank as f32))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine *distance* (1 - cosine similarity), lower is more similar.
fn cosine_distance(a: &[f32], b: &[f32], a_norm: f32) -> f32 {
    if a.len() != b.len() || a_norm == 0.0 {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let b_norm = norm(b);
    if b_norm == 0.0 {
        return 1.0;
    }
    1.0 - (dot / (a_norm * b_norm))
}

/// Escape characters FTS5's query syntax treats specially, and drop
/// operator tokens that would otherwise make a malformed MATCH expression.
/// Each remaining term is individually double-quoted so the query behaves
/// as an AND of literal phrases rather than risking an FTS5 syntax error.
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| term.replace('"', ""))
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{term}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{span_id, Span, SpanKind};

    fn seed(storage: &Storage) -> String {
        storage
            .upsert_file("r", "a.rs", "h", None, 1, chrono::Utc::now())
            .unwrap();
        let id = span_id("r", "a.rs", 0, 10, SpanKind::Function, "foo", None, None, &[]);
        let span = Span {
            id: id.clone(),
            repo: "r".to_string(),
            path: "a.rs".to_string(),
            byte_start: 0,
            byte_end: 10,
            kind: SpanKind::Function,
            name: "foo".to_string(),
            signature: None,
            doc: None,
            parents: vec![],
        };
        storage.insert_span(&span).unwrap();
        id
    }

    #[test]
    fn fts_round_trip() {
        let s = Storage::open_in_memory().unwrap();
        let span_id = seed(&s);
        let chunk = Chunk {
            id: "chunk_1".to_string(),
            span_id,
            content: "fn authenticate user credentials".to_string(),
            content_hash: "h".to_string(),
        };
        s.insert_chunk(&chunk).unwrap();
        let results = s.fts_search("authenticate", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "chunk_1");
    }

    #[test]
    fn fts_consistency_after_delete() {
        let s = Storage::open_in_memory().unwrap();
        let span_id = seed(&s);
        let chunk = Chunk {
            id: "chunk_1".to_string(),
            span_id,
            content: "some unique token zzqq".to_string(),
            content_hash: "h".to_string(),
        };
        s.insert_chunk(&chunk).unwrap();
        s.delete_chunk("chunk_1").unwrap();
        let results = s.fts_search("zzqq", 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn vector_search_orders_by_similarity() {
        let s = Storage::open_in_memory().unwrap();
        let span_id = seed(&s);
        let chunk = Chunk {
            id: "chunk_1".to_string(),
            span_id,
            content: "x".to_string(),
            content_hash: "h".to_string(),
        };
        s.insert_chunk(&chunk).unwrap();
        s.insert_embedding(&Embedding {
            chunk_id: "chunk_1".to_string(),
            model: "m".to_string(),
            dimension: 3,
            vector: vec![1.0, 0.0, 0.0],
        })
        .unwrap();
        let results = s.vector_search("r", &[1.0, 0.0, 0.0], "m", 5).unwrap();
        assert_eq!(results[0].0, "chunk_1");
        assert!(results[0].1 < 0.01);
    }

    #[test]
    fn sanitizes_malformed_query() {
        let s = sanitize_fts5_query("foo \"bar OR baz AND");
        assert!(!s.is_empty());
        assert!(s.contains("\"foo\""));
    }
}
