//! Reference-edge operations.

use super::store::Storage;
use crate::error::Result;
use crate::types::{Reference, ReferenceKind};
use rusqlite::params;

fn row_to_reference(row: &rusqlite::Row) -> rusqlite::Result<Reference> {
    let kind: String = row.get("kind")?;
    Ok(Reference {
        id: row.get("id")?,
        src_span_id: row.get("src_span_id")?,
        dst_path: row.get("dst_path")?,
        dst_byte_start: row.get::<_, i64>("dst_byte_start")? as u64,
        dst_byte_end: row.get::<_, i64>("dst_byte_end")? as u64,
        kind: ReferenceKind::parse(&kind).unwrap_or(ReferenceKind::Reference),
        confidence: row.get("confidence")?,
    })
}

impl Storage {
    pub fn insert_reference(&self, reference: &Reference) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO \"references\" (id, src_span_id, dst_path, dst_byte_start, dst_byte_end, kind, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET confidence = excluded.confidence",
            params![
                reference.id,
                reference.src_span_id,
                reference.dst_path,
                reference.dst_byte_start as i64,
                reference.dst_byte_end as i64,
                reference.kind.as_str(),
                reference.confidence,
            ],
        )
        .map_err(|e| crate::error::PampaxError::storage_constraint("reference", reference.id.clone(), e))?;
        Ok(())
    }

    /// Edges leaving `span_id`, optionally filtered to `kinds` (the filter
    /// is applied in SQL, not post-hoc, so callers never pay to materialize
    /// edges they'll discard).
    pub fn outgoing_edges(
        &self,
        span_id: &str,
        kinds: Option<&[ReferenceKind]>,
    ) -> Result<Vec<Reference>> {
        let conn = self.conn.lock().unwrap();
        let rows = match kinds {
            None => {
                let mut stmt =
                    conn.prepare("SELECT * FROM \"references\" WHERE src_span_id = ?1")?;
                stmt.query_map(params![span_id], row_to_reference)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            Some(kinds) => {
                let placeholders = kinds.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!(
                    "SELECT * FROM \"references\" WHERE src_span_id = ?1 AND kind IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut params: Vec<&dyn rusqlite::ToSql> = vec![&span_id];
                let kind_strs: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
                for k in &kind_strs {
                    params.push(k);
                }
                stmt.query_map(params.as_slice(), row_to_reference)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    /// Edges whose destination path+range overlaps a span in `dst_path`.
    /// Since references store only a flat `(path, range)` destination
    /// (never a materialized pointer to a span), incoming lookups join
    /// against `spans` to resolve the destination span's own id.
    pub fn incoming_edges(
        &self,
        dst_span_repo: &str,
        dst_span_path: &str,
        dst_byte_start: u64,
        dst_byte_end: u64,
        kinds: Option<&[ReferenceKind]>,
    ) -> Result<Vec<Reference>> {
        let conn = self.conn.lock().unwrap();
        let base = "SELECT r.* FROM \"references\" r
             JOIN spans s ON s.repo = ?1 AND s.path = r.dst_path
             WHERE r.dst_path = ?2 AND r.dst_byte_start < ?4 AND r.dst_byte_end > ?3";
        let rows = match kinds {
            None => {
                let mut stmt = conn.prepare(base)?;
                stmt.query_map(
                    params![dst_span_repo, dst_span_path, dst_byte_start as i64, dst_byte_end as i64],
                    row_to_reference,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?
            }
            Some(kinds) => {
                let placeholders = kinds.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!("{base} AND r.kind IN ({placeholders})");
                let mut stmt = conn.prepare(&sql)?;
                let start_i64 = dst_byte_start as i64;
                let end_i64 = dst_byte_end as i64;
                let mut p: Vec<&dyn rusqlite::ToSql> = vec![
                    &dst_span_repo,
                    &dst_span_path,
                    &start_i64,
                    &end_i64,
                ];
                let kind_strs: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
                for k in &kind_strs {
                    p.push(k);
                }
                stmt.query_map(p.as_slice(), row_to_reference)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{span_id, Span, SpanKind};

    fn seed_span(storage: &Storage, repo: &str, path: &str, name: &str) -> String {
        storage
            .upsert_file(repo, path, "h", None, 1, chrono::Utc::now())
            .unwrap();
        let id = span_id(repo, path, 0, 10, SpanKind::Function, name, None, None, &[]);
        storage
            .insert_span(&Span {
                id: id.clone(),
                repo: repo.to_string(),
                path: path.to_string(),
                byte_start: 0,
                byte_end: 10,
                kind: SpanKind::Function,
                name: name.to_string(),
                signature: None,
                doc: None,
                parents: vec![],
            })
            .unwrap();
        id
    }

    #[test]
    fn cascade_delete_removes_references() {
        let s = Storage::open_in_memory().unwrap();
        let src = seed_span(&s, "r", "a.rs", "caller");
        s.insert_reference(&Reference {
            id: "ref_1".to_string(),
            src_span_id: src.clone(),
            dst_path: "b.rs".to_string(),
            dst_byte_start: 0,
            dst_byte_end: 5,
            kind: ReferenceKind::Call,
            confidence: 0.9,
        })
        .unwrap();
        s.delete_span(&src).unwrap();
        let remaining = s.outgoing_edges(&src, None).unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn edge_kind_filter_applied_in_query() {
        let s = Storage::open_in_memory().unwrap();
        let src = seed_span(&s, "r", "a.rs", "caller");
        s.insert_reference(&Reference {
            id: "ref_1".to_string(),
            src_span_id: src.clone(),
            dst_path: "b.rs".to_string(),
            dst_byte_start: 0,
            dst_byte_end: 5,
            kind: ReferenceKind::Call,
            confidence: 0.9,
        })
        .unwrap();
        s.insert_reference(&Reference {
            id: "ref_2".to_string(),
            src_span_id: src.clone(),
            dst_path: "b.rs".to_string(),
            dst_byte_start: 10,
            dst_byte_end: 15,
            kind: ReferenceKind::Import,
            confidence: 0.9,
        })
        .unwrap();
        let only_calls = s
            .outgoing_edges(&src, Some(&[ReferenceKind::Call]))
            .unwrap();
        assert_eq!(only_calls.len(), 1);
        assert_eq!(only_calls[0].kind, ReferenceKind::Call);
    }
}
