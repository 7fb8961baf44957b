//! Packing profile operations (component H's disk-backed store).

use super::store::Storage;
use crate::error::Result;
use crate::types::{CapsuleStrategy, PackingProfile, TierBudgets};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;

fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<PackingProfile> {
    let priorities_json: String = row.get("priorities")?;
    let capsule_json: String = row.get("capsule_json")?;
    let metadata_json: String = row.get("metadata_json")?;
    let created: String = row.get("created_at")?;
    let updated: String = row.get("updated_at")?;
    Ok(PackingProfile {
        id: row.get("id")?,
        repository: row.get("repository")?,
        model: row.get("model")?,
        priorities: serde_json::from_str(&priorities_json).unwrap_or_default(),
        total_budget: row.get::<_, i64>("total_budget")? as u64,
        tiers: TierBudgets {
            must_have: row.get::<_, i64>("tier_must_have")? as u64,
            important: row.get::<_, i64>("tier_important")? as u64,
            supplementary: row.get::<_, i64>("tier_supplementary")? as u64,
            optional: row.get::<_, i64>("tier_optional")? as u64,
            reserve: row.get::<_, i64>("tier_reserve")? as u64,
        },
        capsule: serde_json::from_str::<CapsuleStrategy>(&capsule_json).unwrap_or_default(),
        truncation_strategy: row.get("truncation_strategy")?,
        version: row.get::<_, i64>("version")? as u32,
        created_at: parse_ts(&created),
        updated_at: parse_ts(&updated),
        ttl_seconds: row.get("ttl_seconds")?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl Storage {
    /// Create or overwrite a profile keyed by `(repository, model)`. Each
    /// write bumps `version` and stamps `updated_at`.
    pub fn upsert_packing_profile(&self, profile: &PackingProfile) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let priorities_json = serde_json::to_string(&profile.priorities).unwrap_or_else(|_| "{}".into());
        let capsule_json = serde_json::to_string(&profile.capsule).unwrap_or_else(|_| "{}".into());
        let metadata_json = serde_json::to_string(&profile.metadata).unwrap_or_else(|_| "null".into());
        conn.execute(
            "INSERT INTO packing_profiles (
                id, repository, model, priorities, total_budget,
                tier_must_have, tier_important, tier_supplementary, tier_optional, tier_reserve,
                capsule_json, truncation_strategy, version, created_at, updated_at, ttl_seconds, metadata_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(repository, model) DO UPDATE SET
                priorities = excluded.priorities,
                total_budget = excluded.total_budget,
                tier_must_have = excluded.tier_must_have,
                tier_important = excluded.tier_important,
                tier_supplementary = excluded.tier_supplementary,
                tier_optional = excluded.tier_optional,
                tier_reserve = excluded.tier_reserve,
                capsule_json = excluded.capsule_json,
                truncation_strategy = excluded.truncation_strategy,
                version = packing_profiles.version + 1,
                updated_at = excluded.updated_at,
                ttl_seconds = excluded.ttl_seconds,
                metadata_json = excluded.metadata_json",
            params![
                profile.id,
                profile.repository,
                profile.model,
                priorities_json,
                profile.total_budget as i64,
                profile.tiers.must_have as i64,
                profile.tiers.important as i64,
                profile.tiers.supplementary as i64,
                profile.tiers.optional as i64,
                profile.tiers.reserve as i64,
                capsule_json,
                profile.truncation_strategy,
                profile.version as i64,
                profile.created_at.to_rfc3339(),
                profile.updated_at.to_rfc3339(),
                profile.ttl_seconds,
                metadata_json,
            ],
        )
        .map_err(|e| {
            crate::error::PampaxError::storage_constraint(
                "packing_profile",
                format!("{}:{}", profile.repository, profile.model),
                e,
            )
        })?;
        Ok(())
    }

    pub fn find_packing_profile(&self, repository: &str, model: &str) -> Result<Option<PackingProfile>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM packing_profiles WHERE repository = ?1 AND model = ?2",
            params![repository, model],
            row_to_profile,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn delete_packing_profile(&self, repository: &str, model: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM packing_profiles WHERE repository = ?1 AND model = ?2",
            params![repository, model],
        )?;
        Ok(())
    }

    pub fn list_packing_profiles(&self, repository: &str) -> Result<Vec<PackingProfile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM packing_profiles WHERE repository = ?1 ORDER BY model")?;
        let rows = stmt
            .query_map(params![repository], row_to_profile)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete every profile whose TTL has elapsed. Returns the count removed.
    pub fn cleanup_expired_profiles(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let removed = conn.execute(
            "DELETE FROM packing_profiles
             WHERE ttl_seconds IS NOT NULL
             AND (julianday(?1) - julianday(updated_at)) * 86400.0 > ttl_seconds",
            params![now],
        )?;
        Ok(removed)
    }
}

/// Priorities expected by [`PackingProfile::priorities`] default to an even
/// split across the content types the assembler classifies (see component
/// I). Kept here so profile synthesis has a concrete starting point.
pub fn default_priorities() -> BTreeMap<String, f32> {
    let mut m = BTreeMap::new();
    m.insert("symbol_definition".to_string(), 1.0);
    m.insert("direct_reference".to_string(), 0.8);
    m.insert("test_coverage".to_string(), 0.6);
    m.insert("documentation".to_string(), 0.5);
    m.insert("related_context".to_string(), 0.3);
    m
}
