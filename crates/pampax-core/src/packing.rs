//! Packing Profile Store: an in-memory LRU cache fronting the
//! disk-backed `packing_profiles` table, grounded on the teacher's
//! embedding-cache-in-front-of-`storage/sqlite.rs` pattern.

use crate::error::{PampaxError, Result};
use crate::storage::{default_priorities, Storage};
use crate::types::{CapsuleStrategy, PackingProfile, RepoStats, TierBudgets};
use chrono::Utc;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const KNOWN_STRATEGY_TAGS: &[&str] = &["head", "tail", "middle-out", "smart"];

fn cache_key(repository: &str, model: &str) -> String {
    format!("{repository}\u{0}{model}")
}

/// Validate the invariants spec.md places on a Packing Profile: non-empty
/// natural key, priorities in `[0,1]`, tier budgets not exceeding the
/// total, and a recognized truncation strategy tag.
pub fn validate_profile(profile: &PackingProfile) -> Result<()> {
    if profile.repository.trim().is_empty() || profile.model.trim().is_empty() {
        return Err(PampaxError::Config("packing profile repository/model must not be empty".into()));
    }
    for (content_type, priority) in &profile.priorities {
        if !(0.0..=1.0).contains(priority) {
            return Err(PampaxError::Config(format!(
                "packing profile priority for {content_type} out of [0,1]: {priority}"
            )));
        }
    }
    if profile.tiers.sum() > profile.total_budget {
        return Err(PampaxError::Config(format!(
            "packing profile tier budgets ({}) exceed total_budget ({})",
            profile.tiers.sum(),
            profile.total_budget
        )));
    }
    if !KNOWN_STRATEGY_TAGS.contains(&profile.truncation_strategy.as_str()) {
        return Err(PampaxError::Config(format!(
            "unknown truncation strategy tag: {}",
            profile.truncation_strategy
        )));
    }
    Ok(())
}

/// Split a total budget across the five tiers in the proportions the
/// context assembler expects: most weight on must-have, a fixed slice
/// reserved for overflow that never spills into other tiers.
fn default_tiers(total_budget: u64) -> TierBudgets {
    let reserve = (total_budget / 10).max(1);
    let remaining = total_budget.saturating_sub(reserve);
    TierBudgets {
        must_have: remaining * 40 / 100,
        important: remaining * 30 / 100,
        supplementary: remaining * 20 / 100,
        optional: remaining * 10 / 100,
        reserve,
    }
}

/// Synthesize a profile from repository statistics: documentation-heavy
/// repositories get a documentation-priority bump, larger average chunk
/// sizes grow the total budget, and single-language repositories relax
/// the `related_context` priority since cross-language noise is rare.
fn synthesize_from_stats(repository: &str, model: &str, stats: RepoStats) -> PackingProfile {
    let now = Utc::now();
    let mut priorities = default_priorities();
    if stats.documentation_ratio > 0.3 {
        priorities.insert("documentation".to_string(), 0.7);
    }
    if stats.dominant_language_ratio > 0.8 {
        priorities.insert("related_context".to_string(), 0.2);
    }
    let total_budget = if stats.avg_chunk_size > 2000.0 {
        12000
    } else if stats.avg_chunk_size > 0.0 {
        8000
    } else {
        6000
    };
    PackingProfile {
        id: format!("profile_{}", uuid::Uuid::new_v4()),
        repository: repository.to_string(),
        model: model.to_string(),
        priorities,
        total_budget,
        tiers: default_tiers(total_budget),
        capsule: CapsuleStrategy::default(),
        truncation_strategy: "smart".to_string(),
        version: 1,
        created_at: now,
        updated_at: now,
        ttl_seconds: Some(86_400),
        metadata: serde_json::json!({ "synthesized_from": "repo_stats" }),
    }
}

pub struct PackingProfileStore {
    storage: Arc<Storage>,
    cache: Mutex<LruCache<String, PackingProfile>>,
}

impl PackingProfileStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self::with_capacity(storage, 256)
    }

    pub fn with_capacity(storage: Arc<Storage>, capacity: usize) -> Self {
        Self {
            storage,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())),
        }
    }

    /// Validate and write a profile; the write goes through to disk then
    /// updates the LRU.
    pub fn create(&self, profile: PackingProfile) -> Result<PackingProfile> {
        validate_profile(&profile)?;
        self.storage.upsert_packing_profile(&profile)?;
        self.cache
            .lock()
            .unwrap()
            .put(cache_key(&profile.repository, &profile.model), profile.clone());
        Ok(profile)
    }

    /// Fetch a profile, checked for lazy TTL expiry. A stale or missing
    /// profile is *not* auto-synthesized here — that's `optimize`'s job —
    /// this returns `None` so callers can fall back to a model default.
    pub fn get(&self, repository: &str, model: &str) -> Result<Option<PackingProfile>> {
        let key = cache_key(repository, model);
        if let Some(hit) = self.cache.lock().unwrap().get(&key).cloned() {
            if !hit.is_expired(Utc::now()) {
                return Ok(Some(hit));
            }
        }
        let Some(found) = self.storage.find_packing_profile(repository, model)? else {
            return Ok(None);
        };
        if found.is_expired(Utc::now()) {
            return Ok(None);
        }
        self.cache.lock().unwrap().put(key, found.clone());
        Ok(Some(found))
    }

    /// `get`, or synthesize-and-persist a fresh profile from repository
    /// statistics when none exists or the existing one has expired.
    pub fn optimize(&self, repository: &str, model: &str) -> Result<PackingProfile> {
        if let Some(existing) = self.get(repository, model)? {
            return Ok(existing);
        }
        let stats = self.storage.repo_stats(repository)?;
        let synthesized = synthesize_from_stats(repository, model, stats);
        self.create(synthesized)
    }

    /// Apply a delta to an existing profile, bumping `version` and
    /// `updated_at` (both stamped server-side by the storage layer).
    pub fn update(&self, repository: &str, model: &str, mutate: impl FnOnce(&mut PackingProfile)) -> Result<PackingProfile> {
        let mut profile = self
            .storage
            .find_packing_profile(repository, model)?
            .ok_or_else(|| PampaxError::NotFound(format!("packing profile {repository}/{model}")))?;
        mutate(&mut profile);
        profile.updated_at = Utc::now();
        validate_profile(&profile)?;
        self.storage.upsert_packing_profile(&profile)?;
        let mut updated = profile;
        if let Some(stored) = self.storage.find_packing_profile(repository, model)? {
            updated.version = stored.version;
        }
        self.cache
            .lock()
            .unwrap()
            .put(cache_key(repository, model), updated.clone());
        Ok(updated)
    }

    /// Purge both cache and disk.
    pub fn delete(&self, repository: &str, model: &str) -> Result<()> {
        self.cache.lock().unwrap().pop(&cache_key(repository, model));
        self.storage.delete_packing_profile(repository, model)
    }

    pub fn cleanup_expired(&self) -> Result<usize> {
        self.storage.cleanup_expired_profiles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(repository: &str, model: &str) -> PackingProfile {
        let now = Utc::now();
        PackingProfile {
            id: format!("profile_{}", uuid::Uuid::new_v4()),
            repository: repository.to_string(),
            model: model.to_string(),
            priorities: default_priorities(),
            total_budget: 8000,
            tiers: default_tiers(8000),
            capsule: CapsuleStrategy::default(),
            truncation_strategy: "smart".to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            ttl_seconds: None,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn create_rejects_empty_key() {
        let store = PackingProfileStore::new(Arc::new(Storage::open_in_memory().unwrap()));
        let mut p = sample("", "gpt");
        p.repository = String::new();
        assert!(store.create(p).is_err());
    }

    #[test]
    fn create_rejects_tiers_over_total() {
        let store = PackingProfileStore::new(Arc::new(Storage::open_in_memory().unwrap()));
        let mut p = sample("r", "gpt");
        p.tiers.must_have = 1_000_000;
        assert!(store.create(p).is_err());
    }

    #[test]
    fn create_rejects_unknown_strategy() {
        let store = PackingProfileStore::new(Arc::new(Storage::open_in_memory().unwrap()));
        let mut p = sample("r", "gpt");
        p.truncation_strategy = "nonsense".to_string();
        assert!(store.create(p).is_err());
    }

    #[test]
    fn optimize_synthesizes_when_missing() {
        let store = PackingProfileStore::new(Arc::new(Storage::open_in_memory().unwrap()));
        let profile = store.optimize("r", "gpt").unwrap();
        assert_eq!(profile.repository, "r");
        assert!(store.get("r", "gpt").unwrap().is_some());
    }

    #[test]
    fn get_treats_expired_profile_as_absent() {
        let store = PackingProfileStore::new(Arc::new(Storage::open_in_memory().unwrap()));
        let mut p = sample("r", "gpt");
        p.ttl_seconds = Some(0);
        p.updated_at = Utc::now() - chrono::Duration::seconds(5);
        store.create(p).unwrap();
        assert!(store.get("r", "gpt").unwrap().is_none());
    }

    #[test]
    fn update_bumps_version() {
        let store = PackingProfileStore::new(Arc::new(Storage::open_in_memory().unwrap()));
        store.create(sample("r", "gpt")).unwrap();
        let updated = store.update("r", "gpt", |p| p.total_budget = 9000).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.total_budget, 9000);
    }
}
