//! Config Loader
//!
//! Merges a TOML config file, environment variables, and built-in defaults
//! (in that precedence order, file overridden by environment) into the
//! typed [`Config`] tree. Mirrors the section layout used across the
//! retrieval CLI surface: `[logging]`, `[metrics]`, `[cache]`,
//! `[performance]`, `[cli]`, `[indexer]`, `[storage]`, `[features]`,
//! `[security]`.

use crate::error::{PampaxError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub sampling_rate: f64,
    pub sink: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sampling_rate: 1.0,
            sink: "stdout".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub traversal_capacity: usize,
    pub rerank_capacity: usize,
    pub packing_profile_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            traversal_capacity: 256,
            rerank_capacity: 512,
            packing_profile_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub query_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub sqlite_timeout_ms: u64,
    pub embed_timeout_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_recovery_ms: u64,
    pub retry_max_attempts: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 1500,
            probe_timeout_ms: 700,
            sqlite_timeout_ms: 500,
            embed_timeout_ms: 2000,
            breaker_failure_threshold: 5,
            breaker_recovery_ms: 30_000,
            retry_max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub format: String,
    pub quiet: bool,
    pub verbose: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            quiet: false,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*".to_string()],
            exclude: vec!["**/.git/**".to_string(), "**/target/**".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: Option<String>,
    pub budget_tiers_sum_check: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            budget_tiers_sum_check: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FeaturesConfig {
    pub flags: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub redact_secrets_in_logs: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            redact_secrets_in_logs: true,
        }
    }
}

/// The fully merged, validated configuration tree.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub cache: CacheConfig,
    pub performance: PerformanceConfig,
    pub cli: CliConfig,
    pub indexer: IndexerConfig,
    pub storage: StorageConfig,
    pub features: FeaturesConfig,
    pub security: SecurityConfig,
}

impl Config {
    /// Load defaults, overlay a TOML file if present, overlay environment
    /// variables, then validate. Missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| PampaxError::Config(format!("reading {}: {e}", p.display())))?;
                toml::from_str::<Config>(&text)
                    .map_err(|e| PampaxError::Config(format!("parsing {}: {e}", p.display())))?
            }
            _ => Config::default(),
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `PAMPAX_<SECTION>_<KEY>` environment overrides. Dotted config
    /// paths (`section.key`) map to upper-snake env names.
    fn apply_env(&mut self) {
        let get = |name: &str| std::env::var(name).ok();

        if let Some(v) = get("PAMPAX_LOGGING_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("PAMPAX_LOGGING_JSON") {
            if let Ok(b) = v.parse() {
                self.logging.json = b;
            }
        }
        if let Some(v) = get("PAMPAX_METRICS_ENABLED") {
            if let Ok(b) = v.parse() {
                self.metrics.enabled = b;
            }
        }
        if let Some(v) = get("PAMPAX_METRICS_SAMPLING_RATE") {
            if let Ok(f) = v.parse() {
                self.metrics.sampling_rate = f;
            }
        }
        if let Some(v) = get("PAMPAX_CACHE_TTL_SECONDS") {
            if let Ok(n) = v.parse() {
                self.cache.ttl_seconds = n;
            }
        }
        if let Some(v) = get("PAMPAX_PERFORMANCE_QUERY_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.performance.query_timeout_ms = n;
            }
        }
        if let Some(v) = get("PAMPAX_STORAGE_DB_PATH") {
            self.storage.db_path = Some(v);
        }
        // Generic PAMPAX_FEATURES_<NAME> -> features.flags[name]
        for (key, value) in std::env::vars() {
            if let Some(rest) = key.strip_prefix("PAMPAX_FEATURES_") {
                let name = rest.to_lowercase();
                let enabled = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                self.features.flags.insert(name, enabled);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let level_ok = matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        );
        if !level_ok {
            return Err(PampaxError::Config(format!(
                "logging.level must be one of trace|debug|info|warn|error, got {}",
                self.logging.level
            )));
        }
        if !(0.0..=1.0).contains(&self.metrics.sampling_rate) {
            return Err(PampaxError::Config(
                "metrics.sampling_rate must be in [0,1]".to_string(),
            ));
        }
        if self.performance.query_timeout_ms < 100 {
            return Err(PampaxError::Config(
                "performance.query_timeout_ms must be >= 100".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_bad_log_level() {
        let mut cfg = Config::default();
        cfg.logging.level = "verbose".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_low_timeout() {
        let mut cfg = Config::default();
        cfg.performance.query_timeout_ms = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = Config::load(Some(Path::new("/nonexistent/pampax.toml"))).unwrap();
        assert_eq!(cfg.logging.level, "info");
    }
}
