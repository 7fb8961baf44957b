//! Intent Classifier: maps a free-text query to one of five retrieval
//! intents with a confidence and an entity list.
//!
//! Grounded on the scoring-pattern idiom of a keyword-triggered classifier:
//! each intent has a scorer that accumulates evidence and clamps to 1.0,
//! the highest-scoring intent above threshold wins. Configuration
//! (triggers, entity patterns, thresholds) is mutable at runtime behind an
//! `RwLock` so it can be tuned without re-instantiating the classifier.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Symbol,
    Config,
    Api,
    Incident,
    Search,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Symbol => "symbol",
            Intent::Config => "config",
            Intent::Api => "api",
            Intent::Incident => "incident",
            Intent::Search => "search",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Function,
    Class,
    File,
    Config,
    Route,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub text: String,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f32,
    pub entities: Vec<Entity>,
    pub suggested_policies: Vec<String>,
    /// Set when the intent was supplied directly via `--force-intent`
    /// rather than inferred; confidence is pinned to 1.0 in that case.
    pub forced: bool,
}

/// Mutable, introspectable configuration for the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentClassifierConfig {
    pub min_confidence_with_trigger: f32,
    pub symbol_triggers: Vec<String>,
    pub config_triggers: Vec<String>,
    pub api_triggers: Vec<String>,
    pub incident_triggers: Vec<String>,
    pub min_entity_len: usize,
    pub stop_words: Vec<String>,
}

impl Default for IntentClassifierConfig {
    fn default() -> Self {
        Self {
            min_confidence_with_trigger: 0.2,
            symbol_triggers: vec![
                "function".into(),
                "method".into(),
                "class".into(),
                "struct".into(),
                "interface".into(),
                "symbol".into(),
            ],
            config_triggers: vec![
                "configuration".into(),
                "config".into(),
                "settings".into(),
                ".env".into(),
                ".yaml".into(),
                ".yml".into(),
                ".toml".into(),
                ".json".into(),
            ],
            api_triggers: vec![
                "get".into(),
                "post".into(),
                "put".into(),
                "delete".into(),
                "patch".into(),
                "endpoint".into(),
                "handler".into(),
                "controller".into(),
                "middleware".into(),
                "route".into(),
                "/api/".into(),
            ],
            incident_triggers: vec![
                "error".into(),
                "crash".into(),
                "exception".into(),
                "bug".into(),
                "debug".into(),
                "fix".into(),
                "broken".into(),
                "panic".into(),
                "fail".into(),
                "failing".into(),
            ],
            min_entity_len: 2,
            stop_words: vec![
                "the".into(),
                "and".into(),
                "for".into(),
                "with".into(),
                "that".into(),
                "this".into(),
            ],
        }
    }
}

pub struct IntentClassifier {
    config: RwLock<IntentClassifierConfig>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self {
            config: RwLock::new(IntentClassifierConfig::default()),
        }
    }

    pub fn with_config(config: IntentClassifierConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    pub fn config(&self) -> IntentClassifierConfig {
        self.config.read().unwrap().clone()
    }

    pub fn update_config(&self, config: IntentClassifierConfig) {
        *self.config.write().unwrap() = config;
    }

    /// Classify `query`. Non-string / empty inputs yield `search` at zero
    /// confidence with no entities, per the degrade-to-default contract.
    pub fn classify(&self, query: &str) -> IntentResult {
        if query.trim().is_empty() {
            return IntentResult {
                intent: Intent::Search,
                confidence: 0.0,
                entities: vec![],
                suggested_policies: vec!["search-default".to_string()],
                forced: false,
            };
        }
        let config = self.config.read().unwrap();
        let lower = query.to_lowercase();

        let mut scores: Vec<(Intent, f32)> = vec![
            (Intent::Symbol, score_triggers(&lower, &config.symbol_triggers)),
            (Intent::Config, score_triggers(&lower, &config.config_triggers)),
            (Intent::Api, score_triggers(&lower, &config.api_triggers)),
            (Intent::Incident, score_triggers(&lower, &config.incident_triggers)),
        ];
        // CamelCase / identifier_case tokens are a symbol-specific signal
        // on top of keyword triggers.
        if query.split_whitespace().any(looks_like_identifier) {
            scores[0].1 = (scores[0].1 + 0.3).min(1.0);
        }
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (intent, confidence) = scores
            .into_iter()
            .find(|(_, score)| *score >= config.min_confidence_with_trigger)
            .unwrap_or((Intent::Search, 0.0));

        let entities = extract_entities(query, &config);
        let suggested_policies = suggested_policies_for(intent);

        IntentResult {
            intent,
            confidence,
            entities,
            suggested_policies,
            forced: false,
        }
    }

    /// Override classification with an explicit intent, e.g. from
    /// `--force-intent`. Confidence is pinned to 1.0 and entities are still
    /// extracted from the query text.
    pub fn force_intent(&self, query: &str, intent: Intent) -> IntentResult {
        let config = self.config.read().unwrap();
        IntentResult {
            intent,
            confidence: 1.0,
            entities: extract_entities(query, &config),
            suggested_policies: suggested_policies_for(intent),
            forced: true,
        }
    }
}

fn score_triggers(lower_query: &str, triggers: &[String]) -> f32 {
    let matches = triggers.iter().filter(|t| lower_query.contains(t.as_str())).count();
    if matches == 0 {
        return 0.0;
    }
    (0.2 + 0.2 * (matches.saturating_sub(1) as f32)).min(1.0)
}

fn looks_like_identifier(token: &str) -> bool {
    let has_underscore_case = token.contains('_') && token.chars().all(|c| c.is_alphanumeric() || c == '_');
    let has_camel_case = token.chars().any(|c| c.is_uppercase())
        && token.chars().any(|c| c.is_lowercase())
        && token.chars().all(|c| c.is_alphanumeric());
    (has_underscore_case || has_camel_case) && token.len() >= 3
}

fn suggested_policies_for(intent: Intent) -> Vec<String> {
    match intent {
        Intent::Symbol => vec!["symbol-focused".to_string(), "graph-expand".to_string()],
        Intent::Config => vec!["config-focused".to_string()],
        Intent::Api => vec!["api-surface".to_string(), "graph-expand".to_string()],
        Intent::Incident => vec!["incident-recent".to_string(), "memory-boost".to_string()],
        Intent::Search => vec!["search-default".to_string()],
    }
}

fn extract_entities(query: &str, config: &IntentClassifierConfig) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut seen: BTreeSet<(EntityType, String)> = BTreeSet::new();
    for (idx, token) in query.split_whitespace().enumerate() {
        let cleaned = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '/' && c != '.');
        if cleaned.chars().count() < config.min_entity_len {
            continue;
        }
        let lower = cleaned.to_lowercase();
        if config.stop_words.iter().any(|w| w == &lower) {
            continue;
        }
        let entity_type = if cleaned.starts_with('/') {
            Some(EntityType::Route)
        } else if cleaned.starts_with('.')
            || cleaned.ends_with(".toml")
            || cleaned.ends_with(".yaml")
            || cleaned.ends_with(".yml")
            || cleaned.ends_with(".json")
            || cleaned.ends_with(".env")
        {
            Some(EntityType::Config)
        } else if cleaned.ends_with(".rs")
            || cleaned.ends_with(".py")
            || cleaned.ends_with(".ts")
            || cleaned.ends_with(".go")
        {
            Some(EntityType::File)
        } else if looks_like_identifier(cleaned) {
            if cleaned.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
                Some(EntityType::Class)
            } else {
                Some(EntityType::Function)
            }
        } else {
            None
        };
        if let Some(entity_type) = entity_type {
            let key = (entity_type, lower.clone());
            if seen.insert(key) {
                entities.push(Entity {
                    entity_type,
                    text: cleaned.to_string(),
                    position: idx,
                });
            }
        }
    }
    entities.sort_by_key(|e| e.position);
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_degrades_to_search() {
        let classifier = IntentClassifier::new();
        let result = classifier.classify("   ");
        assert_eq!(result.intent, Intent::Search);
        assert_eq!(result.confidence, 0.0);
        assert!(result.entities.is_empty());
    }

    #[test]
    fn incident_keywords_trigger_incident_intent() {
        let classifier = IntentClassifier::new();
        let result = classifier.classify("why does this crash with a panic");
        assert_eq!(result.intent, Intent::Incident);
        assert!(result.confidence >= 0.2);
    }

    #[test]
    fn camel_case_token_boosts_symbol_confidence() {
        let classifier = IntentClassifier::new();
        let result = classifier.classify("where is UserAuthenticator defined");
        assert_eq!(result.intent, Intent::Symbol);
    }

    #[test]
    fn force_intent_pins_confidence_to_one() {
        let classifier = IntentClassifier::new();
        let result = classifier.force_intent("anything", Intent::Api);
        assert_eq!(result.intent, Intent::Api);
        assert_eq!(result.confidence, 1.0);
        assert!(result.forced);
    }

    #[test]
    fn config_update_is_visible_without_reinstantiation() {
        let classifier = IntentClassifier::new();
        let mut config = classifier.config();
        config.incident_triggers = vec!["kaboom".to_string()];
        classifier.update_config(config);
        let result = classifier.classify("total kaboom happened");
        assert_eq!(result.intent, Intent::Incident);
    }

    #[test]
    fn entities_are_deduplicated_and_ordered() {
        let classifier = IntentClassifier::new();
        let result = classifier.classify("call handle_request then handle_request again in routes.rs");
        let texts: Vec<_> = result.entities.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts.iter().filter(|t| **t == "handle_request").count(), 1);
    }
}
