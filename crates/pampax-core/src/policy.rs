//! Policy Gate: turns an intent (plus context hints) into a Retrieval
//! Policy with clamped, always-valid fields.

use crate::intent::Intent;
use std::collections::BTreeMap;

const MAX_DEPTH_RANGE: (u32, u32) = (1, 10);
const EARLY_STOP_RANGE: (u32, u32) = (1, 50);
const SEED_WEIGHT_RANGE: (f32, f32) = (0.0, 5.0);

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalPolicy {
    pub max_depth: u32,
    pub early_stop_threshold: u32,
    pub include_symbols: bool,
    pub include_files: bool,
    pub include_content: bool,
    pub seed_weights: BTreeMap<String, f32>,
    pub intent: Intent,
    pub confidence: f32,
    pub forced: bool,
}

fn clamp_u32(v: u32, range: (u32, u32)) -> u32 {
    v.clamp(range.0, range.1)
}

fn clamp_weight(v: f32) -> f32 {
    v.clamp(SEED_WEIGHT_RANGE.0, SEED_WEIGHT_RANGE.1)
}

/// Hints the caller can supply to override a policy default: an explicit
/// depth/threshold request, or seed-weight overrides by label.
#[derive(Debug, Clone, Default)]
pub struct ContextHints {
    pub max_depth: Option<u32>,
    pub early_stop_threshold: Option<u32>,
    pub seed_weight_overrides: BTreeMap<String, f32>,
}

fn default_seed_weights(intent: Intent) -> BTreeMap<String, f32> {
    let mut w = BTreeMap::new();
    match intent {
        Intent::Symbol => {
            w.insert("definition".to_string(), 3.0);
            w.insert("handler".to_string(), 1.0);
            w.insert("config".to_string(), 0.5);
            w.insert("error".to_string(), 0.5);
        }
        Intent::Config => {
            w.insert("definition".to_string(), 1.0);
            w.insert("handler".to_string(), 0.5);
            w.insert("config".to_string(), 3.0);
            w.insert("error".to_string(), 0.5);
        }
        Intent::Api => {
            w.insert("definition".to_string(), 2.0);
            w.insert("handler".to_string(), 3.0);
            w.insert("config".to_string(), 0.5);
            w.insert("error".to_string(), 0.5);
        }
        Intent::Incident => {
            w.insert("definition".to_string(), 1.0);
            w.insert("handler".to_string(), 1.0);
            w.insert("config".to_string(), 0.5);
            w.insert("error".to_string(), 3.0);
        }
        Intent::Search => {
            w.insert("definition".to_string(), 1.0);
            w.insert("handler".to_string(), 1.0);
            w.insert("config".to_string(), 1.0);
            w.insert("error".to_string(), 1.0);
        }
    }
    w
}

fn default_policy_for(intent: Intent, confidence: f32, forced: bool) -> RetrievalPolicy {
    let (max_depth, early_stop_threshold, include_symbols, include_files, include_content) = match intent {
        Intent::Symbol => (4, 15, true, true, true),
        Intent::Config => (2, 10, false, true, true),
        Intent::Api => (3, 20, true, true, true),
        Intent::Incident => (3, 25, true, true, true),
        Intent::Search => (2, 10, true, true, true),
    };
    RetrievalPolicy {
        max_depth: clamp_u32(max_depth, MAX_DEPTH_RANGE),
        early_stop_threshold: clamp_u32(early_stop_threshold, EARLY_STOP_RANGE),
        include_symbols,
        include_files,
        include_content,
        seed_weights: default_seed_weights(intent),
        intent,
        confidence,
        forced,
    }
}

/// Build a Retrieval Policy for `(intent, confidence)`, applying
/// `hints` overrides and the packing profile's seed-weight overrides (if
/// any), then clamping every field so the result is always valid.
pub fn build_policy(
    intent: Intent,
    confidence: f32,
    forced: bool,
    hints: &ContextHints,
    profile_seed_weights: Option<&BTreeMap<String, f32>>,
) -> RetrievalPolicy {
    let mut policy = default_policy_for(intent, confidence.clamp(0.0, 1.0), forced);

    if let Some(d) = hints.max_depth {
        policy.max_depth = clamp_u32(d, MAX_DEPTH_RANGE);
    }
    if let Some(t) = hints.early_stop_threshold {
        policy.early_stop_threshold = clamp_u32(t, EARLY_STOP_RANGE);
    }
    if let Some(overrides) = profile_seed_weights {
        for (label, weight) in overrides {
            policy.seed_weights.insert(label.clone(), clamp_weight(*weight));
        }
    }
    for (label, weight) in &hints.seed_weight_overrides {
        policy.seed_weights.insert(label.clone(), clamp_weight(*weight));
    }
    for w in policy.seed_weights.values_mut() {
        *w = clamp_weight(*w);
    }
    policy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_hints_are_clamped() {
        let hints = ContextHints {
            max_depth: Some(99),
            early_stop_threshold: Some(0),
            seed_weight_overrides: BTreeMap::new(),
        };
        let policy = build_policy(Intent::Symbol, 0.5, false, &hints, None);
        assert_eq!(policy.max_depth, MAX_DEPTH_RANGE.1);
        assert_eq!(policy.early_stop_threshold, EARLY_STOP_RANGE.0);
    }

    #[test]
    fn seed_weight_overrides_are_clamped() {
        let mut overrides = BTreeMap::new();
        overrides.insert("error".to_string(), 999.0);
        let hints = ContextHints {
            max_depth: None,
            early_stop_threshold: None,
            seed_weight_overrides: overrides,
        };
        let policy = build_policy(Intent::Incident, 0.9, false, &hints, None);
        assert_eq!(policy.seed_weights["error"], SEED_WEIGHT_RANGE.1);
    }

    #[test]
    fn forced_intent_is_recorded_on_policy() {
        let hints = ContextHints::default();
        let policy = build_policy(Intent::Api, 1.0, true, &hints, None);
        assert!(policy.forced);
        assert_eq!(policy.intent, Intent::Api);
    }

    #[test]
    fn profile_overrides_apply_before_hint_overrides() {
        let mut profile_weights = BTreeMap::new();
        profile_weights.insert("handler".to_string(), 4.0);
        let mut hint_weights = BTreeMap::new();
        hint_weights.insert("handler".to_string(), 1.5);
        let hints = ContextHints {
            max_depth: None,
            early_stop_threshold: None,
            seed_weight_overrides: hint_weights,
        };
        let policy = build_policy(Intent::Api, 0.8, false, &hints, Some(&profile_weights));
        assert_eq!(policy.seed_weights["handler"], 1.5);
    }
}
