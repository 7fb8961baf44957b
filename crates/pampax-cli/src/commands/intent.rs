//! `pampax intent analyze|show`: expose the intent classifier and the
//! policy a given intent resolves to, without running a search.

use colored::Colorize;
use pampax_core::error::Result;
use pampax_core::intent::IntentClassifier;
use pampax_core::policy::{build_policy, ContextHints};
use serde::Serialize;

use crate::commands::{debug_lower, parse_intent};

#[derive(Serialize)]
pub struct EntityReport {
    pub entity_type: String,
    pub text: String,
    pub position: usize,
}

#[derive(Serialize)]
pub struct AnalyzeReport {
    pub query: String,
    pub intent: String,
    pub confidence: f32,
    pub forced: bool,
    pub entities: Vec<EntityReport>,
    pub suggested_policies: Vec<String>,
}

pub fn analyze(query: &str) -> AnalyzeReport {
    let classifier = IntentClassifier::new();
    let result = classifier.classify(query);
    AnalyzeReport {
        query: query.to_string(),
        intent: result.intent.as_str().to_string(),
        confidence: result.confidence,
        forced: result.forced,
        entities: result
            .entities
            .iter()
            .map(|e| EntityReport {
                entity_type: debug_lower(e.entity_type),
                text: e.text.clone(),
                position: e.position,
            })
            .collect(),
        suggested_policies: result.suggested_policies,
    }
}

pub fn render_analyze_text(report: &AnalyzeReport) {
    println!("{}", "=== Pampax Intent Analyze ===".cyan().bold());
    println!("{}: {}", "Query".white().bold(), report.query);
    println!(
        "{}: {} (confidence {:.2}{})",
        "Intent".white().bold(),
        report.intent,
        report.confidence,
        if report.forced { ", forced" } else { "" }
    );
    println!("{}", "Entities:".white().bold());
    for e in &report.entities {
        println!("  - {} [{}] @ {}", e.text, e.entity_type, e.position);
    }
    println!(
        "{}: {}",
        "Suggested policies".white().bold(),
        report.suggested_policies.join(", ")
    );
}

#[derive(Serialize)]
pub struct ShowReport {
    pub intent: String,
    pub max_depth: u32,
    pub early_stop_threshold: u32,
    pub include_symbols: bool,
    pub include_files: bool,
    pub include_content: bool,
    pub seed_weights: std::collections::BTreeMap<String, f32>,
    pub confidence: f32,
    pub forced: bool,
}

pub fn show(intent_name: &str) -> Result<ShowReport> {
    let intent = parse_intent(intent_name)?;
    let policy = build_policy(intent, 1.0, false, &ContextHints::default(), None);
    Ok(ShowReport {
        intent: policy.intent.as_str().to_string(),
        max_depth: policy.max_depth,
        early_stop_threshold: policy.early_stop_threshold,
        include_symbols: policy.include_symbols,
        include_files: policy.include_files,
        include_content: policy.include_content,
        seed_weights: policy.seed_weights,
        confidence: policy.confidence,
        forced: policy.forced,
    })
}

pub fn render_show_text(report: &ShowReport) {
    println!("{}", "=== Pampax Intent Policy ===".cyan().bold());
    println!("{}: {}", "Intent".white().bold(), report.intent);
    println!("{}: {}", "Max depth".white().bold(), report.max_depth);
    println!("{}: {}", "Early stop threshold".white().bold(), report.early_stop_threshold);
    println!("{}: {}", "Include symbols".white().bold(), report.include_symbols);
    println!("{}: {}", "Include files".white().bold(), report.include_files);
    println!("{}: {}", "Include content".white().bold(), report.include_content);
    println!("{}:", "Seed weights".white().bold());
    for (k, v) in &report.seed_weights {
        println!("  - {k}: {v:.2}");
    }
}
