//! `pampax graph`: seed a bounded traversal from a symbol name and report
//! what was visited.

use colored::Colorize;
use pampax_core::error::{PampaxError, Result};
use pampax_core::graph::{ExpansionStrategy, GraphTraversal};
use pampax_core::storage::Storage;
use pampax_core::types::ReferenceKind;
use serde::Serialize;

const DEFAULT_TOKEN_BUDGET: u64 = 4096;
const DEFAULT_MAX_DEPTH: u32 = 2;

fn parse_kinds(raw: &str) -> Result<Vec<ReferenceKind>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            ReferenceKind::parse(s)
                .ok_or_else(|| PampaxError::Config(format!("unknown reference kind '{s}'")))
        })
        .collect()
}

#[derive(Serialize)]
pub struct GraphReport {
    pub symbol: String,
    pub seeds: Vec<String>,
    pub visited_nodes: Vec<String>,
    pub edge_count: usize,
    pub expansion_depth: u32,
    pub tokens_used: u64,
    pub token_budget: u64,
    pub truncated: bool,
    pub cache_hit: bool,
}

pub fn run(
    storage: &Storage,
    graph: &GraphTraversal,
    repo: &str,
    symbol: &str,
    neighbors: u32,
    types: Option<&str>,
) -> Result<GraphReport> {
    let max_depth = neighbors.clamp(1, 5);
    let kinds = types.map(parse_kinds).transpose()?;

    let matches = storage.search_symbols_by_name(repo, symbol, 5, None)?;
    let seeds: Vec<String> = if matches.is_empty() {
        vec![symbol.to_string()]
    } else {
        matches.into_iter().map(|s| s.id).collect()
    };

    let estimator = |_: &str| 32u64;
    let result = graph.traverse(
        storage,
        repo,
        &seeds,
        kinds.as_deref(),
        max_depth,
        ExpansionStrategy::Breadth,
        DEFAULT_TOKEN_BUDGET,
        symbol,
        &estimator,
    )?;

    Ok(GraphReport {
        symbol: symbol.to_string(),
        seeds,
        visited_nodes: result.visited_nodes,
        edge_count: result.edges.len(),
        expansion_depth: result.expansion_depth,
        tokens_used: result.tokens_used,
        token_budget: result.token_budget,
        truncated: result.truncated,
        cache_hit: result.cache_hit,
    })
}

pub fn render_text(report: &GraphReport) {
    println!("{}", "=== Pampax Graph ===".cyan().bold());
    println!("{}: {}", "Symbol".white().bold(), report.symbol);
    println!("{}: {}", "Seeds".white().bold(), report.seeds.join(", "));
    println!("{}: {}", "Expansion depth".white().bold(), report.expansion_depth);
    println!(
        "{}: {}/{}{}",
        "Tokens used".white().bold(),
        report.tokens_used,
        report.token_budget,
        if report.truncated { " (truncated)" } else { "" }
    );
    println!("{}: {}", "Cache hit".white().bold(), report.cache_hit);
    println!("{}: {}", "Edges".white().bold(), report.edge_count);
    println!("{}:", "Visited nodes".white().bold());
    for node in &report.visited_nodes {
        println!("  - {node}");
    }
}
