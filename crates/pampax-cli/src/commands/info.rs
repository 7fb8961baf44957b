//! `pampax info`: repository-level statistics and schema version.

use colored::Colorize;
use pampax_core::error::Result;
use pampax_core::storage::Storage;
use serde::Serialize;

#[derive(Serialize)]
pub struct InfoReport {
    pub repo: String,
    pub schema_version: u32,
    pub file_count: u64,
    pub avg_chunk_size: f64,
    pub documentation_ratio: f64,
    pub dominant_language_ratio: f64,
}

pub fn run(storage: &Storage, repo: &str) -> Result<InfoReport> {
    let stats = storage.repo_stats(repo)?;
    let schema_version = storage.schema_version()?;
    Ok(InfoReport {
        repo: repo.to_string(),
        schema_version,
        file_count: stats.file_count,
        avg_chunk_size: stats.avg_chunk_size,
        documentation_ratio: stats.documentation_ratio,
        dominant_language_ratio: stats.dominant_language_ratio,
    })
}

pub fn render_text(report: &InfoReport) {
    println!("{}", "=== Pampax Info ===".cyan().bold());
    println!("{}: {}", "Repository".white().bold(), report.repo);
    println!("{}: {}", "Schema version".white().bold(), report.schema_version);
    println!("{}: {}", "Files".white().bold(), report.file_count);
    println!("{}: {:.1}", "Avg chunk size".white().bold(), report.avg_chunk_size);
    println!(
        "{}: {:.2}%",
        "Documentation ratio".white().bold(),
        report.documentation_ratio * 100.0
    );
    println!(
        "{}: {:.2}%",
        "Dominant language ratio".white().bold(),
        report.dominant_language_ratio * 100.0
    );
}
