//! `pampax migrate`: apply or roll back schema migrations.

use colored::Colorize;
use pampax_core::error::Result;
use pampax_core::storage::Storage;
use serde::Serialize;

#[derive(Serialize)]
pub struct MigrateReport {
    pub from_version: u32,
    pub to_version: u32,
    pub direction: &'static str,
}

pub fn run(storage: &Storage, to: Option<u32>) -> Result<MigrateReport> {
    let from_version = storage.schema_version()?;
    let (to_version, direction) = match to {
        Some(target) if target < from_version => (storage.rollback_to(target)?, "rollback"),
        Some(target) => (storage.migrate(Some(target))?, "migrate"),
        None => (storage.migrate(None)?, "migrate"),
    };
    Ok(MigrateReport {
        from_version,
        to_version,
        direction,
    })
}

pub fn render_text(report: &MigrateReport) {
    println!("{}", "=== Pampax Migrate ===".cyan().bold());
    println!(
        "{}: {} -> {} ({})",
        "Schema version".white().bold(),
        report.from_version,
        report.to_version,
        report.direction
    );
}
