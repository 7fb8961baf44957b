//! `pampax health`: aggregate database, cache, memory, and config health
//! into one status with a process exit code that reflects the worst one.

use std::path::Path;

use colored::Colorize;
use pampax_core::config::Config;
use pampax_core::reliability::{
    cache_component, config_component, database_component, memory_component, AggregateHealth, HealthStatus,
};
use pampax_core::retrieval::SeedMixOptimizer;
use pampax_core::storage::Storage;
use serde::Serialize;

fn current_rss_bytes() -> u64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return 0;
    };
    status
        .lines()
        .find(|l| l.starts_with("VmRSS:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
        .unwrap_or(0)
}

#[derive(Serialize)]
pub struct ComponentReport {
    pub name: String,
    pub status: String,
    pub detail: String,
}

#[derive(Serialize)]
pub struct HealthReportOut {
    pub status: String,
    pub components: Vec<ComponentReport>,
}

impl HealthReportOut {
    pub fn exit_code(&self) -> i32 {
        match self.status.as_str() {
            "healthy" | "degraded" => 0,
            _ => 1,
        }
    }
}

fn status_label(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Degraded => "degraded",
        HealthStatus::Unhealthy => "unhealthy",
    }
}

pub fn run(
    storage: &Storage,
    optimizer: &SeedMixOptimizer,
    config_path: Option<&Path>,
    cache_capacity: usize,
    warn_below: f64,
) -> HealthReportOut {
    let db_report = storage.health_check();
    let db_component = database_component(&db_report);

    let (hits, misses) = optimizer.cache_stats();
    let total = hits + misses;
    let hit_rate = if total == 0 { 1.0 } else { hits as f64 / total as f64 };
    let cache_comp = cache_component(hit_rate, cache_capacity, warn_below);

    let mem_comp = memory_component(current_rss_bytes(), 1024 * 1024 * 1024);

    let config_validation = Config::load(config_path).map(|_| ());
    let config_comp = config_component(&config_validation);

    let aggregate = AggregateHealth::from_components(vec![db_component, cache_comp, mem_comp, config_comp]);

    HealthReportOut {
        status: status_label(aggregate.status).to_string(),
        components: aggregate
            .components
            .into_iter()
            .map(|c| ComponentReport {
                name: c.name.to_string(),
                status: status_label(c.status).to_string(),
                detail: c.detail,
            })
            .collect(),
    }
}

pub fn render_text(report: &HealthReportOut) {
    println!("{}", "=== Pampax Health ===".cyan().bold());
    let colored_status = match report.status.as_str() {
        "healthy" => report.status.green().bold(),
        "degraded" => report.status.yellow().bold(),
        _ => report.status.red().bold(),
    };
    println!("{}: {}", "Overall".white().bold(), colored_status);
    for c in &report.components {
        println!("  - {}: {} ({})", c.name, c.status, c.detail);
    }
}
