//! Per-subcommand implementations. Each module exposes a `run`-style
//! function returning a `Serialize`-able report plus a `render_text` for
//! the human-readable path; `main.rs` picks one based on `OutputMode`.

pub mod graph;
pub mod health;
pub mod index;
pub mod info;
pub mod intent;
pub mod migrate;
pub mod search;

use pampax_core::error::{PampaxError, Result};
use pampax_core::intent::Intent;

/// Parse a CLI-supplied intent name. Unlike `SpanKind`/`ReferenceKind`
/// parsing elsewhere in the core crate, an unrecognized intent here is a
/// user input mistake worth surfacing rather than silently defaulting.
pub fn parse_intent(name: &str) -> Result<Intent> {
    match name.to_lowercase().as_str() {
        "symbol" => Ok(Intent::Symbol),
        "config" => Ok(Intent::Config),
        "api" => Ok(Intent::Api),
        "incident" => Ok(Intent::Incident),
        "search" => Ok(Intent::Search),
        other => Err(PampaxError::Config(format!(
            "unknown intent '{other}' (expected one of symbol, config, api, incident, search)"
        ))),
    }
}

/// Lowercased `Debug` label for a `Copy` enum whose variants are all single
/// words (`EvidenceSource`, `EntityType`) — cheaper than a dedicated match
/// arm per call site and matches the snake_case the enums already serialize
/// as via serde.
pub fn debug_lower<T: std::fmt::Debug>(v: T) -> String {
    format!("{v:?}").to_lowercase()
}

/// UTF-8-safe truncation to at most `max_chars` characters, appending an
/// ellipsis when content was cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('\u{2026}');
    out
}
