//! Shared JSON/text output envelope.
//!
//! Every JSON result carries a `_meta{mode,timestamp,corr_id}` object; keys
//! within the body are emitted in sorted order for byte-stable piping, which
//! falls out of `serde_json`'s default `BTreeMap`-backed `Map` (the
//! `preserve_order` feature is never enabled in this workspace).

use std::io::IsTerminal;

use chrono::Utc;
use colored::Colorize;
use pampax_core::PampaxError;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Json,
    Text,
}

impl OutputMode {
    /// `--format json|text`, falling back to JSON when stdout isn't a TTY
    /// and to text when it is, per the CLI's common-flags contract.
    pub fn resolve(format: Option<&str>) -> Self {
        match format {
            Some("json") => OutputMode::Json,
            Some("text") => OutputMode::Text,
            _ => {
                if std::io::stdout().is_terminal() {
                    OutputMode::Text
                } else {
                    OutputMode::Json
                }
            }
        }
    }
}

pub struct OutputEnvelope {
    mode: OutputMode,
    corr_id: String,
}

impl OutputEnvelope {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            corr_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn corr_id(&self) -> &str {
        &self.corr_id
    }

    /// Emit a successful JSON result, stamping `_meta` onto the body.
    pub fn emit_json<T: Serialize>(&self, body: &T) {
        let mut value = serde_json::to_value(body).unwrap_or(Value::Null);
        let meta = json!({
            "mode": "json",
            "timestamp": Utc::now().to_rfc3339(),
            "corr_id": self.corr_id,
        });
        if let Value::Object(ref mut map) = value {
            map.insert("_meta".to_string(), meta);
        }
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
    }

    /// Emit a non-fatal error report, mirroring the JSON success envelope's
    /// `_meta` shape (spec §6's error envelope).
    pub fn emit_error(&self, err: &PampaxError) {
        match self.mode {
            OutputMode::Json => {
                let value = json!({
                    "success": false,
                    "error": err.to_string(),
                    "error_code": err.error_code(),
                    "_meta": {
                        "mode": "json",
                        "timestamp": Utc::now().to_rfc3339(),
                        "corr_id": self.corr_id,
                    },
                });
                println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
            }
            OutputMode::Text => {
                eprintln!(
                    "{} {} {}",
                    "error:".red().bold(),
                    err,
                    format!("(corr_id={})", self.corr_id).dimmed()
                );
            }
        }
    }
}
