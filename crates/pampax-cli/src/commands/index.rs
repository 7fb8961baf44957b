//! `pampax index`: walk a repository, extract spans/references, chunk and
//! (optionally) embed them, and load everything into the storage engine.

use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use colored::Colorize;
use globset::{Glob, GlobSet, GlobSetBuilder};
use pampax_core::error::{PampaxError, Result};
use pampax_core::storage::Storage;
use pampax_core::types::{chunk_id, Chunk, JobStatus};
use pampax_core::SpanExtractor;
use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::collaborators::NaiveSpanExtractor;

#[derive(Serialize)]
pub struct IndexReport {
    pub repo: String,
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub spans_extracted: usize,
    pub chunks_written: usize,
    pub references_written: usize,
    pub duration_ms: u64,
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| PampaxError::Config(format!("invalid glob pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| PampaxError::Config(format!("invalid glob set: {e}")))?;
    Ok(Some(set))
}

fn detect_language(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    let lang = match ext {
        "rs" => "rust",
        "py" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "md" => "markdown",
        "rst" => "restructuredtext",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        _ => return None,
    };
    Some(lang.to_string())
}

/// Extract, chunk, and store one already-read file. Returns the number of
/// spans and references written so the caller can keep a running total.
async fn index_one_file(
    storage: &Storage,
    extractor: &NaiveSpanExtractor,
    repo: &str,
    rel_str: &str,
    content: &[u8],
    language: Option<&str>,
    modified_time: chrono::DateTime<Utc>,
) -> Result<(usize, usize, usize)> {
    let content_hash = format!("{:x}", Sha256::digest(content));
    storage.upsert_file(repo, rel_str, &content_hash, language, content.len() as u64, modified_time)?;

    let (spans, references) = extractor.extract(repo, rel_str, content, language).await?;
    for span in &spans {
        storage.insert_span(span)?;
        let chunk_content =
            String::from_utf8_lossy(&content[span.byte_start as usize..span.byte_end as usize]).to_string();
        let chunk_hash = format!("{:x}", Sha256::digest(chunk_content.as_bytes()));
        let chunk = Chunk {
            id: chunk_id(&span.id, &chunk_hash),
            span_id: span.id.clone(),
            content: chunk_content,
            content_hash: chunk_hash,
        };
        storage.insert_chunk(&chunk)?;
    }
    for reference in &references {
        storage.insert_reference(reference)?;
    }
    Ok((spans.len(), references.len(), spans.len()))
}

pub async fn run(
    storage: &Storage,
    repo: &str,
    repo_root: &Path,
    include: &[String],
    exclude: &[String],
) -> Result<IndexReport> {
    let started = Instant::now();
    storage.start_job(repo, "index", Utc::now())?;

    let include_set = build_globset(include)?;
    let exclude_set = build_globset(exclude)?;
    let extractor = NaiveSpanExtractor;

    let mut files_scanned = 0usize;
    let mut files_indexed = 0usize;
    let mut spans_extracted = 0usize;
    let mut chunks_written = 0usize;
    let mut references_written = 0usize;
    let mut first_error: Option<PampaxError> = None;

    for entry in WalkDir::new(repo_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let rel_path = entry.path().strip_prefix(repo_root).unwrap_or(entry.path());
        let rel_str = rel_path.to_string_lossy().replace('\\', "/");
        files_scanned += 1;

        if exclude_set.as_ref().is_some_and(|set| set.is_match(&rel_str)) {
            continue;
        }
        if let Some(set) = &include_set {
            if !set.is_match(&rel_str) {
                continue;
            }
        }

        let Ok(content) = std::fs::read(entry.path()) else {
            continue;
        };
        let language = detect_language(entry.path());
        let modified_time = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(chrono::DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);

        let result = index_one_file(
            storage,
            &extractor,
            repo,
            &rel_str,
            &content,
            language.as_deref(),
            modified_time,
        )
        .await;

        match result {
            Ok((spans, references, _)) => {
                files_indexed += 1;
                spans_extracted += spans;
                chunks_written += spans;
                references_written += references;
            }
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    storage.rebuild_fts_index()?;

    let finished_at = Utc::now();
    match &first_error {
        Some(err) => storage.finish_job(repo, "index", JobStatus::Error, Some(&err.to_string()), finished_at)?,
        None => storage.finish_job(repo, "index", JobStatus::Ok, None, finished_at)?,
    }
    if let Some(err) = first_error {
        return Err(err);
    }

    Ok(IndexReport {
        repo: repo.to_string(),
        files_scanned,
        files_indexed,
        spans_extracted,
        chunks_written,
        references_written,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

pub fn render_text(report: &IndexReport) {
    println!("{}", "=== Pampax Index ===".cyan().bold());
    println!("{}: {}", "Repository".white().bold(), report.repo);
    println!("{}: {}", "Files scanned".white().bold(), report.files_scanned);
    println!("{}: {}", "Files indexed".white().bold(), report.files_indexed);
    println!("{}: {}", "Spans extracted".white().bold(), report.spans_extracted);
    println!("{}: {}", "Chunks written".white().bold(), report.chunks_written);
    println!(
        "{}: {}",
        "References written".white().bold(),
        report.references_written
    );
    println!("{}: {}ms", "Duration".white().bold(), report.duration_ms);
}
