//! Default collaborator implementations used when the CLI is run without a
//! host-supplied span extractor or embedding provider. Both are heuristic
//! stand-ins: real span extraction belongs to a tree-sitter/LSP-backed
//! indexer and real embeddings to a model server, neither of which this
//! workspace depends on.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use pampax_core::error::Result;
use pampax_core::types::{span_id, Reference, ReferenceKind, Span, SpanKind};
use pampax_core::{EmbeddingProvider, SpanExtractor};

type Line = (usize, usize, String);

fn split_lines(content: &[u8]) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, &b) in content.iter().enumerate() {
        if b == b'\n' {
            lines.push((start, i, String::from_utf8_lossy(&content[start..i]).to_string()));
            start = i + 1;
        }
    }
    if start < content.len() {
        lines.push((start, content.len(), String::from_utf8_lossy(&content[start..]).to_string()));
    }
    lines
}

const MODIFIER_PREFIXES: &[&str] = &[
    "pub(crate) ", "pub ", "async ", "export ", "public ", "private ", "protected ",
];

fn strip_modifiers(mut s: &str) -> &str {
    loop {
        match MODIFIER_PREFIXES.iter().find_map(|m| s.strip_prefix(m)) {
            Some(rest) => s = rest,
            None => return s,
        }
    }
}

const FUNCTION_PREFIXES: &[&str] = &["fn ", "func ", "function ", "def "];
const CLASS_PREFIXES: &[&str] = &["class ", "struct ", "interface ", "trait "];
const CONST_PREFIXES: &[&str] = &["const ", "static "];

fn classify_signature(stripped: &str) -> Option<(SpanKind, usize)> {
    for p in FUNCTION_PREFIXES {
        if stripped.starts_with(p) {
            return Some((SpanKind::Function, p.len()));
        }
    }
    for p in CLASS_PREFIXES {
        if stripped.starts_with(p) {
            return Some((SpanKind::Class, p.len()));
        }
    }
    for p in CONST_PREFIXES {
        if stripped.starts_with(p) {
            return Some((SpanKind::Constant, p.len()));
        }
    }
    None
}

fn extract_name(after_keyword: &str) -> String {
    after_keyword.chars().take_while(|c| c.is_alphanumeric() || *c == '_').collect()
}

/// Find the closing line of a span starting at `start_idx`: brace-depth
/// tracking for brace-delimited languages, indentation tracking otherwise.
fn find_span_end(lines: &[Line], start_idx: usize) -> usize {
    let braces_ahead = lines[start_idx..]
        .iter()
        .take(3)
        .any(|(_, _, text)| text.contains('{'));
    if braces_ahead {
        let mut depth = 0i32;
        let mut opened = false;
        for (i, (_, _, text)) in lines.iter().enumerate().skip(start_idx) {
            for ch in text.chars() {
                match ch {
                    '{' => {
                        depth += 1;
                        opened = true;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            if opened && depth <= 0 {
                return i;
            }
        }
        lines.len().saturating_sub(1)
    } else {
        let sig = &lines[start_idx].2;
        let indent = sig.len() - sig.trim_start().len();
        let mut end = start_idx;
        for (i, (_, _, text)) in lines.iter().enumerate().skip(start_idx + 1) {
            if text.trim().is_empty() {
                end = i;
                continue;
            }
            let this_indent = text.len() - text.trim_start().len();
            if this_indent <= indent {
                break;
            }
            end = i;
        }
        end
    }
}

fn capture_doc(lines: &[Line], start_idx: usize) -> Option<String> {
    let mut doc_lines = Vec::new();
    let mut i = start_idx;
    while i > 0 {
        i -= 1;
        let trimmed = lines[i].2.trim();
        if trimmed.starts_with("//") || trimmed.starts_with('#') || trimmed.starts_with('*') {
            doc_lines.push(trimmed.to_string());
        } else {
            break;
        }
    }
    if doc_lines.is_empty() {
        None
    } else {
        doc_lines.reverse();
        Some(doc_lines.join("\n"))
    }
}

fn hash_ref(src_span_id: &str, dst_name: &str, line_start: usize) -> String {
    let mut hasher = DefaultHasher::new();
    src_span_id.hash(&mut hasher);
    dst_name.hash(&mut hasher);
    line_start.hash(&mut hasher);
    format!("ref_{:016x}", hasher.finish())
}

/// Calls within a span's body to another extracted span's name, matched by
/// `name(` substring search. No type resolution, no cross-file edges —
/// good enough to exercise graph expansion against locally indexed code.
fn resolve_naive_references(path: &str, spans: &[Span], lines: &[Line]) -> Vec<Reference> {
    let mut references = Vec::new();
    for span in spans {
        for (line_start, _, text) in lines {
            if (*line_start as u64) < span.byte_start || (*line_start as u64) >= span.byte_end {
                continue;
            }
            for target in spans {
                if target.id == span.id || target.name.is_empty() {
                    continue;
                }
                let pattern = format!("{}(", target.name);
                if text.contains(&pattern) {
                    references.push(Reference {
                        id: hash_ref(&span.id, &target.name, *line_start),
                        src_span_id: span.id.clone(),
                        dst_path: path.to_string(),
                        dst_byte_start: target.byte_start,
                        dst_byte_end: target.byte_end,
                        kind: ReferenceKind::Call,
                        confidence: 0.3,
                    });
                }
            }
        }
    }
    references
}

/// Heuristic, language-agnostic span extractor: scans for function/class/
/// constant declaration keywords line-by-line and closes each span by
/// brace-depth (C-like syntax) or indentation (Python-like syntax).
#[derive(Debug, Default, Clone, Copy)]
pub struct NaiveSpanExtractor;

#[async_trait]
impl SpanExtractor for NaiveSpanExtractor {
    async fn extract(
        &self,
        repo: &str,
        path: &str,
        content: &[u8],
        _language: Option<&str>,
    ) -> Result<(Vec<Span>, Vec<Reference>)> {
        let lines = split_lines(content);
        let mut spans = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let stripped = strip_modifiers(lines[i].2.trim_start());
            if let Some((kind, kw_len)) = classify_signature(stripped) {
                let name = extract_name(&stripped[kw_len..]);
                if !name.is_empty() {
                    let end_idx = find_span_end(&lines, i);
                    let byte_start = lines[i].0 as u64;
                    let byte_end = lines[end_idx].1 as u64;
                    let doc = capture_doc(&lines, i);
                    let signature = Some(lines[i].2.trim().to_string());
                    let id = span_id(
                        repo,
                        path,
                        byte_start,
                        byte_end,
                        kind,
                        &name,
                        signature.as_deref(),
                        doc.as_deref(),
                        &[],
                    );
                    spans.push(Span {
                        id,
                        repo: repo.to_string(),
                        path: path.to_string(),
                        byte_start,
                        byte_end,
                        kind,
                        name,
                        signature,
                        doc,
                        parents: Vec::new(),
                    });
                    i = end_idx + 1;
                    continue;
                }
            }
            i += 1;
        }
        let references = resolve_naive_references(path, &spans, &lines);
        Ok((spans, references))
    }
}

/// Hash-based pseudo-embeddings. Deterministic and fast but not
/// semantically meaningful — a stand-in for a real embedding model so
/// vector search has something to rank against in a fresh checkout.
pub struct HashEmbeddingProvider {
    model: String,
    dimension: u32,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: u32) -> Self {
        Self { model: format!("hash-fallback-{dimension}"), dimension }
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

fn text_to_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let mut seed = hasher.finish();
    let mut vector = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let value = ((seed >> 16) as f32) / 32768.0 - 1.0;
        vector.push(value);
    }
    let magnitude = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in &mut vector {
            *x /= magnitude;
        }
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> u32 {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| text_to_vector(t, self.dimension as usize)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_rust_function_span() {
        let content = b"// doubles a number\npub fn double(x: i32) -> i32 {\n    x * 2\n}\n";
        let (spans, _) = NaiveSpanExtractor.extract("r", "lib.rs", content, Some("rust")).await.unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "double");
        assert_eq!(spans[0].kind, SpanKind::Function);
        assert_eq!(spans[0].doc.as_deref(), Some("// doubles a number"));
    }

    #[tokio::test]
    async fn extracts_python_function_by_indentation() {
        let content = b"def greet(name):\n    return f\"hi {name}\"\n\nprint(\"done\")\n";
        let (spans, _) = NaiveSpanExtractor.extract("r", "a.py", content, Some("python")).await.unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "greet");
    }

    #[tokio::test]
    async fn detects_naive_call_reference() {
        let content = b"fn helper() {\n    1\n}\n\nfn main() {\n    helper();\n}\n";
        let (spans, references) = NaiveSpanExtractor.extract("r", "m.rs", content, Some("rust")).await.unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].kind, ReferenceKind::Call);
    }

    #[tokio::test]
    async fn hash_embeddings_are_deterministic_and_distinct() {
        let provider = HashEmbeddingProvider::default();
        let a = provider.embed(&["hello world".to_string()]).await.unwrap();
        let b = provider.embed(&["hello world".to_string()]).await.unwrap();
        let c = provider.embed(&["different".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        let magnitude: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.001);
    }
}
