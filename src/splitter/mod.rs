//! Language-aware span splitter.
//!
//! Takes a file's full content and produces content-addressed [`Span`]s at
//! function/method/class boundaries for code, heading boundaries for
//! Markdown, or a single whole-file span when no structural splitter
//! applies or the parse fails.

mod markdown;
mod python;
mod tsjs;

use sha2::{Digest, Sha256};

use crate::models::{Span, SpanKind};

/// Detect a language tag from a file extension, for dispatch and for the
/// `files.language` column. Returns `"text"` for anything unrecognized.
pub fn language_for_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "py" | "pyi" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "md" | "markdown" => "markdown",
        _ => "text",
    }
}

/// Split a file's content into spans. `language` should come from
/// [`language_for_path`]. Never fails: on parser error or an unsupported
/// language, falls back to a single whole-file span with
/// `parse_degraded = true`.
pub fn split_file(file_path: &str, language: &str, content: &str) -> Vec<Span> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let spans = match language {
        "python" => python::split(file_path, content),
        "typescript" => tsjs::split(file_path, content, true),
        "javascript" => tsjs::split(file_path, content, false),
        "markdown" => Some(markdown::split(file_path, content)),
        _ => None,
    };

    let mut spans = match spans {
        Some(spans) if !spans.is_empty() => spans,
        _ => vec![whole_file_span(file_path, content, language != "text")],
    };

    for span in &mut spans {
        let symbol = span.name.as_deref().unwrap_or("");
        let kind = span.span_kind.as_db_str();
        span.span_hash = span_hash(language, symbol, &kind, &span.body);
    }
    spans
}

/// A whole-file fallback span, used when structural splitting isn't
/// available or didn't find anything. `parse_degraded` is set whenever the
/// language had a structural splitter that we expected to succeed.
fn whole_file_span(file_path: &str, content: &str, parse_degraded: bool) -> Span {
    let line_count = content.lines().count().max(1) as u32;
    Span {
        id: String::new(),
        file_path: file_path.to_string(),
        span_kind: SpanKind::Module,
        name: None,
        start_line: 1,
        end_line: line_count,
        byte_start: 0,
        byte_end: content.len(),
        body: content.to_string(),
        span_hash: String::new(),
        parse_degraded,
    }
}

/// Content hash over `{language, symbol, kind, body}`, normalized so
/// line-number-only moves and trailing whitespace don't change the hash.
/// Only trailing whitespace per line is stripped and blank lines are
/// dropped before hashing the body; leading indentation is preserved since
/// it's semantically significant in languages like Python.
pub fn span_hash(language: &str, symbol: &str, kind: &str, body: &str) -> String {
    let normalized_body: String = body
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let mut hasher = Sha256::new();
    hasher.update(language.as_bytes());
    hasher.update(b"\0");
    hasher.update(symbol.as_bytes());
    hasher.update(b"\0");
    hasher.update(kind.as_bytes());
    hasher.update(b"\0");
    hasher.update(normalized_body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Byte offset -> 1-based line number, for span boundary reporting.
pub(crate) fn line_for_byte(content: &str, byte_offset: usize) -> u32 {
    content[..byte_offset.min(content.len())]
        .bytes()
        .filter(|&b| b == b'\n')
        .count() as u32
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_hash_ignores_trailing_whitespace_and_blank_lines() {
        let a = "def f():\n    return 1\n";
        let b = "def f():   \n    return 1\n\n\n";
        assert_eq!(
            span_hash("python", "f", "function", a),
            span_hash("python", "f", "function", b)
        );
    }

    #[test]
    fn span_hash_sensitive_to_indentation() {
        let a = "def f():\n    return 1\n";
        let b = "def f():\n        return 1\n";
        assert_ne!(
            span_hash("python", "f", "function", a),
            span_hash("python", "f", "function", b)
        );
    }

    #[test]
    fn span_hash_sensitive_to_content() {
        assert_ne!(
            span_hash("python", "f", "function", "def f(): return 1"),
            span_hash("python", "f", "function", "def f(): return 2")
        );
    }

    #[test]
    fn span_hash_sensitive_to_kind_and_symbol() {
        let body = "pass";
        assert_ne!(
            span_hash("python", "f", "function", body),
            span_hash("python", "g", "function", body)
        );
        assert_ne!(
            span_hash("python", "f", "function", body),
            span_hash("python", "f", "method", body)
        );
    }

    #[test]
    fn unsupported_language_falls_back_to_whole_file_without_degraded_flag() {
        let spans = split_file("notes.txt", "text", "hello\nworld\n");
        assert_eq!(spans.len(), 1);
        assert!(!spans[0].parse_degraded);
        assert_eq!(spans[0].span_kind, SpanKind::Module);
    }

    #[test]
    fn empty_file_produces_no_spans() {
        assert!(split_file("empty.py", "python", "   \n\n").is_empty());
    }

    #[test]
    fn language_for_path_dispatches_known_extensions() {
        assert_eq!(language_for_path("src/main.py"), "python");
        assert_eq!(language_for_path("src/index.tsx"), "typescript");
        assert_eq!(language_for_path("src/app.js"), "javascript");
        assert_eq!(language_for_path("README.md"), "markdown");
        assert_eq!(language_for_path("data.bin"), "text");
    }
}
