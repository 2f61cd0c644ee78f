//! Markdown heading-aware splitter.
//!
//! Produces one span per heading (at any level), spanning from that
//! heading's line to the line before the next heading. Content preceding
//! the first heading becomes a single preamble block if non-empty.

use crate::models::{Span, SpanKind};

pub fn split(file_path: &str, content: &str) -> Vec<Span> {
    let lines: Vec<&str> = content.lines().collect();

    // Byte offset of the start of each line.
    let mut line_offsets = Vec::with_capacity(lines.len() + 1);
    let mut offset = 0usize;
    for line in &lines {
        line_offsets.push(offset);
        offset += line.len() + 1; // +1 for the newline we split on
    }
    line_offsets.push(content.len());

    let mut spans = Vec::new();
    let mut section_start_line = 0usize; // 0-based
    let mut current_level: Option<u8> = None;

    let flush = |spans: &mut Vec<Span>,
                 start: usize,
                 end: usize,
                 level: Option<u8>,
                 file_path: &str,
                 lines: &[&str],
                 line_offsets: &[usize]| {
        if start >= end {
            return;
        }
        let body = lines[start..end].join("\n");
        if body.trim().is_empty() {
            return;
        }
        let name = level.and_then(|_| {
            lines[start]
                .trim_start_matches('#')
                .trim()
                .to_string()
                .into()
        });
        spans.push(Span {
            id: String::new(),
            file_path: file_path.to_string(),
            span_kind: match level {
                Some(heading_level) => SpanKind::MarkdownSection { heading_level },
                None => SpanKind::Block,
            },
            name,
            start_line: start as u32 + 1,
            end_line: end as u32,
            byte_start: line_offsets[start],
            byte_end: line_offsets[end],
            body,
            span_hash: String::new(),
            parse_degraded: false,
        });
    };

    for (i, line) in lines.iter().enumerate() {
        if let Some(level) = heading_level(line) {
            flush(
                &mut spans,
                section_start_line,
                i,
                current_level,
                file_path,
                &lines,
                &line_offsets,
            );
            section_start_line = i;
            current_level = Some(level);
        }
    }
    flush(
        &mut spans,
        section_start_line,
        lines.len(),
        current_level,
        file_path,
        &lines,
        &line_offsets,
    );

    spans
}

/// Returns `Some(level)` (1-6) if `line` is an ATX-style Markdown heading.
fn heading_level(line: &str) -> Option<u8> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if rest.is_empty() || rest.starts_with(' ') {
        Some(hashes as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_headings_at_any_level() {
        let md = "# Title\n\nIntro text.\n\n## Section A\n\nBody A.\n\n## Section B\n\nBody B.\n";
        let spans = split("doc.md", md);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].name.as_deref(), Some("Title"));
        assert_eq!(
            spans[0].span_kind,
            SpanKind::MarkdownSection { heading_level: 1 }
        );
        assert_eq!(spans[1].name.as_deref(), Some("Section A"));
        assert_eq!(spans[2].name.as_deref(), Some("Section B"));
    }

    #[test]
    fn preamble_before_first_heading_becomes_block() {
        let md = "Some preamble.\n\n# Title\n\nBody.\n";
        let spans = split("doc.md", md);
        assert_eq!(spans[0].span_kind, SpanKind::Block);
        assert!(spans[0].body.contains("preamble"));
    }

    #[test]
    fn no_headings_yields_single_block() {
        let md = "Just plain text.\nNo headings here.\n";
        let spans = split("doc.md", md);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].span_kind, SpanKind::Block);
    }

    #[test]
    fn hash_without_space_is_not_a_heading() {
        assert_eq!(heading_level("#no-space"), None);
        assert_eq!(heading_level("## Valid"), Some(2));
    }
}
