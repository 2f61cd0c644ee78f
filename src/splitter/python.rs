//! Python span extraction via `tree-sitter-python`.

use tree_sitter::{Node, Parser};

use crate::models::{Span, SpanKind};

pub fn split(file_path: &str, content: &str) -> Option<Vec<Span>> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_python::LANGUAGE.into()).ok()?;
    let tree = parser.parse(content, None)?;

    let mut spans = Vec::new();
    let source = content.as_bytes();
    let mut cursor = tree.root_node().walk();
    for child in tree.root_node().children(&mut cursor) {
        walk(&child, source, file_path, false, &mut spans);
    }
    Some(spans)
}

fn walk(node: &Node, source: &[u8], file_path: &str, in_class: bool, out: &mut Vec<Span>) {
    match node.kind() {
        "function_definition" => {
            let name = field_text(node, "name", source);
            let kind = if in_class {
                SpanKind::Method
            } else {
                SpanKind::Function
            };
            out.push(span_from_node(node, source, file_path, kind, name));
            // Nested functions still get their own span; don't descend for
            // method detection since a def's body isn't a class.
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                walk(&child, source, file_path, false, out);
            }
        }
        "class_definition" => {
            let name = field_text(node, "name", source);
            out.push(span_from_node(
                node,
                source,
                file_path,
                SpanKind::Class,
                name,
            ));
            if let Some(body) = node.child_by_field_name("body") {
                let mut cursor = body.walk();
                for child in body.children(&mut cursor) {
                    walk(&child, source, file_path, true, out);
                }
            }
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                walk(&child, source, file_path, in_class, out);
            }
        }
    }
}

fn field_text(node: &Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|n| n.utf8_text(source).ok())
        .map(|s| s.to_string())
}

fn span_from_node(
    node: &Node,
    source: &[u8],
    file_path: &str,
    kind: SpanKind,
    name: Option<String>,
) -> Span {
    let body = node.utf8_text(source).unwrap_or_default().to_string();
    Span {
        id: String::new(),
        file_path: file_path.to_string(),
        span_kind: kind,
        name,
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        byte_start: node.start_byte(),
        byte_end: node.end_byte(),
        body,
        span_hash: String::new(),
        parse_degraded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_top_level_functions_and_classes() {
        let src = "def foo():\n    pass\n\nclass Bar:\n    def baz(self):\n        pass\n";
        let spans = split("a.py", src).unwrap();
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].name.as_deref(), Some("foo"));
        assert_eq!(spans[0].span_kind, SpanKind::Function);
        assert_eq!(spans[1].name.as_deref(), Some("Bar"));
        assert_eq!(spans[1].span_kind, SpanKind::Class);
        assert_eq!(spans[2].name.as_deref(), Some("baz"));
        assert_eq!(spans[2].span_kind, SpanKind::Method);
    }

    #[test]
    fn invalid_syntax_still_parses_partial_tree() {
        // tree-sitter is error-tolerant; this should not panic and should
        // still find the well-formed function.
        let src = "def ok():\n    pass\n\ndef broken(:\n";
        let spans = split("a.py", src).unwrap();
        assert!(spans.iter().any(|s| s.name.as_deref() == Some("ok")));
    }
}
