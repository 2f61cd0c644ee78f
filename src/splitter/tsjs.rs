//! TypeScript/JavaScript span extraction via `tree-sitter-typescript` and
//! `tree-sitter-javascript`.

use tree_sitter::{Node, Parser};

use crate::models::{Span, SpanKind};

pub fn split(file_path: &str, content: &str, typescript: bool) -> Option<Vec<Span>> {
    let mut parser = Parser::new();
    let language = if typescript {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    } else {
        tree_sitter_javascript::LANGUAGE.into()
    };
    parser.set_language(&language).ok()?;
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
        "function_declaration" => {
            let name = field_text(node, "name", source);
            out.push(span_from_node(
                node,
                source,
                file_path,
                SpanKind::Function,
                name,
            ));
        }
        "method_definition" => {
            let name = field_text(node, "name", source);
            out.push(span_from_node(
                node,
                source,
                file_path,
                SpanKind::Method,
                name,
            ));
        }
        "class_declaration" => {
            let name = field_text(node, "name", source);
            out.push(span_from_node(node, source, file_path, SpanKind::Class, name));
            if let Some(body) = node.child_by_field_name("body") {
                let mut cursor = body.walk();
                for child in body.children(&mut cursor) {
                    walk(&child, source, file_path, true, out);
                }
            }
            return;
        }
        "variable_declarator" => {
            // `const foo = () => { ... }` / `const foo = function() { ... }`
            if let Some(value) = node.child_by_field_name("value") {
                if matches!(value.kind(), "arrow_function" | "function_expression") {
                    let name = field_text(node, "name", source);
                    let kind = if in_class {
                        SpanKind::Method
                    } else {
                        SpanKind::Function
                    };
                    out.push(span_from_node(node, source, file_path, kind, name));
                    return;
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(&child, source, file_path, in_class, out);
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
    fn splits_javascript_function_and_class() {
        let src = "function foo() {\n  return 1;\n}\n\nclass Bar {\n  baz() {\n    return 2;\n  }\n}\n";
        let spans = split("a.js", src, false).unwrap();
        assert!(spans.iter().any(|s| s.name.as_deref() == Some("foo") && s.span_kind == SpanKind::Function));
        assert!(spans.iter().any(|s| s.name.as_deref() == Some("Bar") && s.span_kind == SpanKind::Class));
        assert!(spans.iter().any(|s| s.name.as_deref() == Some("baz") && s.span_kind == SpanKind::Method));
    }

    #[test]
    fn splits_typescript_arrow_function_const() {
        let src = "export const add = (a: number, b: number): number => {\n  return a + b;\n};\n";
        let spans = split("a.ts", src, true).unwrap();
        assert!(spans.iter().any(|s| s.name.as_deref() == Some("add")));
    }
}
