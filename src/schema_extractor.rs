//! Schema extractor: derives [`Entity`]/[`Relation`] rows from a
//! parsed span by walking its tree-sitter subtree for call expressions,
//! imports, and class bases. Unresolved call targets are kept as
//! low-confidence relations pointing at a name rather than an entity id.

use std::collections::HashSet;

use anyhow::Result;
use tree_sitter::{Node, Parser};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::models::{Entity, EntityKind, Relation, RelationKind, SpanKind};
use crate::splitter::language_for_path;

fn entity_kind_for_span(kind: &SpanKind) -> Option<EntityKind> {
    match kind {
        SpanKind::Function => Some(EntityKind::Function),
        SpanKind::Method => Some(EntityKind::Method),
        SpanKind::Class => Some(EntityKind::Class),
        SpanKind::Module => Some(EntityKind::Module),
        SpanKind::MarkdownSection { .. } | SpanKind::Block => None,
    }
}

/// Rebuild the entity/relation graph for every span currently in the
/// catalog. Runs in two passes: first every span's own entity is extracted
/// (so call/import targets can resolve against the full set), then
/// relations are re-extracted with a resolver backed by that full set and
/// written per span.
pub async fn build_graph(catalog: &Catalog) -> Result<usize> {
    let spans = catalog.all_spans().await?;

    let mut candidates: Vec<(String, String, String)> = Vec::new();
    for span in &spans {
        if entity_kind_for_span(&span.span_kind).is_none() {
            continue;
        }
        if let Some(name) = &span.name {
            candidates.push((span.id.clone(), name.clone(), span.file_path.clone()));
        }
    }

    let mut spans_processed = 0;
    for span in &spans {
        let Some(entity_kind) = entity_kind_for_span(&span.span_kind) else {
            continue;
        };
        let language = language_for_path(&span.file_path);
        let imported: HashSet<&str> = HashSet::new();
        let from_file = span.file_path.clone();
        let resolver = |name: &str| -> Option<String> {
            resolve_name(name, &from_file, &imported, &candidates).map(|s| s.to_string())
        };

        let (entities, relations) = extract(
            &span.id,
            &span.file_path,
            language,
            entity_kind,
            span.name.as_deref(),
            &span.body,
            &resolver,
        );
        catalog.write_entities_relations(&span.id, &entities, &relations).await?;
        spans_processed += 1;
    }

    Ok(spans_processed)
}

/// Extract entities and relations for a single span. `resolver` maps a bare
/// name to an already-known entity id, scoped by priority (same file,
/// imported file, nearest file) — see [`crate::schema_extractor::resolve_name`].
pub fn extract(
    span_id: &str,
    file_path: &str,
    language: &str,
    span_kind_entity: EntityKind,
    span_name: Option<&str>,
    body: &str,
    resolver: &dyn Fn(&str) -> Option<String>,
) -> (Vec<Entity>, Vec<Relation>) {
    let mut entities = Vec::new();
    let mut relations = Vec::new();

    let entity_id = Uuid::new_v4().to_string();
    let own_name = span_name.unwrap_or("<anonymous>").to_string();
    entities.push(Entity {
        id: entity_id.clone(),
        span_id: span_id.to_string(),
        kind: span_kind_entity,
        name: own_name,
        file_path: file_path.to_string(),
    });

    let Some(language) = tree_sitter_language(language) else {
        return (entities, relations);
    };

    let mut parser = Parser::new();
    if parser.set_language(&language).is_err() {
        return (entities, relations);
    }
    let Some(tree) = parser.parse(body, None) else {
        return (entities, relations);
    };

    let source = body.as_bytes();
    walk(&tree.root_node(), source, &entity_id, resolver, &mut relations);

    (entities, relations)
}

fn tree_sitter_language(language: &str) -> Option<tree_sitter::Language> {
    match language {
        "python" => Some(tree_sitter_python::LANGUAGE.into()),
        "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
        _ => None,
    }
}

fn walk(
    node: &Node,
    source: &[u8],
    from_entity: &str,
    resolver: &dyn Fn(&str) -> Option<String>,
    out: &mut Vec<Relation>,
) {
    match node.kind() {
        "call" | "call_expression" => {
            if let Some(name) = extract_callee_name(node, source) {
                push_relation(from_entity, &name, RelationKind::Calls, resolver, out);
            }
        }
        "import_statement" | "import_from_statement" | "import_declaration" => {
            for name in extract_import_names(node, source) {
                push_relation(from_entity, &name, RelationKind::Imports, resolver, out);
            }
        }
        "class_definition" | "class_declaration" => {
            for base in extract_base_names(node, source) {
                push_relation(from_entity, &base, RelationKind::Extends, resolver, out);
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(&child, source, from_entity, resolver, out);
    }
}

fn push_relation(
    from_entity: &str,
    name: &str,
    kind: RelationKind,
    resolver: &dyn Fn(&str) -> Option<String>,
    out: &mut Vec<Relation>,
) {
    let resolved = resolver(name);
    let confidence = if resolved.is_some() { 0.9 } else { 0.3 };
    out.push(Relation {
        id: Uuid::new_v4().to_string(),
        from_entity: from_entity.to_string(),
        to_entity: resolved,
        to_name_unresolved: Some(name.to_string()),
        kind,
        confidence,
    });
}

/// Extract the callee's bare name from a call expression, taking the last
/// segment of a dotted/qualified path (`self.process` -> `process`).
fn extract_callee_name(node: &Node, source: &[u8]) -> Option<String> {
    let func_node = node
        .child_by_field_name("function")
        .or_else(|| node.child_by_field_name("name"))?;

    let text = func_node.utf8_text(source).ok()?.trim().to_string();
    let name = text.rsplit_once('.').map(|(_, n)| n).unwrap_or(&text);

    if name.is_empty() || name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        None
    } else {
        Some(name.to_string())
    }
}

fn extract_import_names(node: &Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(child.kind(), "dotted_name" | "identifier") {
            if let Ok(text) = child.utf8_text(source) {
                let last = text.rsplit('.').next().unwrap_or(text);
                names.push(last.to_string());
            }
        }
    }
    names
}

fn extract_base_names(node: &Node, source: &[u8]) -> Vec<String> {
    let Some(superclasses) = node
        .child_by_field_name("superclasses")
        .or_else(|| node.child_by_field_name("heritage"))
    else {
        return Vec::new();
    };
    let mut names = Vec::new();
    let mut cursor = superclasses.walk();
    for child in superclasses.children(&mut cursor) {
        if matches!(child.kind(), "identifier" | "type_identifier") {
            if let Ok(text) = child.utf8_text(source) {
                names.push(text.to_string());
            }
        }
    }
    names
}

/// Resolve a bare name to an entity id, prioritizing: same file, then an
/// imported file, then the file nearest by shared path prefix.
pub fn resolve_name<'a>(
    name: &str,
    from_file: &str,
    imported_files: &std::collections::HashSet<&str>,
    candidates: &'a [(String, String, String)], // (entity_id, name, file_path)
) -> Option<&'a str> {
    let matches: Vec<&(String, String, String)> =
        candidates.iter().filter(|(_, n, _)| n == name).collect();
    if matches.is_empty() {
        return None;
    }

    if let Some((id, _, _)) = matches.iter().find(|(_, _, f)| f == from_file) {
        return Some(id);
    }

    if let Some((id, _, _)) = matches
        .iter()
        .find(|(_, _, f)| imported_files.contains(f.as_str()))
    {
        return Some(id);
    }

    let from_dir = from_file.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
    let mut best: Option<&str> = None;
    let mut best_score = 0usize;
    for (id, _, file) in &matches {
        let dir = file.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        let score = from_dir
            .chars()
            .zip(dir.chars())
            .take_while(|(a, b)| a == b)
            .count();
        if best.is_none() || score > best_score {
            best = Some(id);
            best_score = score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_call_relations_with_dotted_name_stripped() {
        let body = "def f():\n    self.process()\n    helper()\n";
        let (entities, relations) = extract(
            "span1",
            "a.py",
            "python",
            EntityKind::Function,
            Some("f"),
            body,
            &|_name| None,
        );
        assert_eq!(entities.len(), 1);
        let names: Vec<&str> = relations
            .iter()
            .map(|r| r.to_name_unresolved.as_deref().unwrap())
            .collect();
        assert!(names.contains(&"process"));
        assert!(names.contains(&"helper"));
    }

    #[test]
    fn resolved_calls_get_higher_confidence() {
        let body = "def f():\n    known()\n";
        let (_, relations) = extract(
            "span1",
            "a.py",
            "python",
            EntityKind::Function,
            Some("f"),
            body,
            &|name| (name == "known").then(|| "entity-known".to_string()),
        );
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].to_entity.as_deref(), Some("entity-known"));
        assert!(relations[0].confidence > 0.5);
    }

    #[test]
    fn resolve_name_prefers_same_file_over_imported_or_nearest() {
        let candidates = vec![
            ("id-a".to_string(), "Thing".to_string(), "pkg/other.py".to_string()),
            ("id-b".to_string(), "Thing".to_string(), "pkg/here.py".to_string()),
        ];
        let imported = std::collections::HashSet::new();
        let resolved = resolve_name("Thing", "pkg/here.py", &imported, &candidates);
        assert_eq!(resolved, Some("id-b"));
    }
}
