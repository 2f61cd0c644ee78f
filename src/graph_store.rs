//! In-memory entity/relation graph and docgen artifact writer.
//!
//! Loads the catalog's entities and relations into an arena with
//! index-pair forward/reverse adjacency lists, and exposes cycle-safe BFS
//! neighbor traversal plus a content-hash-gated, path-safe artifact writer
//! for generated docs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

use crate::catalog::Catalog;
use crate::models::{Entity, Relation, RelationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// An in-memory snapshot of the entity/relation graph, rebuilt from the
/// catalog on demand (the catalog remains the source of truth).
pub struct GraphStore {
    entities: Vec<Entity>,
    id_to_index: HashMap<String, usize>,
    /// entity index -> (neighbor index, relation kind)
    forward: Vec<Vec<(usize, RelationKind)>>,
    reverse: Vec<Vec<(usize, RelationKind)>>,
}

impl GraphStore {
    pub async fn load(catalog: &Catalog) -> Result<Self> {
        let entities = catalog.all_entities().await?;
        let relations = catalog.all_relations().await?;
        Ok(Self::from_parts(entities, relations))
    }

    fn from_parts(entities: Vec<Entity>, relations: Vec<Relation>) -> Self {
        let id_to_index: HashMap<String, usize> = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();

        let mut forward = vec![Vec::new(); entities.len()];
        let mut reverse = vec![Vec::new(); entities.len()];

        for relation in &relations {
            let Some(&from_idx) = id_to_index.get(&relation.from_entity) else {
                continue;
            };
            let Some(to_entity) = &relation.to_entity else {
                continue;
            };
            let Some(&to_idx) = id_to_index.get(to_entity) else {
                continue;
            };
            forward[from_idx].push((to_idx, relation.kind));
            reverse[to_idx].push((from_idx, relation.kind));
        }

        Self {
            entities,
            id_to_index,
            forward,
            reverse,
        }
    }

    pub fn entity(&self, entity_id: &str) -> Option<&Entity> {
        self.id_to_index.get(entity_id).map(|&i| &self.entities[i])
    }

    /// All entities currently loaded into the graph, for callers that need
    /// to scan by name (e.g. the planner seeding a graph-neighborhood
    /// search channel from entities mentioned in a query).
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Breadth-first traversal up to `max_depth` hops, visiting each entity
    /// at most once (cycle-safe). Returns entities in BFS discovery order,
    /// excluding the starting entity.
    pub fn get_neighbors(
        &self,
        entity_id: &str,
        max_depth: usize,
        direction: Direction,
    ) -> Vec<(&Entity, RelationKind, usize)> {
        let Some(&start) = self.id_to_index.get(entity_id) else {
            return Vec::new();
        };

        let mut visited: HashSet<usize> = HashSet::from([start]);
        let mut queue: VecDeque<(usize, usize)> = VecDeque::from([(start, 0)]);
        let mut out = Vec::new();

        while let Some((idx, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let edges = self.edges_for(idx, direction);
            for (neighbor_idx, kind) in edges {
                if visited.insert(neighbor_idx) {
                    out.push((&self.entities[neighbor_idx], kind, depth + 1));
                    queue.push_back((neighbor_idx, depth + 1));
                }
            }
        }

        out
    }

    fn edges_for(&self, idx: usize, direction: Direction) -> Vec<(usize, RelationKind)> {
        match direction {
            Direction::Outgoing => self.forward[idx].clone(),
            Direction::Incoming => self.reverse[idx].clone(),
            Direction::Both => {
                let mut both = self.forward[idx].clone();
                both.extend(self.reverse[idx].clone());
                both
            }
        }
    }
}

/// Content hash of a connected slice of the graph, for staleness detection
/// on generated docs: sorted entity ids joined and hashed so the result is
/// independent of traversal order.
pub fn span_link_hash(entity_ids: &[String]) -> String {
    let mut sorted = entity_ids.to_vec();
    sorted.sort();
    let mut hasher = Sha256::new();
    for id in &sorted {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Atomically write a generated doc artifact under `output_dir`, rejecting
/// paths that escape it and payloads over `max_bytes`. Writes to a temp
/// file in the same directory, then renames over the destination so a
/// concurrent reader never observes a partial write.
pub fn write_artifact(output_dir: &Path, relative_path: &str, content: &str, max_bytes: u64) -> Result<PathBuf> {
    if content.len() as u64 > max_bytes {
        bail!(
            "artifact {} is {} bytes, exceeds docgen.max_bytes={}",
            relative_path,
            content.len(),
            max_bytes
        );
    }

    let dest = safe_join(output_dir, relative_path)?;
    let parent = dest.parent().context("artifact path has no parent directory")?;
    std::fs::create_dir_all(parent)?;

    let tmp_path = parent.join(format!(
        ".{}.tmp",
        dest.file_name().and_then(|n| n.to_str()).unwrap_or("artifact")
    ));
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, &dest)?;
    Ok(dest)
}

/// Join `relative_path` onto `base`, rejecting any path that would escape
/// `base` via `..` components or an absolute path.
fn safe_join(base: &Path, relative_path: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative_path);
    if candidate.is_absolute() {
        bail!("artifact path must be relative: {}", relative_path);
    }
    if candidate.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        bail!("artifact path must not contain '..': {}", relative_path);
    }
    Ok(base.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;

    fn entity(id: &str, name: &str) -> Entity {
        Entity {
            id: id.to_string(),
            span_id: format!("span-{id}"),
            kind: EntityKind::Function,
            name: name.to_string(),
            file_path: "a.py".to_string(),
        }
    }

    fn relation(from: &str, to: &str, kind: RelationKind) -> Relation {
        Relation {
            id: format!("{from}->{to}"),
            from_entity: from.to_string(),
            to_entity: Some(to.to_string()),
            to_name_unresolved: None,
            kind,
            confidence: 1.0,
        }
    }

    #[test]
    fn bfs_respects_max_depth_and_avoids_cycles() {
        let entities = vec![entity("a", "a"), entity("b", "b"), entity("c", "c")];
        let relations = vec![
            relation("a", "b", RelationKind::Calls),
            relation("b", "c", RelationKind::Calls),
            relation("c", "a", RelationKind::Calls), // cycle back to start
        ];
        let graph = GraphStore::from_parts(entities, relations);

        let depth1 = graph.get_neighbors("a", 1, Direction::Outgoing);
        assert_eq!(depth1.len(), 1);
        assert_eq!(depth1[0].0.id, "b");

        let depth2 = graph.get_neighbors("a", 2, Direction::Outgoing);
        assert_eq!(depth2.len(), 2);
        // "a" itself must never reappear despite the cycle.
        assert!(depth2.iter().all(|(e, ..)| e.id != "a"));
    }

    #[test]
    fn incoming_direction_follows_reverse_edges() {
        let entities = vec![entity("a", "a"), entity("b", "b")];
        let relations = vec![relation("a", "b", RelationKind::Calls)];
        let graph = GraphStore::from_parts(entities, relations);

        assert!(graph.get_neighbors("b", 1, Direction::Incoming).iter().any(|(e, ..)| e.id == "a"));
        assert!(graph.get_neighbors("b", 1, Direction::Outgoing).is_empty());
    }

    #[test]
    fn span_link_hash_is_order_independent() {
        let a = span_link_hash(&["x".to_string(), "y".to_string()]);
        let b = span_link_hash(&["y".to_string(), "x".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn write_artifact_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_artifact(dir.path(), "../escape.md", "content", 1024);
        assert!(result.is_err());
    }

    #[test]
    fn write_artifact_rejects_oversized_payload() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_artifact(dir.path(), "doc.md", "0123456789", 5);
        assert!(result.is_err());
    }

    #[test]
    fn write_artifact_writes_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), "nested/doc.md", "hello", 1024).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello");
    }
}
