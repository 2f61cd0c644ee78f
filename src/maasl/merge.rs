//! Last-write-wins graph merge.
//!
//! Two agents can independently re-extract entities/relations for
//! overlapping files (e.g. after both observe the same upstream commit).
//! Merging their patches must be idempotent (merging a patch into itself
//! changes nothing) and commutative (merge order doesn't matter), so LWW
//! keyed on `(timestamp, writer_id)` is used instead of a sequential CRDT.

use std::collections::HashMap;

use crate::models::{Entity, Relation};

#[derive(Debug, Clone)]
pub struct GraphPatch {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub timestamp: i64,
    pub writer_id: String,
}

pub struct GraphMergeEngine;

impl GraphMergeEngine {
    /// Merge `a` and `b` into one patch, keeping for each entity/relation id
    /// whichever side has the later `(timestamp, writer_id)`. `writer_id`
    /// only breaks ties on equal timestamps, so results stay deterministic
    /// regardless of argument order.
    pub fn merge(a: &GraphPatch, b: &GraphPatch) -> GraphPatch {
        let mut entities: HashMap<String, (Entity, i64, String)> = HashMap::new();
        for (entity, ts, writer) in tagged(&a.entities, a.timestamp, &a.writer_id)
            .chain(tagged(&b.entities, b.timestamp, &b.writer_id))
        {
            upsert_if_newer(&mut entities, entity.id.clone(), entity, ts, writer);
        }

        let mut relations: HashMap<String, (Relation, i64, String)> = HashMap::new();
        for (relation, ts, writer) in tagged(&a.relations, a.timestamp, &a.writer_id)
            .chain(tagged(&b.relations, b.timestamp, &b.writer_id))
        {
            upsert_if_newer(&mut relations, relation.id.clone(), relation, ts, writer);
        }

        let timestamp = a.timestamp.max(b.timestamp);
        let writer_id = if a.timestamp >= b.timestamp {
            a.writer_id.clone()
        } else {
            b.writer_id.clone()
        };

        GraphPatch {
            entities: entities.into_values().map(|(e, ..)| e).collect(),
            relations: relations.into_values().map(|(r, ..)| r).collect(),
            timestamp,
            writer_id,
        }
    }
}

fn tagged<'a, T: Clone>(items: &'a [T], ts: i64, writer_id: &'a str) -> impl Iterator<Item = (T, i64, String)> + 'a {
    items.iter().cloned().map(move |item| (item, ts, writer_id.to_string()))
}

fn upsert_if_newer<T>(
    map: &mut HashMap<String, (T, i64, String)>,
    id: String,
    item: T,
    ts: i64,
    writer: String,
) {
    match map.get(&id) {
        Some((_, existing_ts, existing_writer)) => {
            if (ts, &writer) >= (*existing_ts, existing_writer) {
                map.insert(id, (item, ts, writer));
            }
        }
        None => {
            map.insert(id, (item, ts, writer));
        }
    }
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

    fn patch(entities: Vec<Entity>, ts: i64, writer: &str) -> GraphPatch {
        GraphPatch {
            entities,
            relations: Vec::new(),
            timestamp: ts,
            writer_id: writer.to_string(),
        }
    }

    #[test]
    fn later_timestamp_wins_on_conflicting_entity() {
        let a = patch(vec![entity("e1", "old_name")], 100, "agent-a");
        let b = patch(vec![entity("e1", "new_name")], 200, "agent-b");
        let merged = GraphMergeEngine::merge(&a, &b);
        assert_eq!(merged.entities.len(), 1);
        assert_eq!(merged.entities[0].name, "new_name");
    }

    #[test]
    fn merge_is_idempotent() {
        let a = patch(vec![entity("e1", "name")], 100, "agent-a");
        let merged_once = GraphMergeEngine::merge(&a, &a);
        let merged_twice = GraphMergeEngine::merge(&merged_once, &a);
        assert_eq!(merged_once.entities.len(), merged_twice.entities.len());
        assert_eq!(merged_twice.entities[0].name, "name");
    }

    #[test]
    fn merge_is_commutative() {
        let a = patch(vec![entity("e1", "from_a")], 100, "agent-a");
        let b = patch(vec![entity("e2", "from_b")], 100, "agent-b");
        let ab = GraphMergeEngine::merge(&a, &b);
        let ba = GraphMergeEngine::merge(&b, &a);
        let mut ab_names: Vec<&str> = ab.entities.iter().map(|e| e.name.as_str()).collect();
        let mut ba_names: Vec<&str> = ba.entities.iter().map(|e| e.name.as_str()).collect();
        ab_names.sort();
        ba_names.sort();
        assert_eq!(ab_names, ba_names);
    }
}
