//! Catalog store: transactional span/entity/relation/enrichment/
//! embedding storage backed by SQLite.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::models::{
    Entity, Enrichment, IndexedFile, Quality, ReplaceSpansOutcome, Span, SpanKind,
    StoredEmbedding,
};

/// A handle to the catalog database. Cheap to clone (wraps a connection
/// pool); all writes are expected to go through a single logical writer
/// (enforced above this layer by `maasl::db_writer::DbWriterSession`).
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn upsert_file(&self, file: &IndexedFile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (path, content_hash, language, size_bytes, mtime, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                content_hash = excluded.content_hash,
                language = excluded.language,
                size_bytes = excluded.size_bytes,
                mtime = excluded.mtime,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&file.path)
        .bind(&file.content_hash)
        .bind(&file.language)
        .bind(file.size_bytes)
        .bind(file.mtime)
        .bind(file.indexed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn file_content_hash(&self, path: &str) -> Result<Option<String>> {
        let hash: Option<String> = sqlx::query_scalar("SELECT content_hash FROM files WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hash)
    }

    /// Remove a file and everything that depends on it (spans, their
    /// enrichments/embeddings/entities/relations).
    pub async fn remove_file(&self, path: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_spans_for_file(&mut tx, path).await?;
        sqlx::query("DELETE FROM files WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn known_file_paths(&self) -> Result<Vec<String>> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT path FROM files")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Transactionally replace the spans for `file_path` with `new_spans`.
    /// Spans whose `span_hash` is unchanged keep their row id (and thus
    /// their enrichments/embeddings); spans that no longer exist are
    /// deleted along with their dependents; new spans are inserted fresh.
    pub async fn replace_spans(
        &self,
        file_path: &str,
        new_spans: &[Span],
    ) -> Result<ReplaceSpansOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing: Vec<(String, String)> =
            sqlx::query("SELECT id, span_hash FROM spans WHERE file_path = ?")
                .bind(file_path)
                .fetch_all(&mut *tx)
                .await?
                .iter()
                .map(|row| (row.get("id"), row.get("span_hash")))
                .collect();

        let mut outcome = ReplaceSpansOutcome::default();
        let mut matched_existing_ids: std::collections::HashSet<String> =
            std::collections::HashSet::new();

        for span in new_spans {
            if let Some((existing_id, _)) = existing
                .iter()
                .find(|(id, hash)| hash == &span.span_hash && !matched_existing_ids.contains(id))
            {
                matched_existing_ids.insert(existing_id.clone());
                outcome.unchanged += 1;
                continue;
            }

            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO spans
                    (id, file_path, span_kind, name, start_line, end_line, byte_start, byte_end, span_hash, body, parse_degraded)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(file_path)
            .bind(span.span_kind.as_db_str())
            .bind(&span.name)
            .bind(span.start_line)
            .bind(span.end_line)
            .bind(span.byte_start as i64)
            .bind(span.byte_end as i64)
            .bind(&span.span_hash)
            .bind(&span.body)
            .bind(span.parse_degraded as i64)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO spans_fts (span_id, file_path, body) VALUES (?, ?, ?)")
                .bind(&id)
                .bind(file_path)
                .bind(&span.body)
                .execute(&mut *tx)
                .await?;

            outcome.inserted += 1;
        }

        for (existing_id, _) in existing.iter().filter(|(id, _)| !matched_existing_ids.contains(id)) {
            delete_span(&mut tx, existing_id).await?;
            outcome.deleted += 1;
        }

        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn spans_for_file(&self, file_path: &str) -> Result<Vec<StoredSpan>> {
        let rows = sqlx::query(
            "SELECT id, file_path, span_kind, name, start_line, end_line, byte_start, byte_end, span_hash, body, parse_degraded FROM spans WHERE file_path = ?",
        )
        .bind(file_path)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_stored_span).collect())
    }

    pub async fn all_spans(&self) -> Result<Vec<StoredSpan>> {
        let rows = sqlx::query(
            "SELECT id, file_path, span_kind, name, start_line, end_line, byte_start, byte_end, span_hash, body, parse_degraded FROM spans",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_stored_span).collect())
    }

    pub async fn span_by_id(&self, span_id: &str) -> Result<Option<StoredSpan>> {
        let row = sqlx::query(
            "SELECT id, file_path, span_kind, name, start_line, end_line, byte_start, byte_end, span_hash, body, parse_degraded FROM spans WHERE id = ?",
        )
        .bind(span_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_stored_span(&r)))
    }

    // ---------- Embeddings ----------

    pub async fn pending_embeddings(&self, profile: &str, limit: i64) -> Result<Vec<StoredSpan>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.file_path, s.span_kind, s.name, s.start_line, s.end_line,
                   s.byte_start, s.byte_end, s.span_hash, s.body, s.parse_degraded
            FROM spans s
            LEFT JOIN embeddings e ON e.span_id = s.id AND e.profile = ?
            WHERE e.span_id IS NULL OR e.span_hash != s.span_hash
            ORDER BY s.file_path, s.start_line
            LIMIT ?
            "#,
        )
        .bind(profile)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_stored_span).collect())
    }

    pub async fn write_embedding(&self, embedding: &StoredEmbedding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO embeddings (span_id, profile, span_hash, model, dims, vector, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(span_id, profile) DO UPDATE SET
                span_hash = excluded.span_hash,
                model = excluded.model,
                dims = excluded.dims,
                vector = excluded.vector,
                created_at = excluded.created_at
            "#,
        )
        .bind(&embedding.span_id)
        .bind(&embedding.profile)
        .bind(&embedding.span_hash)
        .bind(&embedding.model)
        .bind(embedding.dims as i64)
        .bind(&embedding.vector)
        .bind(embedding.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn all_embeddings(&self, profile: &str) -> Result<Vec<(String, String, Vec<u8>)>> {
        // (span_id, file_path, vector)
        let rows = sqlx::query(
            r#"
            SELECT e.span_id, s.file_path, e.vector
            FROM embeddings e
            JOIN spans s ON s.id = e.span_id
            WHERE e.profile = ?
            "#,
        )
        .bind(profile)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("span_id"), r.get("file_path"), r.get("vector")))
            .collect())
    }

    // ---------- Enrichments ----------

    pub async fn pending_enrichments(
        &self,
        chain: &str,
        now: i64,
        limit: i64,
    ) -> Result<Vec<StoredSpan>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.file_path, s.span_kind, s.name, s.start_line, s.end_line,
                   s.byte_start, s.byte_end, s.span_hash, s.body, s.parse_degraded
            FROM spans s
            LEFT JOIN enrichments en ON en.span_id = s.id AND en.chain = ?
            LEFT JOIN failure_tracker ft ON ft.resource_key = 'enrich:' || s.id || ':' || ?
            WHERE (en.span_id IS NULL OR en.span_hash != s.span_hash)
              AND (ft.cooldown_until IS NULL OR ft.cooldown_until < ?)
            ORDER BY s.file_path, s.start_line
            LIMIT ?
            "#,
        )
        .bind(chain)
        .bind(chain)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_stored_span).collect())
    }

    pub async fn write_enrichment(&self, enrichment: &Enrichment) -> Result<()> {
        let key_topics_json = serde_json::to_string(&enrichment.key_topics)?;
        let attempts_log_json = serde_json::to_string(&enrichment.attempts_log)?;

        sqlx::query(
            r#"
            INSERT INTO enrichments (
                span_id, span_hash, chain, summary, key_topics, complexity, model,
                backend_host, quality, tokens_per_second, attempts_log, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(span_id) DO UPDATE SET
                span_hash = excluded.span_hash,
                chain = excluded.chain,
                summary = excluded.summary,
                key_topics = excluded.key_topics,
                complexity = excluded.complexity,
                model = excluded.model,
                backend_host = excluded.backend_host,
                quality = excluded.quality,
                tokens_per_second = excluded.tokens_per_second,
                attempts_log = excluded.attempts_log,
                created_at = excluded.created_at
            "#,
        )
        .bind(&enrichment.span_id)
        .bind(&enrichment.span_hash)
        .bind(&enrichment.chain)
        .bind(&enrichment.summary)
        .bind(&key_topics_json)
        .bind(enrichment.complexity)
        .bind(&enrichment.model)
        .bind(&enrichment.backend_host)
        .bind(enrichment.quality.as_db_str())
        .bind(enrichment.tokens_per_second)
        .bind(&attempts_log_json)
        .bind(enrichment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---------- Failure tracking (shared by enrichment and embedding backends) ----------

    pub async fn record_failure(
        &self,
        resource_key: &str,
        now: i64,
        max_failures: u32,
        cooldown_secs: i64,
    ) -> Result<u32> {
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT failure_count FROM failure_tracker WHERE resource_key = ?")
                .bind(resource_key)
                .fetch_optional(&self.pool)
                .await?;

        let new_count = existing.map(|(c,)| c + 1).unwrap_or(1);
        let cooldown_until = if new_count as u32 >= max_failures {
            Some(now + cooldown_secs)
        } else {
            None
        };

        sqlx::query(
            r#"
            INSERT INTO failure_tracker (resource_key, failure_count, last_failure_at, cooldown_until)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(resource_key) DO UPDATE SET
                failure_count = excluded.failure_count,
                last_failure_at = excluded.last_failure_at,
                cooldown_until = COALESCE(excluded.cooldown_until, failure_tracker.cooldown_until)
            "#,
        )
        .bind(resource_key)
        .bind(new_count)
        .bind(now)
        .bind(cooldown_until)
        .execute(&self.pool)
        .await?;

        if cooldown_until.is_some() {
            warn!(resource_key, new_count, "resource entered cooldown after repeated failures");
        }

        Ok(new_count as u32)
    }

    pub async fn clear_failure(&self, resource_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM failure_tracker WHERE resource_key = ?")
            .bind(resource_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether `resource_key` is currently in cooldown at time `now`, for a
    /// caller that wants to skip an attempt entirely rather than make it
    /// and record another failure.
    pub async fn in_cooldown(&self, resource_key: &str, now: i64) -> Result<bool> {
        let cooldown_until: Option<Option<i64>> =
            sqlx::query_scalar("SELECT cooldown_until FROM failure_tracker WHERE resource_key = ?")
                .bind(resource_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(cooldown_until.flatten().is_some_and(|until| until >= now))
    }

    // ---------- Entities & relations ----------

    pub async fn write_entities_relations(
        &self,
        span_id: &str,
        entities: &[Entity],
        relations: &[crate::models::Relation],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let old_entity_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM entities WHERE span_id = ?")
                .bind(span_id)
                .fetch_all(&mut *tx)
                .await?;

        for id in &old_entity_ids {
            sqlx::query("DELETE FROM relations WHERE from_entity = ? OR to_entity = ?")
                .bind(id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM entities WHERE span_id = ?")
            .bind(span_id)
            .execute(&mut *tx)
            .await?;

        for entity in entities {
            sqlx::query(
                "INSERT INTO entities (id, span_id, kind, name, file_path) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&entity.id)
            .bind(&entity.span_id)
            .bind(entity.kind.as_db_str())
            .bind(&entity.name)
            .bind(&entity.file_path)
            .execute(&mut *tx)
            .await?;
        }

        for relation in relations {
            sqlx::query(
                r#"
                INSERT INTO relations (id, from_entity, to_entity, to_name_unresolved, kind, confidence)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&relation.id)
            .bind(&relation.from_entity)
            .bind(&relation.to_entity)
            .bind(&relation.to_name_unresolved)
            .bind(relation.kind.as_db_str())
            .bind(relation.confidence)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn all_entities(&self) -> Result<Vec<Entity>> {
        let rows = sqlx::query("SELECT id, span_id, kind, name, file_path FROM entities")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| Entity {
                id: r.get("id"),
                span_id: r.get("span_id"),
                kind: crate::models::EntityKind::from_db_str(r.get::<String, _>("kind").as_str()),
                name: r.get("name"),
                file_path: r.get("file_path"),
            })
            .collect())
    }

    pub async fn all_relations(&self) -> Result<Vec<crate::models::Relation>> {
        let rows = sqlx::query(
            "SELECT id, from_entity, to_entity, to_name_unresolved, kind, confidence FROM relations",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| crate::models::Relation {
                id: r.get("id"),
                from_entity: r.get("from_entity"),
                to_entity: r.get("to_entity"),
                to_name_unresolved: r.get("to_name_unresolved"),
                kind: crate::models::RelationKind::from_db_str(r.get::<String, _>("kind").as_str()),
                confidence: r.get("confidence"),
            })
            .collect())
    }

    // ---------- Index status ----------

    pub async fn set_status(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_status (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_status(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_status WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn keyword_search(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<(String, String, f64, String)>> {
        // (span_id, file_path, bm25_rank_as_positive_score, snippet)
        let rows = sqlx::query(
            r#"
            SELECT span_id, file_path, rank,
                   snippet(spans_fts, 2, '>>>', '<<<', '...', 48) AS snippet
            FROM spans_fts
            WHERE spans_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| {
                let rank: f64 = r.get("rank");
                (r.get("span_id"), r.get("file_path"), -rank, r.get("snippet"))
            })
            .collect())
    }
}

/// A span row as read back from the catalog (carries its persisted id).
#[derive(Debug, Clone)]
pub struct StoredSpan {
    pub id: String,
    pub file_path: String,
    pub span_kind: SpanKind,
    pub name: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub byte_start: usize,
    pub byte_end: usize,
    pub span_hash: String,
    pub body: String,
    pub parse_degraded: bool,
}

fn row_to_stored_span(row: &sqlx::sqlite::SqliteRow) -> StoredSpan {
    StoredSpan {
        id: row.get("id"),
        file_path: row.get("file_path"),
        span_kind: SpanKind::from_db_str(row.get::<String, _>("span_kind").as_str()),
        name: row.get("name"),
        start_line: row.get::<i64, _>("start_line") as u32,
        end_line: row.get::<i64, _>("end_line") as u32,
        byte_start: row.get::<i64, _>("byte_start") as usize,
        byte_end: row.get::<i64, _>("byte_end") as usize,
        span_hash: row.get("span_hash"),
        body: row.get("body"),
        parse_degraded: row.get::<i64, _>("parse_degraded") != 0,
    }
}

async fn delete_span(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, span_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM spans_fts WHERE span_id = ?")
        .bind(span_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM embeddings WHERE span_id = ?")
        .bind(span_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM enrichments WHERE span_id = ?")
        .bind(span_id)
        .execute(&mut **tx)
        .await?;
    let entity_ids: Vec<String> = sqlx::query_scalar("SELECT id FROM entities WHERE span_id = ?")
        .bind(span_id)
        .fetch_all(&mut **tx)
        .await?;
    for id in &entity_ids {
        sqlx::query("DELETE FROM relations WHERE from_entity = ? OR to_entity = ?")
            .bind(id)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    sqlx::query("DELETE FROM entities WHERE span_id = ?")
        .bind(span_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM spans WHERE id = ?")
        .bind(span_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn delete_spans_for_file(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    file_path: &str,
) -> Result<()> {
    let span_ids: Vec<String> = sqlx::query_scalar("SELECT id FROM spans WHERE file_path = ?")
        .bind(file_path)
        .fetch_all(&mut **tx)
        .await?;
    for id in &span_ids {
        delete_span(tx, id).await?;
    }
    Ok(())
}
