//! Catalog schema migrations.
//!
//! Migrations are version-gated by a monotonic schema version stored in
//! `schema_meta`. On open, if the stored version is already at or above the
//! code's target version, no DDL runs; otherwise each pending migration
//! step runs in its own transaction, in order, bumping the stored version
//! as its final statement.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;

/// The schema version this build of the engine expects.
const TARGET_SCHEMA_VERSION: i64 = 2;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations_on(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn run_migrations_on(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
    )
    .execute(pool)
    .await?;

    let current_version: i64 = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM schema_meta WHERE key = 'schema_version'",
    )
    .fetch_optional(pool)
    .await?
    .unwrap_or(0);

    if current_version >= TARGET_SCHEMA_VERSION {
        info!(version = current_version, "schema already up to date");
        return Ok(());
    }

    for step in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        info!(version = step.version, "applying migration");
        let mut tx = pool.begin().await?;
        for statement in step.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            r#"
            INSERT INTO schema_meta (key, value) VALUES ('schema_version', ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(step.version.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
    }

    Ok(())
}

struct Migration {
    version: i64,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    statements: &[
        r#"
        CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            language TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            mtime INTEGER NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS spans (
            id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL REFERENCES files(path),
            span_kind TEXT NOT NULL,
            name TEXT,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            byte_start INTEGER NOT NULL,
            byte_end INTEGER NOT NULL,
            span_hash TEXT NOT NULL,
            body TEXT NOT NULL,
            parse_degraded INTEGER NOT NULL DEFAULT 0
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_spans_file_path ON spans(file_path)",
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS spans_fts USING fts5(
            span_id UNINDEXED,
            file_path UNINDEXED,
            body
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS enrichments (
            span_id TEXT PRIMARY KEY REFERENCES spans(id),
            span_hash TEXT NOT NULL,
            chain TEXT NOT NULL,
            summary TEXT,
            quality TEXT NOT NULL,
            tokens_per_second REAL,
            created_at INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            span_id TEXT NOT NULL,
            profile TEXT NOT NULL,
            span_hash TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            vector BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (span_id, profile)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY,
            span_id TEXT NOT NULL REFERENCES spans(id),
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            file_path TEXT NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name)",
        "CREATE INDEX IF NOT EXISTS idx_entities_file_path ON entities(file_path)",
        r#"
        CREATE TABLE IF NOT EXISTS relations (
            id TEXT PRIMARY KEY,
            from_entity TEXT NOT NULL REFERENCES entities(id),
            to_entity TEXT REFERENCES entities(id),
            to_name_unresolved TEXT,
            kind TEXT NOT NULL,
            confidence REAL NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_relations_from ON relations(from_entity)",
        "CREATE INDEX IF NOT EXISTS idx_relations_to ON relations(to_entity)",
        r#"
        CREATE TABLE IF NOT EXISTS index_status (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS failure_tracker (
            resource_key TEXT PRIMARY KEY,
            failure_count INTEGER NOT NULL,
            last_failure_at INTEGER,
            cooldown_until INTEGER
        )
        "#,
    ],
}, Migration {
    version: 2,
    statements: &[
        "ALTER TABLE enrichments ADD COLUMN key_topics TEXT NOT NULL DEFAULT '[]'",
        "ALTER TABLE enrichments ADD COLUMN complexity REAL NOT NULL DEFAULT 0",
        "ALTER TABLE enrichments ADD COLUMN model TEXT",
        "ALTER TABLE enrichments ADD COLUMN backend_host TEXT",
        "ALTER TABLE enrichments ADD COLUMN attempts_log TEXT NOT NULL DEFAULT '[]'",
    ],
}];

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_migrations_on(&pool).await.unwrap();
        run_migrations_on(&pool).await.unwrap();

        let version: i64 = sqlx::query_scalar(
            "SELECT CAST(value AS INTEGER) FROM schema_meta WHERE key = 'schema_version'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(version, TARGET_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn creates_expected_tables() {
        let pool = memory_pool().await;
        run_migrations_on(&pool).await.unwrap();

        for table in [
            "files",
            "spans",
            "enrichments",
            "embeddings",
            "entities",
            "relations",
            "index_status",
            "failure_tracker",
        ] {
            let exists: bool = sqlx::query_scalar(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type IN ('table','view') AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert!(exists, "expected table {} to exist", table);
        }
    }
}
