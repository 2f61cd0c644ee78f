//! Docgen write coordinator.
//!
//! Generated docs are expensive to regenerate and read by humans, so
//! writes are gated on content hash (skip when nothing changed), guarded
//! by an `IdempDocs` lock (so two concurrent regenerations of the same
//! doc don't race), and go through [`graph_store::write_artifact`]'s
//! path-safe atomic write.

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::catalog::Catalog;
use crate::config::DocgenConfig;
use crate::graph_store;
use crate::maasl::locks::{LockManager, ResourceClass, ResourceKey};

pub struct DocgenCoordinator<'a> {
    catalog: &'a Catalog,
    locks: &'a LockManager,
    config: &'a DocgenConfig,
}

impl<'a> DocgenCoordinator<'a> {
    pub fn new(catalog: &'a Catalog, locks: &'a LockManager, config: &'a DocgenConfig) -> Self {
        Self { catalog, locks, config }
    }

    /// Write `content` to `relative_path` under the configured output
    /// directory, unless its hash matches what was last written there.
    /// Returns `true` if a write happened.
    pub async fn write_if_changed(&self, relative_path: &str, content: &str) -> Result<bool> {
        let (_guard, _token) = self
            .locks
            .acquire_one(ResourceKey::new(ResourceClass::IdempDocs, relative_path))
            .await;

        let hash = content_hash(content);
        let status_key = format!("docgen_hash:{}", relative_path);

        if self.catalog.get_status(&status_key).await?.as_deref() == Some(hash.as_str()) {
            return Ok(false);
        }

        graph_store::write_artifact(&self.config.output_dir, relative_path, content, self.config.max_bytes)?;
        self.catalog.set_status(&status_key, &hash).await?;
        Ok(true)
    }
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations_on;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::tempdir;

    async fn test_catalog() -> Catalog {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        run_migrations_on(&pool).await.unwrap();
        Catalog::new(pool)
    }

    #[tokio::test]
    async fn second_write_with_unchanged_content_is_skipped() {
        let dir = tempdir().unwrap();
        let catalog = test_catalog().await;
        let locks = LockManager::new();
        let config = DocgenConfig {
            output_dir: dir.path().to_path_buf(),
            max_bytes: 1024,
        };
        let coordinator = DocgenCoordinator::new(&catalog, &locks, &config);

        assert!(coordinator.write_if_changed("doc.md", "hello").await.unwrap());
        assert!(!coordinator.write_if_changed("doc.md", "hello").await.unwrap());
        assert!(coordinator.write_if_changed("doc.md", "hello again").await.unwrap());
    }
}
