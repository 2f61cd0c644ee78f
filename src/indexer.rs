//! Working-tree indexer.
//!
//! Walks a repository root respecting `.gitignore`/`.ignore`/`.ragignore`
//! and a fixed blocklist, splits each file into spans, and
//! transactionally reconciles them into the catalog. Supports both a
//! full walk and an incremental pass driven by a git commit range.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::{Config, FIXED_BLOCKLIST};
use crate::models::IndexedFile;
use crate::splitter;

const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub files_scanned: u64,
    pub files_indexed: u64,
    pub files_skipped_binary: u64,
    pub files_removed: u64,
    pub spans_inserted: u64,
    pub spans_unchanged: u64,
    pub spans_deleted: u64,
}

/// Walk `config.indexer.root` and reconcile every discovered file's spans
/// into the catalog, then remove catalog entries for files no longer on
/// disk.
pub async fn index_full(config: &Config, catalog: &Catalog) -> Result<IndexStats> {
    let root = &config.indexer.root;
    let paths = walk_tree(root, &config.indexer.ragignore_file, &config.indexer.extra_blocklist)?;
    let mut stats = IndexStats::default();
    let mut seen = std::collections::HashSet::new();

    for abs_path in &paths {
        stats.files_scanned += 1;
        let rel_path = relative_path(root, abs_path);
        seen.insert(rel_path.clone());
        index_one_file(catalog, root, &rel_path, &mut stats).await?;
    }

    for known in catalog.known_file_paths().await? {
        if !seen.contains(&known) {
            catalog.remove_file(&known).await?;
            stats.files_removed += 1;
        }
    }

    catalog
        .set_status("last_full_index_at", &chrono::Utc::now().to_rfc3339())
        .await?;

    info!(
        scanned = stats.files_scanned,
        indexed = stats.files_indexed,
        removed = stats.files_removed,
        "full index complete"
    );
    Ok(stats)
}

/// Reconcile only the files changed between `from_commit` and `to_commit`
/// (or the working tree, when `to_commit` is `None`) in the git repository
/// rooted at `config.indexer.root`.
pub fn diff_changed_paths(root: &Path, from_commit: &str, to_commit: Option<&str>) -> Result<Vec<PathBuf>> {
    let repo = git2::Repository::open(root).context("opening git repository for incremental diff")?;
    let from_obj = repo.revparse_single(from_commit)?;
    let from_tree = from_obj.peel_to_tree()?;

    let diff = match to_commit {
        Some(to) => {
            let to_obj = repo.revparse_single(to)?;
            let to_tree = to_obj.peel_to_tree()?;
            repo.diff_tree_to_tree(Some(&from_tree), Some(&to_tree), None)?
        }
        None => repo.diff_tree_to_workdir_with_index(Some(&from_tree), None)?,
    };

    let mut paths = Vec::new();
    diff.foreach(
        &mut |delta, _| {
            if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                paths.push(root.join(path));
            }
            true
        },
        None,
        None,
        None,
    )?;
    Ok(paths)
}

pub async fn index_incremental(
    config: &Config,
    catalog: &Catalog,
    from_commit: &str,
    to_commit: Option<&str>,
) -> Result<IndexStats> {
    let root = &config.indexer.root;
    let changed = diff_changed_paths(root, from_commit, to_commit)?;
    let mut stats = IndexStats::default();

    for abs_path in changed {
        stats.files_scanned += 1;
        let rel_path = relative_path(root, &abs_path);
        if !abs_path.exists() {
            catalog.remove_file(&rel_path).await?;
            stats.files_removed += 1;
            continue;
        }
        if is_blocked(&rel_path, &config.indexer.extra_blocklist) {
            continue;
        }
        index_one_file(catalog, root, &rel_path, &mut stats).await?;
    }

    info!(
        scanned = stats.files_scanned,
        indexed = stats.files_indexed,
        removed = stats.files_removed,
        "incremental index complete"
    );
    Ok(stats)
}

async fn index_one_file(
    catalog: &Catalog,
    root: &Path,
    rel_path: &str,
    stats: &mut IndexStats,
) -> Result<()> {
    let abs_path = root.join(rel_path);

    let metadata = match std::fs::metadata(&abs_path) {
        Ok(m) => m,
        Err(_) => return Ok(()),
    };
    if metadata.len() > MAX_FILE_BYTES {
        debug!(path = rel_path, size = metadata.len(), "skipping oversized file");
        return Ok(());
    }

    let content = match std::fs::read(&abs_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = rel_path, error = %err, "failed to read file");
            return Ok(());
        }
    };

    let text = match String::from_utf8(content) {
        Ok(text) => text,
        Err(_) => {
            stats.files_skipped_binary += 1;
            return Ok(());
        }
    };

    let content_hash = hash_bytes(text.as_bytes());
    if catalog.file_content_hash(rel_path).await?.as_deref() == Some(content_hash.as_str()) {
        return Ok(());
    }

    let language = splitter::language_for_path(rel_path);
    let spans = splitter::split_file(rel_path, language, &text);
    let outcome = catalog.replace_spans(rel_path, &spans).await?;

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    catalog
        .upsert_file(&IndexedFile {
            path: rel_path.to_string(),
            content_hash,
            language: language.to_string(),
            size_bytes: metadata.len() as i64,
            mtime,
            indexed_at: mtime,
        })
        .await?;

    stats.files_indexed += 1;
    stats.spans_inserted += outcome.inserted;
    stats.spans_unchanged += outcome.unchanged;
    stats.spans_deleted += outcome.deleted;
    Ok(())
}

fn relative_path(root: &Path, abs_path: &Path) -> String {
    abs_path
        .strip_prefix(root)
        .unwrap_or(abs_path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn is_blocked(rel_path: &str, extra_blocklist: &[String]) -> bool {
    let components: Vec<&str> = rel_path.split('/').collect();
    FIXED_BLOCKLIST
        .iter()
        .copied()
        .chain(extra_blocklist.iter().map(String::as_str))
        .any(|blocked| components.contains(&blocked))
}

/// Walk `root`, honoring VCS ignore rules, a `.ragignore` file, and the
/// fixed blocklist. Returns absolute file paths.
fn walk_tree(root: &Path, ragignore_file: &str, extra_blocklist: &[String]) -> Result<Vec<PathBuf>> {
    let mut builder = WalkBuilder::new(root);
    builder.hidden(false).add_custom_ignore_filename(ragignore_file);

    let mut paths = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            let rel = relative_path(root, entry.path());
            if is_blocked(&rel, extra_blocklist) {
                continue;
            }
            paths.push(entry.path().to_path_buf());
        }
    }
    Ok(paths)
}

pub(crate) fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations_on;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::tempdir;

    async fn test_catalog() -> Catalog {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations_on(&pool).await.unwrap();
        Catalog::new(pool)
    }

    #[tokio::test]
    async fn index_full_discovers_and_splits_python_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("mod.py"), "def f():\n    return 1\n").unwrap();

        let mut config = crate::config::Config::default();
        config.indexer.root = dir.path().to_path_buf();
        let catalog = test_catalog().await;

        let stats = index_full(&config, &catalog).await.unwrap();
        assert_eq!(stats.files_indexed, 1);
        assert_eq!(stats.spans_inserted, 1);
    }

    #[tokio::test]
    async fn index_full_ignores_fixed_blocklist_dirs() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/x.py"), "def f(): pass\n").unwrap();
        std::fs::write(dir.path().join("keep.py"), "def g(): pass\n").unwrap();

        let mut config = crate::config::Config::default();
        config.indexer.root = dir.path().to_path_buf();
        let catalog = test_catalog().await;

        let stats = index_full(&config, &catalog).await.unwrap();
        assert_eq!(stats.files_indexed, 1);
    }

    #[tokio::test]
    async fn index_full_removes_catalog_entries_for_deleted_files() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("gone.py");
        std::fs::write(&file_path, "def f(): pass\n").unwrap();

        let mut config = crate::config::Config::default();
        config.indexer.root = dir.path().to_path_buf();
        let catalog = test_catalog().await;

        index_full(&config, &catalog).await.unwrap();
        std::fs::remove_file(&file_path).unwrap();
        let stats = index_full(&config, &catalog).await.unwrap();
        assert_eq!(stats.files_removed, 1);
    }
}
