//! Single-writer session for catalog mutations.
//!
//! Wraps [`Catalog`] writes with [`LockManager`] acquisition so two agents
//! (or a daemon worker and a manual `llmc index` run) never interleave
//! writes to the same file's spans.

use anyhow::Result;

use crate::catalog::Catalog;
use crate::maasl::locks::{LockManager, ResourceClass, ResourceKey};
use crate::models::{ReplaceSpansOutcome, Span};

pub struct DbWriterSession<'a> {
    catalog: &'a Catalog,
    locks: &'a LockManager,
}

impl<'a> DbWriterSession<'a> {
    pub fn new(catalog: &'a Catalog, locks: &'a LockManager) -> Self {
        Self { catalog, locks }
    }

    /// Replace a single file's spans under an exclusive `CritCode` lock
    /// scoped to that file path.
    pub async fn replace_spans(&self, file_path: &str, spans: &[Span]) -> Result<ReplaceSpansOutcome> {
        let (_guard, _token) = self
            .locks
            .acquire_one(ResourceKey::new(ResourceClass::CritCode, file_path))
            .await;
        self.catalog.replace_spans(file_path, spans).await
    }

    /// Replace spans for multiple files as one logically atomic batch: all
    /// per-file locks are acquired up front, in sorted order, before any
    /// writes happen.
    pub async fn replace_spans_batch(
        &self,
        updates: &[(String, Vec<Span>)],
    ) -> Result<Vec<ReplaceSpansOutcome>> {
        let keys = updates
            .iter()
            .map(|(path, _)| ResourceKey::new(ResourceClass::CritCode, path.clone()))
            .collect();
        let (_guards, _token) = self.locks.acquire_many(keys).await;

        let mut outcomes = Vec::with_capacity(updates.len());
        for (path, spans) in updates {
            outcomes.push(self.catalog.replace_spans(path, spans).await?);
        }
        Ok(outcomes)
    }
}
