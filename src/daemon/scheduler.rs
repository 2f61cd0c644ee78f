//! Polling fallback and bounded worker pool for the service daemon.
//!
//! When the `notify`-based watcher can't attach (unsupported filesystem,
//! inotify watch limit reached), the daemon falls back to polling a full
//! reindex on an interval that backs off exponentially between
//! `poll_min_secs` and `poll_max_secs` whenever a poll finds nothing
//! changed, and resets to `poll_min_secs` as soon as something did.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::indexer::{self, IndexStats};

pub struct PollBackoff {
    current_secs: u64,
    min_secs: u64,
    max_secs: u64,
}

impl PollBackoff {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            current_secs: min_secs,
            min_secs,
            max_secs,
        }
    }

    pub fn current(&self) -> u64 {
        self.current_secs
    }

    /// Call after a poll that found no changes: doubles the interval, capped
    /// at `max_secs`.
    pub fn back_off(&mut self) {
        self.current_secs = (self.current_secs * 2).min(self.max_secs);
    }

    /// Call after a poll that found changes: resets to `min_secs`.
    pub fn reset(&mut self) {
        self.current_secs = self.min_secs;
    }
}

/// Run the polling fallback loop until `cancel` fires. Each iteration runs
/// a full index pass and adjusts the backoff based on whether it found
/// anything to do.
pub async fn run_poll_loop(config: &Config, catalog: &Catalog, cancel: CancellationToken) {
    let mut backoff = PollBackoff::new(config.daemon.poll_min_secs, config.daemon.poll_max_secs);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(std::time::Duration::from_secs(backoff.current())) => {}
        }
        if cancel.is_cancelled() {
            break;
        }

        match indexer::index_full(config, catalog).await {
            Ok(stats) if changed(&stats) => {
                info!(interval_secs = backoff.current(), "poll found changes, resetting backoff");
                backoff.reset();
            }
            Ok(_) => {
                backoff.back_off();
            }
            Err(err) => {
                warn!(error = %err, "poll-driven index pass failed");
                backoff.back_off();
            }
        }
    }
}

fn changed(stats: &IndexStats) -> bool {
    stats.spans_inserted > 0 || stats.spans_deleted > 0 || stats.files_removed > 0
}

/// A bounded pool limiting how many indexing/enrichment jobs run
/// concurrently, so a burst of watcher events doesn't spawn unbounded work.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    /// Run `job` once a worker slot is free, holding the permit for the
    /// duration of the job.
    pub async fn run<F, T>(&self, job: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let _permit = self.semaphore.acquire().await.expect("semaphore not closed");
        job.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_max_and_resets() {
        let mut backoff = PollBackoff::new(10, 100);
        assert_eq!(backoff.current(), 10);
        backoff.back_off();
        assert_eq!(backoff.current(), 20);
        backoff.back_off();
        assert_eq!(backoff.current(), 40);
        backoff.back_off();
        assert_eq!(backoff.current(), 80);
        backoff.back_off();
        assert_eq!(backoff.current(), 100); // capped
        backoff.reset();
        assert_eq!(backoff.current(), 10);
    }

    #[tokio::test]
    async fn worker_pool_limits_concurrency() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let max_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let pool = pool.clone();
            let counter = counter.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                pool.run(async {
                    let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                    max_seen.fetch_max(n, std::sync::atomic::Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(max_seen.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    }
}
