//! Service daemon: keeps the catalog in sync with a working tree via
//! a watcher (preferred) or polling fallback, with a bounded worker pool
//! and a periodic housekeeping pass as a safety net against missed events.

pub mod scheduler;
pub mod state;
pub mod watcher;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::indexer;

pub use state::RepoState;

/// Run the daemon until `cancel` is triggered. Spawns (in order of
/// preference) a debounced filesystem watcher or a polling fallback, plus a
/// periodic full-reindex housekeeping task, all funneling work through a
/// bounded [`scheduler::WorkerPool`].
pub async fn run(config: Config, catalog: Catalog, cancel: CancellationToken) -> anyhow::Result<()> {
    let state = Arc::new(Mutex::new(RepoState::Idle));
    let pool = scheduler::WorkerPool::new(config.daemon.max_workers);

    set_state(&state, RepoState::Indexing);
    let initial = indexer::index_full(&config, &catalog).await?;
    info!(files_indexed = initial.files_indexed, "initial index pass complete");

    let (tx, mut rx) = mpsc::channel::<Vec<std::path::PathBuf>>(64);
    let watch_handle = watcher::start(
        config.indexer.root.clone(),
        config.daemon.debounce_ms,
        cancel.clone(),
        tx,
    );

    let mut tasks = tokio::task::JoinSet::new();

    match watch_handle {
        Some(_watcher) => {
            set_state(&state, RepoState::Watching);
            let config = config.clone();
            let catalog = catalog.clone();
            let pool = pool.clone();
            let state = state.clone();
            let cancel_inner = cancel.clone();
            tasks.spawn(async move {
                // `_watcher` must stay alive for events to keep flowing;
                // moving it into this task ties its lifetime to the loop.
                let _keep_alive = _watcher;
                loop {
                    tokio::select! {
                        _ = cancel_inner.cancelled() => break,
                        maybe_batch = rx.recv() => {
                            match maybe_batch {
                                Some(_paths) => {
                                    set_state(&state, RepoState::Indexing);
                                    let result = pool.run(indexer::index_full(&config, &catalog)).await;
                                    match result {
                                        Ok(stats) => info!(
                                            files_indexed = stats.files_indexed,
                                            "watcher-driven index pass complete"
                                        ),
                                        Err(err) => warn!(error = %err, "watcher-driven index pass failed"),
                                    }
                                    set_state(&state, RepoState::Watching);
                                }
                                None => break,
                            }
                        }
                    }
                }
            });
        }
        None => {
            set_state(
                &state,
                RepoState::Degraded {
                    reason: "watcher unavailable, using polling fallback".to_string(),
                },
            );
            let config = config.clone();
            let catalog = catalog.clone();
            let cancel_inner = cancel.clone();
            tasks.spawn(async move {
                scheduler::run_poll_loop(&config, &catalog, cancel_inner).await;
            });
        }
    }

    {
        let config = config.clone();
        let catalog = catalog.clone();
        let cancel_inner = cancel.clone();
        let pool = pool.clone();
        let state = state.clone();
        tasks.spawn(async move {
            let interval = std::time::Duration::from_secs(config.daemon.housekeeping_interval_secs);
            loop {
                tokio::select! {
                    _ = cancel_inner.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        set_state(&state, RepoState::Indexing);
                        if let Err(err) = pool.run(indexer::index_full(&config, &catalog)).await {
                            warn!(error = %err, "housekeeping index pass failed");
                        }
                        set_state(&state, RepoState::Watching);
                    }
                }
            }
        });
    }

    cancel.cancelled().await;
    set_state(&state, RepoState::Stopped);
    while tasks.join_next().await.is_some() {}
    Ok(())
}

fn set_state(state: &Arc<Mutex<RepoState>>, next: RepoState) {
    let mut guard = state.lock().expect("repo state mutex poisoned");
    if guard.can_transition_to(&next) {
        *guard = next;
    } else {
        warn!(from = ?*guard, to = ?next, "ignoring invalid repo state transition");
    }
}
