//! Debounced filesystem watcher built on an async/cancellable `notify` +
//! debounce-loop event pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Attach a recursive watcher on `root` and emit debounced batches of
/// changed paths on `out`. Returns `None` (instead of erroring) if the
/// watcher can't be created, so the caller can fall back to polling.
pub fn start(
    root: PathBuf,
    debounce_ms: u64,
    cancel: CancellationToken,
    out: mpsc::Sender<Vec<PathBuf>>,
) -> Option<RecommendedWatcher> {
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = match RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = raw_tx.send(event);
            }
        },
        notify::Config::default(),
    ) {
        Ok(w) => w,
        Err(err) => {
            error!(error = %err, "failed to create filesystem watcher");
            return None;
        }
    };

    if let Err(err) = watcher.watch(&root, RecursiveMode::Recursive) {
        error!(path = %root.display(), error = %err, "failed to watch root");
        return None;
    }
    info!(path = %root.display(), "watching for changes");

    tokio::spawn(async move {
        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
        let debounce = Duration::from_millis(debounce_ms);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                maybe_event = raw_rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            if relevant(&event.kind) {
                                let now = Instant::now();
                                for path in event.paths {
                                    pending.insert(path, now);
                                }
                            }
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(debounce) => {
                    if pending.is_empty() {
                        continue;
                    }
                    let cutoff = Instant::now() - debounce;
                    let ready: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, t)| **t <= cutoff)
                        .map(|(p, _)| p.clone())
                        .collect();
                    for path in &ready {
                        pending.remove(path);
                    }
                    if !ready.is_empty() && out.send(ready).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    Some(watcher)
}

fn relevant(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevant_filters_access_events() {
        assert!(relevant(&EventKind::Create(notify::event::CreateKind::File)));
        assert!(!relevant(&EventKind::Access(notify::event::AccessKind::Read)));
    }
}
