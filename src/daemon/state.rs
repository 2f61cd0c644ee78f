//! Repo lifecycle state machine tracked by the service daemon.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoState {
    /// No indexing activity in flight; watcher (if any) is attached.
    Idle,
    /// A full or incremental index pass is running.
    Indexing,
    /// Watching for filesystem events between index passes.
    Watching,
    /// The watcher failed to attach and the daemon fell back to polling.
    Degraded { reason: String },
    /// Shutdown requested; no further work will be scheduled.
    Stopped,
}

impl RepoState {
    /// Valid transitions, enforced so callers can't e.g. schedule indexing
    /// work against a stopped repo.
    pub fn can_transition_to(&self, next: &RepoState) -> bool {
        use RepoState::*;
        matches!(
            (self, next),
            (Idle, Indexing)
                | (Idle, Watching)
                | (Idle, Degraded { .. })
                | (Idle, Stopped)
                | (Indexing, Idle)
                | (Indexing, Watching)
                | (Indexing, Degraded { .. })
                | (Indexing, Stopped)
                | (Watching, Indexing)
                | (Watching, Stopped)
                | (Watching, Degraded { .. })
                | (Degraded { .. }, Indexing)
                | (Degraded { .. }, Stopped)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_can_move_to_indexing_or_watching() {
        assert!(RepoState::Idle.can_transition_to(&RepoState::Indexing));
        assert!(RepoState::Idle.can_transition_to(&RepoState::Watching));
    }

    #[test]
    fn stopped_is_terminal() {
        assert!(!RepoState::Stopped.can_transition_to(&RepoState::Indexing));
        assert!(!RepoState::Stopped.can_transition_to(&RepoState::Idle));
    }

    #[test]
    fn watching_cannot_jump_directly_to_idle() {
        assert!(!RepoState::Watching.can_transition_to(&RepoState::Idle));
    }
}
