//! Typed error taxonomy for the engine's library boundary.
//!
//! Internal code mostly returns `anyhow::Result` (matching the rest of the
//! crate), but operations that the CLI/daemon need to branch on — retry a
//! busy resource, surface a specific exit code, abort vs. keep going —
//! return `EngineError` so callers can `match` on `kind()` instead of
//! parsing message strings.

use std::path::PathBuf;

use thiserror::Error;

/// A resource key as tracked by the MAASL lock manager (`maasl::locks`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey(pub String);

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The engine's error taxonomy.
///
/// Propagation policy:
/// - `ResourceBusy` / `DbBusy` are retried with bounded backoff at the call
///   site that owns the resource.
/// - Per-item errors (one span, one file) are never represented as this
///   type — they are recovered locally and recorded in the relevant
///   `*Stats`/`*Outcome` struct instead of propagated.
/// - `Integrity` aborts the current operation and marks affected state
///   stale rather than proceeding.
/// - Silent swallowing of any variant is forbidden: every site that catches
///   one logs it via `tracing` before recovering.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("resource busy: {0}")]
    ResourceBusy(ResourceKey),

    #[error("database busy")]
    DbBusy,

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("backend error: {0}")]
    BackendError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("path error: {0}")]
    PathError(PathBuf),

    #[error("operation cancelled")]
    Cancelled,

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::ResourceBusy(_) | EngineError::DbBusy => 5,
            EngineError::Integrity(_) => 4,
            EngineError::ConfigError(_) => 3,
            EngineError::PathError(_) => 2,
            EngineError::BackendError(_) => 5,
            EngineError::Cancelled => 1,
            EngineError::Fatal(_) => 1,
        }
    }

    /// Machine-readable code rendered at the CLI boundary.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::ResourceBusy(_) => "resource_busy",
            EngineError::DbBusy => "db_busy",
            EngineError::Integrity(_) => "integrity",
            EngineError::BackendError(_) => "backend_error",
            EngineError::ConfigError(_) => "config_error",
            EngineError::PathError(_) => "path_error",
            EngineError::Cancelled => "cancelled",
            EngineError::Fatal(_) => "fatal",
        }
    }
}

/// Render any error as the single-line structured message the CLI/MCP
/// boundary contract requires: `code: message`.
pub fn render_boundary_error(err: &anyhow::Error) -> String {
    if let Some(engine_err) = err.downcast_ref::<EngineError>() {
        format!("{}: {}", engine_err.code(), engine_err)
    } else {
        format!("fatal: {}", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_taxonomy() {
        assert_eq!(EngineError::ConfigError("x".into()).exit_code(), 3);
        assert_eq!(EngineError::Integrity("x".into()).exit_code(), 4);
        assert_eq!(EngineError::DbBusy.exit_code(), 5);
        assert_eq!(
            EngineError::PathError(PathBuf::from("/tmp/x")).exit_code(),
            2
        );
    }

    #[test]
    fn boundary_render_includes_code() {
        let err: anyhow::Error = EngineError::DbBusy.into();
        let rendered = render_boundary_error(&err);
        assert_eq!(rendered, "db_busy: database busy");
    }
}
