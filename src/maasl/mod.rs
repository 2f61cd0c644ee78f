//! Lock-mediated coordination for concurrent writers.
//!
//! Multiple agents (or a daemon worker racing a manual CLI run) can touch
//! the same catalog, graph, and docgen output at once. This module gives
//! them a shared `LockManager` plus three write paths that go through it:
//! catalog span writes ([`db_writer`]), graph patch merges ([`merge`]), and
//! gated doc writes ([`docgen`]).

pub mod db_writer;
pub mod docgen;
pub mod locks;
pub mod merge;

pub use db_writer::DbWriterSession;
pub use docgen::DocgenCoordinator;
pub use locks::{FencingToken, LockManager, ResourceClass, ResourceKey};
pub use merge::{GraphMergeEngine, GraphPatch};
