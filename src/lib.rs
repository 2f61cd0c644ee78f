//! # llmc-engine
//!
//! A local-first code catalog, retrieval, and enrichment engine.
//!
//! The engine walks a working tree, splits files into language-aware spans,
//! stores them in a content-addressed SQLite catalog, derives an
//! entity/relation graph from them, indexes them for hybrid (keyword +
//! semantic) search, and optionally enriches spans with LLM-generated
//! summaries — all while staying safe for multiple agents or processes to
//! drive concurrently.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌───────────┐
//! │ Indexer  │──▶│ Splitter  │──▶│ Catalog   │──▶│  Planner  │
//! │ (walk)   │   │ (spans)   │   │ SQLite+FTS│   │  (search) │
//! └──────────┘   └───────────┘   └─────┬────┘   └───────────┘
//!                                      │
//!                    ┌─────────────────┼─────────────────┐
//!                    ▼                 ▼                 ▼
//!             ┌─────────────┐  ┌───────────────┐  ┌─────────────┐
//!             │   Schema    │  │  Enrichment   │  │  Embedding  │
//!             │  Extractor  │  │   Pipeline    │  │  Providers  │
//!             └──────┬──────┘  └───────────────┘  └─────────────┘
//!                    ▼
//!             ┌─────────────┐
//!             │ Graph Store │
//!             └─────────────┘
//! ```
//!
//! Concurrent writers (a daemon worker racing a manual CLI run, or two
//! agents touching overlapping files) are mediated by [`maasl`]'s lock
//! manager and last-write-wins graph merge.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types: `Span`, `Entity`, `Relation`, `Enrichment` |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (version-gated) |
//! | [`catalog`] | Transactional span/entity/relation/enrichment/embedding store |
//! | [`splitter`] | Language-aware span splitting (Python, TS/JS, Markdown) |
//! | [`indexer`] | Working-tree walk, full and incremental (git-diff) indexing |
//! | [`schema_extractor`] | Entity/relation extraction from parsed spans |
//! | [`graph_store`] | In-memory entity/relation graph and artifact writer |
//! | [`embedding`] | Embedding provider trait and implementations |
//! | [`planner`] | Query classification and RRF-fused hybrid search |
//! | [`enrichment`] | LLM-backed span summarization: routing and pipeline |
//! | [`daemon`] | Background watcher/poller service with a worker pool |
//! | [`maasl`] | Multi-writer lock manager, graph merge, docgen coordination |
//! | [`error`] | Typed error taxonomy for the CLI/daemon boundary |
//! | [`progress`] | Index progress reporting (stderr, human or JSON) |
//! | [`server`] | HTTP surface (Axum) for search/span/graph queries |
//!
//! ## Configuration
//!
//! The engine is configured via a TOML file (default: `./llmc.toml`). See
//! [`config`] for all available options and [`config::load_config`] for
//! validation rules.

pub mod catalog;
pub mod config;
pub mod daemon;
pub mod db;
pub mod embedding;
pub mod enrichment;
pub mod error;
pub mod graph_store;
pub mod indexer;
pub mod maasl;
pub mod migrate;
pub mod models;
pub mod planner;
pub mod progress;
pub mod schema_extractor;
pub mod server;
pub mod splitter;
