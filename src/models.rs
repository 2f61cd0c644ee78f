//! Core data model shared across the indexer, catalog, graph, and planner.
//!
//! These types represent the spans, entities, relations, enrichments, and
//! embeddings that flow through the engine's pipeline.

use serde::{Deserialize, Serialize};

/// A tracked file in the catalog (`files` table).
#[derive(Debug, Clone)]
pub struct IndexedFile {
    pub path: String,
    pub content_hash: String,
    pub language: String,
    pub size_bytes: i64,
    pub mtime: i64,
    pub indexed_at: i64,
}

/// The kind of a parsed span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpanKind {
    Function,
    Method,
    Class,
    Module,
    MarkdownSection { heading_level: u8 },
    Block,
}

impl SpanKind {
    /// Stable string form stored in `spans.span_kind`.
    pub fn as_db_str(&self) -> String {
        match self {
            SpanKind::Function => "function".to_string(),
            SpanKind::Method => "method".to_string(),
            SpanKind::Class => "class".to_string(),
            SpanKind::Module => "module".to_string(),
            SpanKind::MarkdownSection { heading_level } => {
                format!("markdown_section:{}", heading_level)
            }
            SpanKind::Block => "block".to_string(),
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        if let Some(level_str) = s.strip_prefix("markdown_section:") {
            let heading_level = level_str.parse().unwrap_or(1);
            return SpanKind::MarkdownSection { heading_level };
        }
        match s {
            "function" => SpanKind::Function,
            "method" => SpanKind::Method,
            "class" => SpanKind::Class,
            "module" => SpanKind::Module,
            _ => SpanKind::Block,
        }
    }
}

/// A content-addressed span produced by the language splitter.
#[derive(Debug, Clone)]
pub struct Span {
    pub id: String,
    pub file_path: String,
    pub span_kind: SpanKind,
    pub name: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub byte_start: usize,
    pub byte_end: usize,
    pub body: String,
    pub span_hash: String,
    pub parse_degraded: bool,
}

/// The kind of entity derived by the schema extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Function,
    Class,
    Method,
    Module,
}

impl EntityKind {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            EntityKind::Function => "function",
            EntityKind::Class => "class",
            EntityKind::Method => "method",
            EntityKind::Module => "module",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "class" => EntityKind::Class,
            "method" => EntityKind::Method,
            "module" => EntityKind::Module,
            _ => EntityKind::Function,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: String,
    pub span_id: String,
    pub kind: EntityKind,
    pub name: String,
    pub file_path: String,
}

/// The kind of relation between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Calls,
    Uses,
    Extends,
    Reads,
    Writes,
    Imports,
}

impl RelationKind {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RelationKind::Calls => "calls",
            RelationKind::Uses => "uses",
            RelationKind::Extends => "extends",
            RelationKind::Reads => "reads",
            RelationKind::Writes => "writes",
            RelationKind::Imports => "imports",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "uses" => RelationKind::Uses,
            "extends" => RelationKind::Extends,
            "reads" => RelationKind::Reads,
            "writes" => RelationKind::Writes,
            "imports" => RelationKind::Imports,
            _ => RelationKind::Calls,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Relation {
    pub id: String,
    pub from_entity: String,
    pub to_entity: Option<String>,
    pub to_name_unresolved: Option<String>,
    pub kind: RelationKind,
    pub confidence: f32,
}

/// Quality classification for an enrichment outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Real,
    Placeholder,
    Fake,
}

impl Quality {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Quality::Real => "real",
            Quality::Placeholder => "placeholder",
            Quality::Fake => "fake",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "real" => Quality::Real,
            "placeholder" => Quality::Placeholder,
            _ => Quality::Fake,
        }
    }
}

/// The result of one backend attempt within an enrichment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    HttpError,
    Timeout,
    InvalidResponse,
}

impl AttemptOutcome {
    pub fn as_db_str(self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::HttpError => "http_error",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::InvalidResponse => "invalid_response",
        }
    }
}

/// One backend attempt made while producing an [`Enrichment`], in the
/// order backends were tried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub backend_host: String,
    pub outcome: AttemptOutcome,
    pub error: Option<String>,
}

/// A stored enrichment result for one span (`enrichments` table).
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub span_id: String,
    pub span_hash: String,
    pub chain: String,
    pub summary: Option<String>,
    pub key_topics: Vec<String>,
    pub complexity: f64,
    pub model: Option<String>,
    pub backend_host: Option<String>,
    pub quality: Quality,
    pub tokens_per_second: Option<f64>,
    pub attempts_log: Vec<AttemptRecord>,
    pub created_at: i64,
}

/// A stored embedding for one span under one profile (`embeddings` table).
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub span_id: String,
    pub profile: String,
    pub span_hash: String,
    pub model: String,
    pub dims: usize,
    pub vector: Vec<u8>,
    pub created_at: i64,
}

/// Outcome of a `Catalog::replace_spans` call.
#[derive(Debug, Clone, Default)]
pub struct ReplaceSpansOutcome {
    pub inserted: u64,
    pub unchanged: u64,
    pub deleted: u64,
}

/// Result of a search query, returned at the planner boundary.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub span_id: String,
    pub file_path: String,
    pub name: Option<String>,
    pub score: f64,
    pub snippet: String,
    pub freshness: String,
    pub source_tag: String,
}
