//! Query intent classification, routing, and hybrid search.
//!
//! A query enters through [`search`], which classifies its intent,
//! chooses a route, and — for routes that need it — fetches candidates
//! from the keyword, vector, and graph-neighborhood channels and fuses
//! them with Reciprocal Rank Fusion. Every returned span is tagged with a
//! freshness state and a source so a caller can tell a trusted
//! catalog-backed answer from a filesystem fallback.

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::embedding::{blob_to_vec, cosine_similarity, create_provider, embed_query};
use crate::graph_store::{Direction, GraphStore};
use crate::indexer::hash_bytes;
use crate::models::{Entity, SearchResultItem};

const DEFAULT_RRF_K: f64 = 60.0;
const GRAPH_NEIGHBOR_DEPTH: usize = 1;
const MAX_GRAPH_SEED_ENTITIES: usize = 5;
const MIN_ENTITY_NAME_LEN: usize = 3;
const DIRECT_READ_SNIPPET_CHARS: usize = 2000;

// ============ Intent classification ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Conceptual,
    Implementation,
    Debug,
    Locate,
    General,
}

/// The outcome of classifying a query's intent, bounded by the caller's
/// remaining context budget.
#[derive(Debug, Clone)]
pub struct Classification {
    pub intent: Intent,
    pub needs_code: bool,
    pub confidence: f64,
    pub max_files: usize,
    pub max_chunks: usize,
    pub token_budget: usize,
    pub reason: &'static str,
}

/// Pattern-family classification of a query's intent. Families are
/// checked in precedence order — conceptual, implementation, debug,
/// locate, general — and the first match wins. The exact pattern set is
/// an empirical, tunable detail, so the decision is logged via
/// `tracing::debug!` from [`classify`] rather than treated as fixed.
fn classify_intent(query: &str) -> (Intent, &'static str) {
    let lower = query.to_lowercase();

    const CONCEPTUAL_MARKERS: &[&str] = &[
        "how does",
        "why does",
        "what is",
        "what are",
        "explain",
        "overview of",
        "architecture of",
        "how do",
    ];
    if CONCEPTUAL_MARKERS.iter().any(|m| lower.contains(m)) {
        return (Intent::Conceptual, "conceptual marker");
    }

    const IMPLEMENTATION_MARKERS: &[&str] = &[
        "implement",
        "add a",
        "add support for",
        "write a",
        "create a function",
        "create a class",
        "refactor",
    ];
    if IMPLEMENTATION_MARKERS.iter().any(|m| lower.contains(m)) {
        return (Intent::Implementation, "implementation marker");
    }

    const DEBUG_MARKERS: &[&str] = &[
        "error",
        "exception",
        "traceback",
        "fails",
        "failing",
        "panic",
        "bug",
        "crash",
        "doesn't work",
    ];
    if DEBUG_MARKERS.iter().any(|m| lower.contains(m)) {
        return (Intent::Debug, "debug marker");
    }

    const DISCOVERY_VERBS: &[&str] = &["find", "where is", "show me", "list all", "search for", "locate"];
    let is_discovery = DISCOVERY_VERBS.iter().any(|m| lower.contains(m));
    let is_bare_identifier = query.split_whitespace().count() <= 3 && looks_like_identifier(query);
    if is_discovery || is_bare_identifier {
        let reason = if is_discovery { "discovery verb" } else { "bare identifier" };
        return (Intent::Locate, reason);
    }

    (Intent::General, "no pattern matched")
}

fn looks_like_identifier(query: &str) -> bool {
    let trimmed = query.trim();
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '/' | '-'))
        && trimmed.chars().any(|c| c.is_alphabetic())
}

/// Classify a query's intent and derive the retrieval budgets it's
/// allowed, bounded by `context_remaining` (the caller's remaining token
/// budget for this turn). Conceptual intent always gets
/// `needs_code=false`/`max_files=0` — it's answered from model knowledge,
/// never from a catalog read.
pub fn classify(query: &str, context_remaining: usize) -> Classification {
    let (intent, reason) = classify_intent(query);

    let (needs_code, max_files, max_chunks, confidence): (bool, usize, usize, f64) = match intent {
        Intent::Conceptual => (false, 0, 0, 0.8),
        Intent::Locate => (true, 3, 6, 0.8),
        Intent::Debug => (true, 5, 16, 0.75),
        Intent::Implementation => (true, 8, 24, 0.7),
        Intent::General => (true, 8, 24, 0.5),
    };
    let token_budget = context_remaining.min(max_chunks.saturating_mul(800).max(800));

    debug!(
        query,
        intent = ?intent,
        reason,
        max_files,
        confidence,
        "classified query intent"
    );

    Classification {
        intent,
        needs_code,
        confidence,
        max_files,
        max_chunks,
        token_budget,
        reason,
    }
}

// ============ Routing ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    DirectRead,
    KnowledgeOnly,
    RagSearch,
    Hybrid,
}

#[derive(Debug, Clone, Copy)]
pub struct RagLimits {
    pub fetch_per_channel: usize,
    pub result_limit: usize,
}

#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub strategy: Route,
    pub use_rag: bool,
    pub use_filesystem: bool,
    pub fallback_to_rag: bool,
    pub rag_limits: Option<RagLimits>,
    pub explicit_file: Option<String>,
}

/// Deterministic strategy selection: an explicit file reference always
/// wins (direct read, with a RAG fallback available for typo recovery);
/// conceptual intent never touches the catalog; a bare identifier or
/// discovery verb goes straight to RAG; everything else blends lexical,
/// vector, and graph channels.
pub fn route_query(classification: &Classification, explicit_file: Option<&str>) -> RouteDecision {
    if let Some(file) = explicit_file {
        return RouteDecision {
            strategy: Route::DirectRead,
            use_rag: false,
            use_filesystem: true,
            fallback_to_rag: true,
            rag_limits: Some(RagLimits {
                fetch_per_channel: 40,
                result_limit: 5,
            }),
            explicit_file: Some(file.to_string()),
        };
    }

    match classification.intent {
        Intent::Conceptual => RouteDecision {
            strategy: Route::KnowledgeOnly,
            use_rag: false,
            use_filesystem: false,
            fallback_to_rag: false,
            rag_limits: None,
            explicit_file: None,
        },
        Intent::Locate => RouteDecision {
            strategy: Route::RagSearch,
            use_rag: true,
            use_filesystem: false,
            fallback_to_rag: false,
            rag_limits: Some(RagLimits {
                fetch_per_channel: 40,
                result_limit: 8,
            }),
            explicit_file: None,
        },
        Intent::Implementation | Intent::Debug | Intent::General => RouteDecision {
            strategy: Route::Hybrid,
            use_rag: true,
            use_filesystem: false,
            fallback_to_rag: false,
            rag_limits: Some(RagLimits {
                fetch_per_channel: 40,
                result_limit: 12,
            }),
            explicit_file: None,
        },
    }
}

/// Detect a single explicit file reference in a query (e.g. `"Read
/// config.json"`), by scanning for a whitespace-separated token that
/// looks like a relative path with an extension. Returns `None` when
/// nothing in the query looks like a file reference.
pub fn detect_file_reference(query: &str) -> Option<String> {
    query.split_whitespace().find_map(|token| {
        let trimmed =
            token.trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '/' && c != '_' && c != '-');
        let ext = trimmed.rsplit('.').next()?;
        let has_extension =
            trimmed.contains('.') && !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
        (has_extension && trimmed.len() > ext.len() + 1).then(|| trimmed.to_string())
    })
}

// ============ Freshness ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Unknown,
}

impl Freshness {
    pub fn as_str(self) -> &'static str {
        match self {
            Freshness::Fresh => "FRESH",
            Freshness::Stale => "STALE",
            Freshness::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTag {
    RagGraph,
    LocalFallback,
}

impl SourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::RagGraph => "RAG_GRAPH",
            SourceTag::LocalFallback => "LOCAL_FALLBACK",
        }
    }
}

/// Compares the catalog's recorded content hash for `rel_path` against a
/// hash of `current_bytes`. A path the catalog has never seen is reported
/// `Stale` (the tree has moved ahead of the catalog), not `Unknown` —
/// `Unknown` is reserved for paths that don't exist on disk at all, which
/// callers check before reaching this function.
async fn tag_freshness(catalog: &Catalog, rel_path: &str, current_bytes: &[u8]) -> Result<Freshness> {
    let current_hash = hash_bytes(current_bytes);
    match catalog.file_content_hash(rel_path).await? {
        Some(stored_hash) if stored_hash == current_hash => Ok(Freshness::Fresh),
        _ => Ok(Freshness::Stale),
    }
}

/// Freshness of a catalog-sourced result: reads the file's current
/// on-disk content (if any) and compares against the catalog's record.
/// `Unknown` when the file no longer exists on disk at all.
async fn result_freshness(config: &Config, catalog: &Catalog, file_path: &str) -> Result<Freshness> {
    let abs_path = config.indexer.root.join(file_path);
    match std::fs::read(&abs_path) {
        Ok(bytes) => tag_freshness(catalog, file_path, &bytes).await,
        Err(_) => Ok(Freshness::Unknown),
    }
}

fn freshness_rank(freshness: &str) -> u8 {
    match freshness {
        "FRESH" => 0,
        "STALE" => 1,
        _ => 2,
    }
}

// ============ Plan output ============

/// Observability features surfaced alongside a plan's spans: how densely
/// connected the detected entities are, how much of the result set is
/// graph-backed, and a rough complexity signal derived from both.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanFeatures {
    pub relation_density: f64,
    pub graph_coverage: f64,
    pub complexity_score: f64,
    pub detected_entities: Vec<String>,
}

/// The planner's output: ranked spans plus the classifier's confidence
/// and the features that went into ranking them.
#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub spans: Vec<SearchResultItem>,
    pub confidence: f64,
    pub features: PlanFeatures,
}

// ============ Top-level entry point ============

/// Classify the query, route it, and execute the chosen strategy.
/// Conceptual queries (`KnowledgeOnly`) return immediately with no spans
/// and never touch the catalog; explicit file references (`DirectRead`)
/// read straight from the working tree; everything else runs hybrid
/// retrieval across the keyword, vector, and graph channels.
pub async fn search(
    config: &Config,
    catalog: &Catalog,
    profile_name: &str,
    query: &str,
    limit: usize,
    context_remaining: usize,
) -> Result<PlanResult> {
    let classification = classify(query, context_remaining);
    let explicit_file = detect_file_reference(query);
    let route = route_query(&classification, explicit_file.as_deref());

    match route.strategy {
        Route::KnowledgeOnly => Ok(PlanResult {
            spans: Vec::new(),
            confidence: classification.confidence,
            features: PlanFeatures::default(),
        }),
        Route::DirectRead => {
            let file_ref = route
                .explicit_file
                .as_deref()
                .expect("DirectRead route always carries an explicit_file");
            direct_read(config, catalog, file_ref, &classification).await
        }
        Route::RagSearch | Route::Hybrid => {
            hybrid_search(config, catalog, profile_name, query, limit, &classification).await
        }
    }
}

/// Reads an explicit file reference straight from the working tree.
/// Spans come back empty when the path doesn't exist on disk at all —
/// the filesystem is the only source this route consults.
async fn direct_read(
    config: &Config,
    catalog: &Catalog,
    file_ref: &str,
    classification: &Classification,
) -> Result<PlanResult> {
    let abs_path = config.indexer.root.join(file_ref);

    let spans = match std::fs::read(&abs_path) {
        Ok(bytes) => {
            let freshness = tag_freshness(catalog, file_ref, &bytes).await?;
            let body = String::from_utf8_lossy(&bytes);
            vec![SearchResultItem {
                span_id: String::new(),
                file_path: file_ref.to_string(),
                name: None,
                score: 1.0,
                snippet: truncate_snippet(&body),
                freshness: freshness.as_str().to_string(),
                source_tag: SourceTag::LocalFallback.as_str().to_string(),
            }]
        }
        Err(_) => Vec::new(),
    };

    Ok(PlanResult {
        spans,
        confidence: classification.confidence,
        features: PlanFeatures::default(),
    })
}

fn truncate_snippet(body: &str) -> String {
    if body.len() <= DIRECT_READ_SNIPPET_CHARS {
        body.to_string()
    } else {
        format!("{}...", &body[..DIRECT_READ_SNIPPET_CHARS])
    }
}

// ============ Hybrid retrieval ============

struct ChannelHit {
    span_id: String,
    file_path: String,
    snippet: String,
}

async fn hybrid_search(
    config: &Config,
    catalog: &Catalog,
    profile_name: &str,
    query: &str,
    limit: usize,
    classification: &Classification,
) -> Result<PlanResult> {
    let fetch_n = (limit * 4).max(40) as i64;

    let keyword_hits = fetch_keyword_candidates(catalog, query, fetch_n).await?;
    let vector_hits = fetch_vector_candidates(config, catalog, profile_name, query, fetch_n as usize).await?;

    let graph = GraphStore::load(catalog).await?;
    let detected_entities = detect_entities(&graph, query);
    let graph_hits = fetch_graph_candidates(catalog, &graph, &detected_entities, fetch_n as usize).await?;

    let fused = fuse_rrf(&[keyword_hits, vector_hits, graph_hits], DEFAULT_RRF_K);

    let mut results = Vec::with_capacity(limit.min(fused.len()));
    for (span_id, score, file_path, snippet) in fused.into_iter().take(limit) {
        let name = catalog.span_by_id(&span_id).await?.and_then(|s| s.name);
        let freshness = result_freshness(config, catalog, &file_path).await?;
        results.push(SearchResultItem {
            span_id,
            file_path,
            name,
            score,
            snippet,
            freshness: freshness.as_str().to_string(),
            source_tag: SourceTag::RagGraph.as_str().to_string(),
        });
    }

    break_score_ties(&mut results);
    let features = compute_features(&graph, &detected_entities, &results);

    Ok(PlanResult {
        spans: results,
        confidence: classification.confidence,
        features,
    })
}

async fn fetch_keyword_candidates(catalog: &Catalog, query: &str, limit: i64) -> Result<Vec<ChannelHit>> {
    let rows = catalog.keyword_search(query, limit).await?;
    Ok(rows
        .into_iter()
        .map(|(span_id, file_path, _score, snippet)| ChannelHit {
            span_id,
            file_path,
            snippet,
        })
        .collect())
}

async fn fetch_vector_candidates(
    config: &Config,
    catalog: &Catalog,
    profile_name: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<ChannelHit>> {
    let profile = match config.embeddings.profile(profile_name) {
        Ok(p) if p.is_enabled() => p,
        _ => return Ok(Vec::new()),
    };

    let provider = create_provider(profile_name, profile)?;
    let query_vec = embed_query(provider.as_ref(), profile, query).await?;

    let stored = catalog.all_embeddings(profile_name).await?;
    let mut scored: Vec<(f32, String, String)> = stored
        .into_iter()
        .map(|(span_id, file_path, blob)| {
            let vec = blob_to_vec(&blob);
            let score = cosine_similarity(&query_vec, &vec);
            (score, span_id, file_path)
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);

    let mut hits = Vec::with_capacity(scored.len());
    for (_score, span_id, file_path) in scored {
        let snippet = catalog
            .span_by_id(&span_id)
            .await?
            .map(|s| truncate_snippet(&s.body))
            .unwrap_or_default();
        hits.push(ChannelHit {
            span_id,
            file_path,
            snippet,
        });
    }
    Ok(hits)
}

/// Finds entities mentioned in the query (by substring match on name),
/// then seeds a candidate set from each match's one-hop neighborhood.
/// Caps the number of seed entities so a query matching many short names
/// can't blow up the traversal.
async fn fetch_graph_candidates(
    catalog: &Catalog,
    graph: &GraphStore,
    detected_entities: &[String],
    limit: usize,
) -> Result<Vec<ChannelHit>> {
    let mut seen = std::collections::HashSet::new();
    let mut ordered_hits: Vec<(String, String)> = Vec::new();

    'seeds: for name in detected_entities {
        for seed in graph.entities().iter().filter(|e| &e.name == name) {
            if seen.insert(seed.span_id.clone()) {
                ordered_hits.push((seed.span_id.clone(), seed.file_path.clone()));
            }
            for (neighbor, _kind, _depth) in graph.get_neighbors(&seed.id, GRAPH_NEIGHBOR_DEPTH, Direction::Both) {
                if seen.insert(neighbor.span_id.clone()) {
                    ordered_hits.push((neighbor.span_id.clone(), neighbor.file_path.clone()));
                }
                if ordered_hits.len() >= limit {
                    break 'seeds;
                }
            }
        }
    }

    let mut hits = Vec::with_capacity(ordered_hits.len());
    for (span_id, file_path) in ordered_hits {
        let snippet = catalog
            .span_by_id(&span_id)
            .await?
            .map(|s| truncate_snippet(&s.body))
            .unwrap_or_default();
        hits.push(ChannelHit {
            span_id,
            file_path,
            snippet,
        });
    }
    Ok(hits)
}

fn detect_entities(graph: &GraphStore, query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut found = Vec::new();
    for entity in graph.entities() {
        if entity.name.len() < MIN_ENTITY_NAME_LEN || found.contains(&entity.name) {
            continue;
        }
        if lower.contains(&entity.name.to_lowercase()) {
            found.push(entity.name.clone());
            if found.len() >= MAX_GRAPH_SEED_ENTITIES {
                break;
            }
        }
    }
    found
}

fn compute_features(graph: &GraphStore, detected_entities: &[String], results: &[SearchResultItem]) -> PlanFeatures {
    if detected_entities.is_empty() {
        return PlanFeatures::default();
    }

    let mut total_edges = 0usize;
    let mut seed_count = 0usize;
    for name in detected_entities {
        for seed in graph.entities().iter().filter(|e: &&Entity| &e.name == name) {
            total_edges += graph.get_neighbors(&seed.id, 1, Direction::Both).len();
            seed_count += 1;
        }
    }
    let relation_density = if seed_count == 0 {
        0.0
    } else {
        total_edges as f64 / seed_count as f64
    };

    let graph_span_ids: std::collections::HashSet<&str> =
        graph.entities().iter().map(|e| e.span_id.as_str()).collect();
    let graph_coverage = if results.is_empty() {
        0.0
    } else {
        results.iter().filter(|r| graph_span_ids.contains(r.span_id.as_str())).count() as f64 / results.len() as f64
    };

    let complexity_score = (relation_density / 10.0).min(1.0);

    PlanFeatures {
        relation_density,
        graph_coverage,
        complexity_score,
        detected_entities: detected_entities.to_vec(),
    }
}

/// Within each group of exactly-tied scores, break ties by (freshness,
/// file path) — fresher results first, then lexicographic path order.
fn break_score_ties(results: &mut [SearchResultItem]) {
    let mut start = 0;
    while start < results.len() {
        let mut end = start + 1;
        while end < results.len() && (results[end].score - results[start].score).abs() < 1e-9 {
            end += 1;
        }
        if end - start > 1 {
            results[start..end].sort_by(|a, b| {
                freshness_rank(&a.freshness)
                    .cmp(&freshness_rank(&b.freshness))
                    .then_with(|| a.file_path.cmp(&b.file_path))
            });
        }
        start = end;
    }
}

/// Reciprocal Rank Fusion: `score(span) = Σ_channel 1 / (k + rank)` over
/// every channel the span appears in, where `rank` is the span's 1-based
/// position within that channel. Commutative in the channel list's order
/// and monotone in any single channel's ranking, so it never needs
/// cross-channel score normalization — what makes it safe to mix BM25
/// ranks with cosine-similarity ranks with graph-traversal order.
fn fuse_rrf(channels: &[Vec<ChannelHit>], k: f64) -> Vec<(String, f64, String, String)> {
    use std::collections::HashMap;

    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut meta: HashMap<String, (String, String)> = HashMap::new();

    for channel in channels {
        for (idx, hit) in channel.iter().enumerate() {
            let rank = (idx + 1) as f64;
            *scores.entry(hit.span_id.clone()).or_insert(0.0) += 1.0 / (k + rank);
            meta.entry(hit.span_id.clone())
                .or_insert_with(|| (hit.file_path.clone(), hit.snippet.clone()));
        }
    }

    let mut fused: Vec<(String, f64, String, String)> = scores
        .into_iter()
        .map(|(span_id, score)| {
            let (file_path, snippet) = meta.remove(&span_id).unwrap_or_default();
            (span_id, score, file_path, snippet)
        })
        .collect();

    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations_on;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_catalog() -> Catalog {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        run_migrations_on(&pool).await.unwrap();
        Catalog::new(pool)
    }

    // ---------- classify_intent / classify ----------

    #[test]
    fn classifies_conceptual_queries_with_zero_files() {
        let c = classify("How does memory storage work in the RAG system?", 8000);
        assert_eq!(c.intent, Intent::Conceptual);
        assert!(!c.needs_code);
        assert_eq!(c.max_files, 0);
    }

    #[test]
    fn classifies_bare_identifier_as_locate() {
        let c = classify("UserRepository.save", 8000);
        assert_eq!(c.intent, Intent::Locate);
    }

    #[test]
    fn classifies_discovery_verb_as_locate() {
        let c = classify("find the retry loop helper", 8000);
        assert_eq!(c.intent, Intent::Locate);
    }

    #[test]
    fn classifies_error_report_as_debug() {
        let c = classify("search fails with a panic on empty query", 8000);
        assert_eq!(c.intent, Intent::Debug);
    }

    #[test]
    fn classifies_feature_request_as_implementation() {
        let c = classify("implement a retry queue for failed enrichments", 8000);
        assert_eq!(c.intent, Intent::Implementation);
    }

    #[test]
    fn token_budget_never_exceeds_context_remaining() {
        let c = classify("implement a new backend adapter", 100);
        assert!(c.token_budget <= 100);
    }

    // ---------- route_query ----------

    #[test]
    fn explicit_file_reference_routes_to_direct_read() {
        let c = classify("Read config.json", 8000);
        let route = route_query(&c, Some("config.json"));
        assert_eq!(route.strategy, Route::DirectRead);
        assert!(route.fallback_to_rag);
        assert_eq!(route.explicit_file.as_deref(), Some("config.json"));
    }

    #[test]
    fn conceptual_intent_routes_to_knowledge_only() {
        let c = classify("What is the architecture of the indexer?", 8000);
        let route = route_query(&c, None);
        assert_eq!(route.strategy, Route::KnowledgeOnly);
        assert!(!route.use_rag);
    }

    #[test]
    fn locate_intent_routes_to_rag_search() {
        let c = classify("find parse_file", 8000);
        let route = route_query(&c, None);
        assert_eq!(route.strategy, Route::RagSearch);
    }

    #[test]
    fn general_intent_routes_to_hybrid() {
        let c = classify("tell me about the enrichment pipeline config", 8000);
        let route = route_query(&c, None);
        assert_eq!(route.strategy, Route::Hybrid);
    }

    // ---------- detect_file_reference ----------

    #[test]
    fn detects_file_reference_with_extension() {
        assert_eq!(detect_file_reference("Read config.json"), Some("config.json".to_string()));
    }

    #[test]
    fn no_file_reference_in_a_plain_sentence() {
        assert_eq!(detect_file_reference("how does the planner rank spans"), None);
    }

    // ---------- RRF ----------

    #[test]
    fn rrf_rewards_spans_ranked_highly_in_either_channel() {
        let keyword = vec![
            ChannelHit { span_id: "a".into(), file_path: "a.py".into(), snippet: "".into() },
            ChannelHit { span_id: "b".into(), file_path: "b.py".into(), snippet: "".into() },
        ];
        let vector = vec![
            ChannelHit { span_id: "b".into(), file_path: "b.py".into(), snippet: "".into() },
            ChannelHit { span_id: "a".into(), file_path: "a.py".into(), snippet: "".into() },
        ];
        let fused = fuse_rrf(&[keyword, vector], DEFAULT_RRF_K);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].1 - fused[1].1).abs() < 1e-12);
    }

    #[test]
    fn rrf_score_matches_formula_for_single_channel() {
        let channel = vec![ChannelHit { span_id: "a".into(), file_path: "a.py".into(), snippet: "".into() }];
        let fused = fuse_rrf(&[channel], DEFAULT_RRF_K);
        assert!((fused[0].1 - (1.0 / (DEFAULT_RRF_K + 1.0))).abs() < 1e-12);
    }

    #[test]
    fn empty_channels_produce_no_results() {
        let fused = fuse_rrf(&[Vec::new(), Vec::new()], DEFAULT_RRF_K);
        assert!(fused.is_empty());
    }

    // ---------- end-to-end scenarios ----------

    #[tokio::test]
    async fn conceptual_query_returns_empty_plan_without_touching_catalog() {
        let catalog = test_catalog().await;
        let config = Config::default();

        let plan = search(
            &config,
            &catalog,
            "default",
            "How does memory storage work in the RAG system?",
            5,
            8000,
        )
        .await
        .unwrap();

        assert!(plan.spans.is_empty());
        assert!(plan.features.detected_entities.is_empty());
    }

    #[tokio::test]
    async fn direct_read_of_uncatalogued_file_reports_stale_local_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{\"a\":1}").unwrap();

        let catalog = test_catalog().await;
        let mut config = Config::default();
        config.indexer.root = dir.path().to_path_buf();

        let plan = search(&config, &catalog, "default", "Read config.json", 5, 8000)
            .await
            .unwrap();

        assert_eq!(plan.spans.len(), 1);
        assert_eq!(plan.spans[0].freshness, "STALE");
        assert_eq!(plan.spans[0].source_tag, "LOCAL_FALLBACK");
    }

    #[tokio::test]
    async fn direct_read_of_missing_file_returns_no_spans() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = test_catalog().await;
        let mut config = Config::default();
        config.indexer.root = dir.path().to_path_buf();

        let plan = search(&config, &catalog, "default", "Read missing.json", 5, 8000)
            .await
            .unwrap();

        assert!(plan.spans.is_empty());
    }
}
