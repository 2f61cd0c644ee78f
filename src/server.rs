//! HTTP surface for the engine.
//!
//! Exposes search, span lookup, and graph traversal over the catalog so an
//! external tool (editor plugin, MCP-compatible client) can query the index
//! without shelling out to the CLI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/tools/search` | Hybrid (keyword+semantic) span search |
//! | `POST` | `/tools/span` | Retrieve a span by id |
//! | `POST` | `/tools/graph/neighbors` | BFS neighbor traversal from an entity |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! and cross-origin tool clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::graph_store::{Direction, GraphStore};
use crate::models::SearchResultItem;
use crate::planner;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    catalog: Catalog,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and registers all
/// route handlers. Runs until the process is terminated.
pub async fn run_server(config: &Config, catalog: Catalog) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let state = AppState {
        config: Arc::new(config.clone()),
        catalog,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/tools/search", post(handle_search))
        .route("/tools/span", post(handle_span))
        .route("/tools/graph/neighbors", post(handle_graph_neighbors))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!(bind = %bind_addr, "http server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ POST /tools/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_profile")]
    profile: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
    #[serde(default = "default_context_remaining")]
    context_remaining: usize,
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_search_limit() -> usize {
    12
}

fn default_context_remaining() -> usize {
    8000
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResultItem>,
    confidence: f64,
    features: planner::PlanFeatures,
}

/// Handler for `POST /tools/search`. Runs the planner (classification,
/// routing, and retrieval) and returns ranked spans plus the features
/// that went into ranking them. Returns `400` for empty queries, `500`
/// on internal error.
async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let plan = planner::search(
        &state.config,
        &state.catalog,
        &req.profile,
        &req.query,
        req.limit,
        req.context_remaining,
    )
    .await
    .map_err(|e| internal_error(e.to_string()))?;

    Ok(Json(SearchResponse {
        results: plan.spans,
        confidence: plan.confidence,
        features: plan.features,
    }))
}

// ============ POST /tools/span ============

#[derive(Deserialize)]
struct SpanRequest {
    span_id: String,
}

#[derive(Serialize)]
struct SpanResponse {
    span_id: String,
    file_path: String,
    kind: String,
    name: Option<String>,
    start_line: u32,
    end_line: u32,
    body: String,
}

/// Handler for `POST /tools/span`. Returns `404` if the span is unknown.
async fn handle_span(
    State(state): State<AppState>,
    Json(req): Json<SpanRequest>,
) -> Result<Json<SpanResponse>, AppError> {
    if req.span_id.trim().is_empty() {
        return Err(bad_request("span_id must not be empty"));
    }

    let span = state
        .catalog
        .span_by_id(&req.span_id)
        .await
        .map_err(|e| internal_error(e.to_string()))?
        .ok_or_else(|| not_found(format!("no span with id {}", req.span_id)))?;

    Ok(Json(SpanResponse {
        span_id: span.id,
        file_path: span.file_path,
        kind: span.span_kind.as_db_str(),
        name: span.name,
        start_line: span.start_line,
        end_line: span.end_line,
        body: span.body,
    }))
}

// ============ POST /tools/graph/neighbors ============

#[derive(Deserialize)]
struct GraphNeighborsRequest {
    entity_id: String,
    #[serde(default = "default_graph_depth")]
    max_depth: usize,
    #[serde(default)]
    direction: GraphDirection,
}

fn default_graph_depth() -> usize {
    2
}

#[derive(Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum GraphDirection {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

impl From<GraphDirection> for Direction {
    fn from(d: GraphDirection) -> Self {
        match d {
            GraphDirection::Outgoing => Direction::Outgoing,
            GraphDirection::Incoming => Direction::Incoming,
            GraphDirection::Both => Direction::Both,
        }
    }
}

#[derive(Serialize)]
struct NeighborItem {
    entity_id: String,
    name: String,
    file_path: String,
    relation: String,
    depth: usize,
}

#[derive(Serialize)]
struct GraphNeighborsResponse {
    neighbors: Vec<NeighborItem>,
}

/// Handler for `POST /tools/graph/neighbors`. Loads the graph from the
/// catalog fresh on every call (simplicity over a cached singleton; the
/// graph is cheap to rebuild for typical repo sizes).
async fn handle_graph_neighbors(
    State(state): State<AppState>,
    Json(req): Json<GraphNeighborsRequest>,
) -> Result<Json<GraphNeighborsResponse>, AppError> {
    if req.entity_id.trim().is_empty() {
        return Err(bad_request("entity_id must not be empty"));
    }

    let graph = GraphStore::load(&state.catalog)
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    if graph.entity(&req.entity_id).is_none() {
        return Err(not_found(format!("no entity with id {}", req.entity_id)));
    }

    let neighbors = graph
        .get_neighbors(&req.entity_id, req.max_depth, req.direction.into())
        .into_iter()
        .map(|(entity, relation, depth)| NeighborItem {
            entity_id: entity.id.clone(),
            name: entity.name.clone(),
            file_path: entity.file_path.clone(),
            relation: relation.as_db_str().to_string(),
            depth,
        })
        .collect();

    Ok(Json(GraphNeighborsResponse { neighbors }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
