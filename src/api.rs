use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::history::{ReportLog, ReportSummary};
use crate::intel::aggregator::{AggregatorStatus, CollectRequest};
use crate::intel::{Aggregator, CollectError, IntelReport, SourceId};

const DEFAULT_TRENDING_LIMIT: usize = 10;
const MAX_TRENDING_LIMIT: usize = 100;
const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub history: Arc<ReportLog>,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>, history: Arc<ReportLog>) -> Self {
        Self {
            aggregator,
            history,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/collect", post(collect))
        .route("/status", get(status))
        .route("/trending", get(trending))
        .route("/debug/history", get(debug_history))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Invalid input surfaces as `400 {"error": "..."}`.
pub struct ApiError(CollectError);

impl From<CollectError> for ApiError {
    fn from(e: CollectError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CollectBody {
    #[serde(default)]
    topics: Vec<String>,
    /// Missing means every registered source.
    #[serde(default)]
    sources: Option<Vec<String>>,
    #[serde(default)]
    deadline_ms: Option<u64>,
}

async fn collect(
    State(state): State<AppState>,
    Json(body): Json<CollectBody>,
) -> Result<Json<IntelReport>, ApiError> {
    let sources: Vec<SourceId> = match body.sources {
        Some(list) => list.into_iter().map(SourceId::new).collect(),
        None => state.aggregator.source_ids(),
    };
    let req = CollectRequest {
        topics: body.topics,
        sources,
        deadline_ms: body.deadline_ms,
    };
    let report = state.aggregator.collect(&req).await?;
    state.history.push(&report);
    Ok(Json(report))
}

async fn status(State(state): State<AppState>) -> Json<AggregatorStatus> {
    Json(state.aggregator.status())
}

#[derive(Debug, Deserialize)]
struct TrendingQuery {
    source: Option<String>,
    limit: Option<usize>,
}

async fn trending(
    State(state): State<AppState>,
    Query(q): Query<TrendingQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let source = q
        .source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SourceId::new);
    let limit = q
        .limit
        .unwrap_or(DEFAULT_TRENDING_LIMIT)
        .clamp(1, MAX_TRENDING_LIMIT);
    let lines = state.aggregator.trending(source.as_ref(), limit).await?;
    Ok(Json(lines))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn debug_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Json<Vec<ReportSummary>> {
    Json(
        state
            .history
            .snapshot_last_n(q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)),
    )
}
