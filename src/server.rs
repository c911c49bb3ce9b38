//! HTTP API server.
//!
//! Thin JSON plumbing over the lead store, the monitoring scheduler, and the
//! event fan-out. Handlers never call the source or scoring providers
//! directly except for the ad-hoc search and analyze endpoints.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/health` | Liveness, version, monitoring flags |
//! | `GET`  | `/api/leads` | Analyzed leads, `?status=&minScore=&limit=` |
//! | `GET`  | `/api/leads/{id}` | One lead |
//! | `PATCH` | `/api/leads/{id}` | Set workflow status and notes |
//! | `POST` | `/api/leads/bulk-delete` | Delete by filter |
//! | `POST` | `/api/leads/bulk-delete/preview` | Count what a delete would remove |
//! | `GET`  | `/api/stats` | Store stats plus per-status breakdown |
//! | `GET`  | `/api/monitoring/status` | Scheduler status |
//! | `POST` | `/api/monitoring/search` | Request a cycle (returns immediately) |
//! | `GET`/`PATCH` | `/api/monitoring/config` | Read or merge the monitoring config |
//! | `POST` | `/api/search` | Ad-hoc search, not persisted |
//! | `POST` | `/api/analyze` | Ad-hoc batch scoring |
//! | `GET`  | `/api/partitions/{name}` | Partition metadata |
//! | `GET`  | `/api/events` | Server-Sent Events stream of `NEW_LEAD` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid argument: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `upstream_unavailable` (502), `scoring_disabled` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for browser dashboards.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request, State,
    },
    http::{request::Parts, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use leadwatch_core::models::{
    AnalysisResult, DeleteFilter, Item, Lead, LeadEvent, LeadFilter, LeadStatus, StatusBreakdown,
    StoreStats,
};
use leadwatch_core::store::{now_ts, LeadStore};
use leadwatch_core::LeadError;

use crate::config::{ConfigPatch, MonitoringConfig};
use crate::fanout::LeadFanout;
use crate::scheduler::{Monitor, MonitorStatus};
use crate::scoring::{score_batch, Scorer};
use crate::source::{search_many, validate_request, PartitionInfo, SearchOptions, SourceClient};

const DEFAULT_LEAD_LIMIT: usize = 100;
const MAX_LEAD_LIMIT: usize = 1000;
const MAX_ANALYZE_ITEMS: usize = 50;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub store: Arc<dyn LeadStore>,
    pub source: Arc<dyn SourceClient>,
    pub scorer: Arc<dyn Scorer>,
    pub fanout: LeadFanout,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/leads", get(handle_list_leads))
        .route("/api/leads/bulk-delete", post(handle_bulk_delete))
        .route(
            "/api/leads/bulk-delete/preview",
            post(handle_bulk_delete_preview),
        )
        .route(
            "/api/leads/{id}",
            get(handle_get_lead).patch(handle_update_lead),
        )
        .route("/api/stats", get(handle_stats))
        .route("/api/monitoring/status", get(handle_monitoring_status))
        .route("/api/monitoring/search", post(handle_trigger))
        .route(
            "/api/monitoring/config",
            get(handle_get_config).patch(handle_update_config),
        )
        .route("/api/search", post(handle_search))
        .route("/api/analyze", post(handle_analyze))
        .route("/api/partitions/{name}", get(handle_partition))
        .route("/api/events", get(handle_events))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn run_server<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "API server listening");
    // event streams never finish on their own; end them once shutdown starts
    let fanout = state.fanout.clone();
    let shutdown = async move {
        shutdown.await;
        fanout.close();
    };
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
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

fn scoring_disabled() -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "scoring_disabled".to_string(),
        message: "scoring provider is not configured".to_string(),
    }
}

impl From<LeadError> for AppError {
    fn from(err: LeadError) -> Self {
        let status = match err {
            LeadError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            LeadError::NotFound(_) => StatusCode::NOT_FOUND,
            LeadError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            LeadError::ScoringDegraded(_) | LeadError::StorageFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

/// `Json` whose rejection is an [`AppError`] body.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// `Query` whose rejection is an [`AppError`] body.
struct ApiQuery<T>(T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

fn parse_status(raw: &str) -> Result<LeadStatus, AppError> {
    raw.parse::<LeadStatus>().map_err(AppError::from)
}

// ============ GET /api/health ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    version: String,
    monitoring: HealthMonitoring,
    timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthMonitoring {
    cycle_running: bool,
    scoring_enabled: bool,
    subscribers: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        monitoring: HealthMonitoring {
            cycle_running: state.monitor.is_running(),
            scoring_enabled: state.monitor.scoring_enabled(),
            subscribers: state.fanout.subscriber_count(),
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

// ============ Leads ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeadsQuery {
    status: Option<String>,
    min_score: Option<u8>,
    limit: Option<usize>,
    keyword: Option<String>,
    partition: Option<String>,
}

#[derive(Serialize)]
struct LeadsResponse {
    count: usize,
    leads: Vec<Lead>,
}

async fn handle_list_leads(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<LeadsQuery>,
) -> Result<Json<LeadsResponse>, AppError> {
    let status = q.status.as_deref().map(parse_status).transpose()?;
    let filter = LeadFilter {
        status,
        source_keyword: q.keyword,
        partition: q.partition,
        min_score: q.min_score,
        analyzed_only: true,
        limit: Some(q.limit.unwrap_or(DEFAULT_LEAD_LIMIT).min(MAX_LEAD_LIMIT)),
    };
    let leads = state.store.query(&filter).await?;
    Ok(Json(LeadsResponse {
        count: leads.len(),
        leads,
    }))
}

async fn handle_get_lead(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Lead>, AppError> {
    let lead = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| not_found(format!("lead not found: {}", id)))?;
    Ok(Json(lead))
}

#[derive(Deserialize)]
struct UpdateLeadRequest {
    status: String,
    notes: Option<String>,
}

async fn handle_update_lead(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateLeadRequest>,
) -> Result<Json<Lead>, AppError> {
    let status = parse_status(&req.status)?;
    if !state
        .store
        .set_status(&id, status, req.notes.as_deref())
        .await?
    {
        return Err(not_found(format!("lead not found: {}", id)));
    }
    let lead = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| not_found(format!("lead not found: {}", id)))?;
    Ok(Json(lead))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkDeleteRequest {
    min_score: Option<u8>,
    max_age_days: Option<u32>,
    status: Option<String>,
}

impl BulkDeleteRequest {
    fn into_filter(self) -> Result<DeleteFilter, AppError> {
        let filter = DeleteFilter {
            min_score: self.min_score,
            max_age_days: self.max_age_days,
            status: self.status.as_deref().map(parse_status).transpose()?,
        };
        filter.validate()?;
        Ok(filter)
    }
}

async fn handle_bulk_delete(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BulkDeleteRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filter = req.into_filter()?;
    let deleted = state.store.bulk_delete(&filter).await?;
    tracing::info!(deleted, ?filter, "bulk delete");
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

async fn handle_bulk_delete_preview(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BulkDeleteRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filter = req.into_filter()?;
    let count = state.store.preview_bulk_delete(&filter).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

// ============ GET /api/stats ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(flatten)]
    stats: StoreStats,
    by_status: StatusBreakdown,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    Ok(Json(StatsResponse {
        stats: state.store.stats().await?,
        by_status: state.store.status_breakdown().await?,
    }))
}

// ============ Monitoring ============

async fn handle_monitoring_status(
    State(state): State<AppState>,
) -> Result<Json<MonitorStatus>, AppError> {
    Ok(Json(state.monitor.status().await?))
}

async fn handle_trigger(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let already_running = state.monitor.trigger();
    let message = if already_running {
        "a monitoring cycle is already running"
    } else {
        "monitoring cycle requested"
    };
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": message,
            "alreadyRunning": already_running,
        })),
    )
}

async fn handle_get_config(State(state): State<AppState>) -> Json<MonitoringConfig> {
    Json(state.monitor.config())
}

async fn handle_update_config(
    State(state): State<AppState>,
    ApiJson(patch): ApiJson<ConfigPatch>,
) -> Result<Json<MonitoringConfig>, AppError> {
    Ok(Json(state.monitor.update_config(&patch)?))
}

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    keywords: Vec<String>,
    #[serde(flatten)]
    options: SearchOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    count: usize,
    items: Vec<Item>,
    next_cursor: Option<String>,
    prev_cursor: Option<String>,
}

/// One keyword is a paginated search; several are merged without cursors.
async fn handle_search(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.keywords.is_empty() {
        return Err(bad_request("keywords must not be empty"));
    }
    for keyword in &req.keywords {
        validate_request(keyword, &req.options)?;
    }

    if let [keyword] = req.keywords.as_slice() {
        let page = state.source.search(keyword, &req.options).await?;
        return Ok(Json(SearchResponse {
            count: page.items.len(),
            items: page.items,
            next_cursor: page.next_cursor,
            prev_cursor: page.prev_cursor,
        }));
    }

    let items = search_many(state.source.as_ref(), &req.keywords, &req.options).await;
    Ok(Json(SearchResponse {
        count: items.len(),
        items,
        next_cursor: None,
        prev_cursor: None,
    }))
}

// ============ POST /api/analyze ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    items: Vec<Item>,
}

#[derive(Serialize)]
struct AnalyzedItem {
    #[serde(flatten)]
    item: Item,
    analysis: AnalysisResult,
}

async fn handle_analyze(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AnalyzeRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.scorer.is_enabled() {
        return Err(scoring_disabled());
    }
    if req.items.is_empty() || req.items.len() > MAX_ANALYZE_ITEMS {
        return Err(bad_request(format!(
            "items must contain 1-{} entries",
            MAX_ANALYZE_ITEMS
        )));
    }

    let analyzed_at = now_ts();
    let results: Vec<AnalyzedItem> = score_batch(state.scorer.as_ref(), &req.items)
        .await
        .into_iter()
        .map(|(item, score)| AnalyzedItem {
            item,
            analysis: score.analyzed_at(analyzed_at),
        })
        .collect();

    Ok(Json(serde_json::json!({
        "count": results.len(),
        "results": results,
    })))
}

// ============ GET /api/partitions/{name} ============

async fn handle_partition(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<PartitionInfo>, AppError> {
    state
        .source
        .partition_info(&name)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("partition not found: {}", name)))
}

// ============ GET /api/events ============

/// Server-Sent Events stream of qualifying leads.
///
/// The subscription lives inside the stream, so a client disconnect drops it
/// and unsubscribes.
async fn handle_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = state.fanout.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("CONNECTED")
            .data(subscription.id().to_string()));

        while let Some(lead) = subscription.recv().await {
            match Event::default().event(LeadEvent::KIND).json_data(&lead) {
                Ok(event) => yield Ok(event),
                Err(e) => tracing::warn!(id = %lead.item.id, error = %e, "failed to encode lead event"),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
