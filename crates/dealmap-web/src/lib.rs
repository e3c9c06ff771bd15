//! HTTP surface: search, map, data freshness, CTA telemetry and serving metrics.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{MatchedPath, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use dealmap_core::query::{MapComplex, MapParams, SearchParams, SearchRow};
use dealmap_core::AuditEvent;
use dealmap_storage::{DealStore, FreshnessReport};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

mod error;
mod metrics;

pub use error::ApiError;
pub use metrics::{MetricsCollector, RouteSnapshot, DEFAULT_LOG_EVERY, DEFAULT_SAMPLE_CAPACITY};

pub const CRATE_NAME: &str = "dealmap-web";
pub const DEFAULT_WEB_PORT: u16 = 8000;

pub const CTA_ACTIONS: [&str; 3] = ["favorite", "alert", "inquiry"];
pub const DEFAULT_CTA_SOURCE: &str = "complex_detail";
const MAX_CTA_SOURCE_CHARS: usize = 40;

#[derive(Clone)]
pub struct AppState {
    /// `None` when no database is configured; data routes answer 503.
    pub store: Option<Arc<dyn DealStore>>,
    pub metrics: Arc<MetricsCollector>,
}

impl AppState {
    pub fn new(store: Option<Arc<dyn DealStore>>) -> Self {
        Self {
            store,
            metrics: Arc::new(MetricsCollector::default()),
        }
    }

    fn store(&self) -> Result<&Arc<dyn DealStore>, ApiError> {
        self.store.as_ref().ok_or(ApiError::StoreUnavailable)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    ok: bool,
    sort: &'static str,
    page: u32,
    size: u32,
    count: usize,
    total_count: i64,
    items: Vec<SearchRow>,
}

#[derive(Debug, Serialize)]
struct MapResponse {
    ok: bool,
    count: usize,
    complexes: Vec<MapComplex>,
}

#[derive(Debug, Serialize)]
struct FreshnessResponse {
    ok: bool,
    #[serde(flatten)]
    report: FreshnessReport,
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    ok: bool,
    routes: Vec<RouteSnapshot>,
}

#[derive(Debug, Serialize)]
struct AckResponse {
    ok: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtaEvent {
    pub action: String,
    pub complex_id: i64,
    pub source: Option<String>,
}

impl CtaEvent {
    /// Validated audit record for this click.
    pub fn into_audit(self) -> Result<AuditEvent, ApiError> {
        if !CTA_ACTIONS.contains(&self.action.as_str()) {
            return Err(ApiError::BadRequest(format!(
                "invalid `action`: expected one of {}",
                CTA_ACTIONS.join(", ")
            )));
        }
        if self.complex_id <= 0 {
            return Err(ApiError::BadRequest("invalid `complexId`: must be positive".into()));
        }
        let source = self.source.unwrap_or_else(|| DEFAULT_CTA_SOURCE.to_string());
        let len = source.chars().count();
        if len == 0 || len > MAX_CTA_SOURCE_CHARS {
            return Err(ApiError::BadRequest(format!(
                "invalid `source`: must be 1-{MAX_CTA_SOURCE_CHARS} characters"
            )));
        }
        Ok(AuditEvent {
            actor_type: "anonymous".to_string(),
            actor_id: None,
            target_type: "complex".to_string(),
            target_id: Some(self.complex_id),
            event_name: format!("cta_click:{}", self.action),
            detail: serde_json::json!({ "source": source }),
        })
    }
}

pub fn app(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .route("/api/search", get(search_handler))
        .route("/api/map/complexes", get(map_handler))
        .route("/api/ops/data-freshness", get(freshness_handler))
        .route("/api/ops/metrics", get(metrics_handler))
        .route("/api/events/cta", post(cta_handler))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn port_from_env() -> u16 {
    std::env::var("DEALMAP_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_WEB_PORT)
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "dealmap web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn track_metrics(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let started = Instant::now();
    let response = next.run(req).await;
    state
        .metrics
        .record(&route, response.status().as_u16(), started.elapsed());
    response
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(params) = params.map_err(|err| ApiError::BadRequest(err.body_text()))?;
    let query = params.validate()?;
    let store = state.store()?;
    let page = store
        .search_complexes(&query, Utc::now().date_naive())
        .await
        .map_err(|err| ApiError::from_store("/api/search", err))?;
    Ok(Json(SearchResponse {
        ok: true,
        sort: query.sort.as_str(),
        page: query.page,
        size: query.size,
        count: page.rows.len(),
        total_count: page.total,
        items: page.rows,
    }))
}

async fn map_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<MapParams>, QueryRejection>,
) -> Result<Json<MapResponse>, ApiError> {
    let Query(params) = params.map_err(|err| ApiError::BadRequest(err.body_text()))?;
    let query = params.validate()?;
    let store = state.store()?;
    let complexes = store
        .map_complexes(&query)
        .await
        .map_err(|err| ApiError::from_store("/api/map/complexes", err))?;
    Ok(Json(MapResponse {
        ok: true,
        count: complexes.len(),
        complexes,
    }))
}

async fn freshness_handler(State(state): State<Arc<AppState>>) -> Result<Json<FreshnessResponse>, ApiError> {
    let store = state.store()?;
    let report = store
        .data_freshness(Utc::now())
        .await
        .map_err(|err| ApiError::from_store("/api/ops/data-freshness", err))?;
    Ok(Json(FreshnessResponse { ok: true, report }))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        ok: true,
        routes: state.metrics.snapshot(),
    })
}

async fn cta_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CtaEvent>, JsonRejection>,
) -> Result<Json<AckResponse>, ApiError> {
    let Json(event) = body.map_err(|err| ApiError::BadRequest(err.body_text()))?;
    let audit = event.into_audit()?;
    let store = state.store()?;
    store
        .record_audit(&audit)
        .await
        .map_err(|err| ApiError::from_store("/api/events/cta", err))?;
    Ok(Json(AckResponse { ok: true }))
}
