//! Axum JSON API for RevHub.

mod error;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use revhub_query::{
    analytics_insights, analytics_overview, property_comparison, property_performance,
    property_summaries, property_trends, ApprovalGate, ComparisonParams, CredentialCheck,
    ReviewQueryParams, ReviewQueryService, SharedSecretVerifier, TrendParams,
};
use revhub_storage::ReviewRepository;
use revhub_sync::{google_sync_from_config, open_repository, AppConfig, GoogleSync, HostawaySeeder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

pub use error::ApiError;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Clone)]
pub struct AppState {
    pub reviews: ReviewQueryService,
    pub approvals: ApprovalGate,
    pub google: Arc<GoogleSync>,
    pub repo: Arc<dyn ReviewRepository>,
}

impl AppState {
    pub fn new(config: &AppConfig, repo: Arc<dyn ReviewRepository>) -> anyhow::Result<Self> {
        let seeder = Arc::new(HostawaySeeder::new(
            repo.clone(),
            config.hostaway_seed_path.clone(),
        ));
        let verifier = Arc::new(SharedSecretVerifier::new(config.admin_key.clone()));
        Ok(Self {
            reviews: ReviewQueryService::new(repo.clone(), seeder),
            approvals: ApprovalGate::new(repo.clone(), verifier),
            google: Arc::new(google_sync_from_config(config, repo.clone())?),
            repo,
        })
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/reviews", get(search_reviews_handler))
        .route("/api/reviews/hostaway", get(hostaway_reviews_handler))
        .route("/api/admin/authenticate", post(authenticate_handler))
        .route("/api/admin/reviews/{id}/approve", patch(approve_handler))
        .route("/api/google/sync", post(google_sync_handler))
        .route("/api/properties", get(properties_handler))
        .route("/api/properties/{id}/performance", get(performance_handler))
        .route("/api/properties/{id}/trends", get(trends_handler))
        .route("/api/analytics/overview", get(overview_handler))
        .route("/api/analytics/comparison", get(comparison_handler))
        .route("/api/analytics/insights", get(insights_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let repo = open_repository(&config).await?;
    let state = AppState::new(&config, repo)?;
    let listener = TcpListener::bind((config.web_host.as_str(), config.web_port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.web_host, config.web_port))?;
    info!(addr = %listener.local_addr()?, "revhub api listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(AppConfig::from_env()?).await
}

#[derive(Serialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(flatten)]
    body: T,
}

fn envelope<T: Serialize>(body: T) -> Response {
    Json(Envelope { ok: true, body }).into_response()
}

fn admin_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(ADMIN_KEY_HEADER).and_then(|v| v.to_str().ok())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn hostaway_reviews_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReviewQueryParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let listing = state.reviews.hostaway_reviews(params).await?;
    Ok(envelope(listing))
}

async fn search_reviews_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReviewQueryParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let listing = state.reviews.search_reviews(params).await?;
    Ok(envelope(listing))
}

async fn authenticate_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let error = match state.approvals.check(admin_key(&headers)) {
        CredentialCheck::Valid => {
            return Json(json!({ "ok": true, "message": "Authentication successful" }))
                .into_response()
        }
        CredentialCheck::Missing => "Admin key required",
        CredentialCheck::Invalid => "Invalid admin key",
    };
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "ok": false, "error": error })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ApproveBody {
    approved: bool,
}

async fn approve_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<ApproveBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let presented = admin_key(&headers);
    state.approvals.authorize(presented)?;
    let Json(body) = body.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let change = state
        .approvals
        .set_approval(presented, &id, body.approved)
        .await?;
    Ok(envelope(change))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleSyncBody {
    listing_id: Option<String>,
    place_id: Option<String>,
}

async fn google_sync_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GoogleSyncBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    if !state.google.is_configured() {
        return Err(ApiError::bad_request("Google Places API key is not configured"));
    }
    let Json(body) = body.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
    if blank(&body.listing_id) || blank(&body.place_id) {
        return Err(ApiError::bad_request("listingId and placeId are required"));
    }
    let raw_id = body.listing_id.unwrap_or_default();
    let listing_id = Uuid::parse_str(raw_id.trim())
        .map_err(|_| ApiError::bad_request(format!("listingId is not a valid id: `{raw_id}`")))?;

    let report = state
        .google
        .sync(listing_id, body.place_id.as_deref().unwrap_or_default())
        .await?;
    if report.ok {
        return Ok(Json(report).into_response());
    }
    Ok((
        StatusCode::BAD_GATEWAY,
        Json(json!({
            "ok": false,
            "error": report.message,
            "message": report.message,
            "reviews": report.reviews,
        })),
    )
        .into_response())
}

async fn properties_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let properties = property_summaries(state.repo.as_ref()).await?;
    Ok(envelope(json!({ "properties": properties })))
}

async fn performance_handler(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = id.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let performance = property_performance(state.repo.as_ref(), id).await?;
    Ok(envelope(json!({ "performance": performance })))
}

async fn trends_handler(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<TrendParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = id.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let Query(params) = query.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let trends = property_trends(state.repo.as_ref(), id, params.period()?).await?;
    Ok(envelope(json!({ "trends": trends })))
}

async fn overview_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let overview = analytics_overview(state.repo.as_ref()).await?;
    Ok(envelope(json!({ "overview": overview })))
}

async fn comparison_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ComparisonParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let comparison = property_comparison(state.repo.as_ref(), &params.listing_ids()?).await?;
    Ok(envelope(json!({ "comparison": comparison })))
}

async fn insights_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let insights = analytics_insights(state.repo.as_ref()).await?;
    Ok(envelope(json!({ "insights": insights })))
}
