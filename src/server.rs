//! HTTP front end: range streaming, thumbnails and the results API.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::common::{AnalysisBatch, BatchSummary, TrapError, VideoResult};
use crate::config::ServerConfig;
use crate::resolver::FileResolver;
use crate::streamer::{stream_file, unsatisfied_range};
use crate::thumbnail::generate_thumbnail;

/// Shared, read-only server state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub resolver: Arc<FileResolver>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let resolver = FileResolver::with_preferred(config.video_dir.as_deref());
        Self::with_resolver(config, resolver)
    }

    pub fn with_resolver(config: ServerConfig, resolver: FileResolver) -> Self {
        Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
        }
    }
}

/// Errors as seen by HTTP clients
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Range not satisfiable")]
    RangeNotSatisfiable { size: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TrapError> for ApiError {
    fn from(e: TrapError) -> Self {
        match e {
            TrapError::RangeNotSatisfiable { size, .. } => ApiError::RangeNotSatisfiable { size },
            e if e.is_not_found() => ApiError::NotFound(e.to_string()),
            e => ApiError::Internal(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, Json(ErrorResponse { detail })).into_response(),
            ApiError::RangeNotSatisfiable { size } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, unsatisfied_range(size))],
                Json(ErrorResponse { detail }),
            )
                .into_response(),
            ApiError::Internal(_) => {
                error!("{}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { detail })).into_response()
            }
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stream/:filename", get(stream_video))
        .route("/thumbnail/:filename", get(thumbnail))
        .route("/api/summary", get(api_summary))
        .route("/api/video/:filename", get(api_video))
        .route("/api/search", get(api_search))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl+C
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;
    let addr = config.bind_address();
    let state = AppState::new(config);
    info!("Search directories: {:?}", state.resolver.search_dirs());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

async fn health() -> &'static str {
    "ok"
}

async fn locate(state: &AppState, filename: String) -> ApiResult<PathBuf> {
    let resolver = Arc::clone(&state.resolver);
    tokio::task::spawn_blocking(move || resolver.locate(&filename))
        .await
        .map_err(|e| ApiError::Internal(format!("lookup task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Stream a video with range request support
async fn stream_video(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = locate(&state, filename).await?;

    let range_header = match headers.get(header::RANGE).map(|v| v.to_str()) {
        None => None,
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => {
            let size = tokio::fs::metadata(&path).await.map_err(TrapError::from)?.len();
            return Err(ApiError::RangeNotSatisfiable { size });
        }
    };
    let response = stream_file(&path, range_header, state.config.chunk_size).await?;
    Ok(response.into_response())
}

/// Middle-frame JPEG thumbnail of a video
async fn thumbnail(State(state): State<AppState>, UrlPath(filename): UrlPath<String>) -> ApiResult<Response> {
    let path = locate(&state, filename).await?;
    let spec = state.config.thumbnail;

    let jpeg = tokio::task::spawn_blocking(move || generate_thumbnail(&path.to_string_lossy(), spec))
        .await
        .map_err(|e| ApiError::Internal(format!("thumbnail task failed: {}", e)))??;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        jpeg,
    )
        .into_response())
}

async fn load_batch(state: &AppState) -> ApiResult<AnalysisBatch> {
    let path = state.config.results_file.clone();
    tokio::task::spawn_blocking(move || AnalysisBatch::load(&path))
        .await
        .map_err(|e| ApiError::Internal(format!("results task failed: {}", e)))?
        .map_err(ApiError::from)
}

#[derive(Serialize)]
struct SummaryResponse {
    #[serde(flatten)]
    summary: BatchSummary,
    all_results: Vec<VideoResult>,
}

async fn api_summary(State(state): State<AppState>) -> ApiResult<Json<SummaryResponse>> {
    let batch = load_batch(&state).await?;
    let summary = BatchSummary::from_results(batch.results());
    Ok(Json(SummaryResponse {
        summary,
        all_results: batch.into_results(),
    }))
}

async fn api_video(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> ApiResult<Json<VideoResult>> {
    let batch = load_batch(&state).await?;
    batch
        .find_by_filename(&filename)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no results for {}", filename)))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub animal: Option<String>,
}

/// Results whose filename contains `q` and, if given, with a detection labelled `animal`
pub fn search_results(results: Vec<VideoResult>, params: &SearchParams) -> Vec<VideoResult> {
    let query = params.q.as_deref().unwrap_or("").to_lowercase();
    let animal = params.animal.as_deref().filter(|a| !a.is_empty());

    results
        .into_iter()
        .filter(|r| query.is_empty() || r.filename.to_lowercase().contains(&query))
        .filter(|r| animal.map_or(true, |a| r.detections.iter().any(|d| d.class_label == a)))
        .collect()
}

async fn api_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<VideoResult>>> {
    let batch = load_batch(&state).await?;
    Ok(Json(search_results(batch.into_results(), &params)))
}
