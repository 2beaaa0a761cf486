//! JSON HTTP API for the browser extension.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/health` | Health check (returns version) |
//! | `POST` | `/api/errors` | Submit `{ "errorData": ErrorReport }`, returns the combined response |
//! | `GET`  | `/api/errors` | Recently explained errors, newest first |
//! | `GET`  | `/api/errors/{id}` | One combined response by id |
//! | `GET`  | `/api/links?query=` | Ranked and manually submitted links for a query |
//! | `POST` | `/api/links` | Submit `{ "url", "title", "errorQuery" }` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Invalid error data" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `rate_limited` (429),
//! `internal` (500). Internal errors carry a `detail` field outside
//! production.
//!
//! # Rate Limiting
//!
//! The `/api/errors` and `/api/links` routes share one token bucket
//! configured by `[rate_limit]`. The health check is never limited.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use console_whisperer_core::models::{
    CombinedResponse, ErrorReport, RankedLink, RecentErrorSummary,
};

use crate::config::Config;
use crate::error::WhisperError;
use crate::ratelimit::RateLimiter;
use crate::service::{LinkSubmission, Whisperer};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    whisperer: Arc<Whisperer>,
    rate_limiter: Option<RateLimiter>,
    /// Include internal error details in responses.
    expose_details: bool,
}

/// Starts the HTTP server with collaborators built from config.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let whisperer = Whisperer::from_config(config)?;
    run_server_with_whisperer(config, Arc::new(whisperer)).await
}

/// Starts the HTTP server around an existing pipeline.
///
/// Used by tests and embedders that supply their own explainer, search
/// sources, or cache store.
pub async fn run_server_with_whisperer(
    config: &Config,
    whisperer: Arc<Whisperer>,
) -> anyhow::Result<()> {
    let app = router(config, whisperer)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router.
pub fn router(config: &Config, whisperer: Arc<Whisperer>) -> anyhow::Result<Router> {
    let state = AppState {
        whisperer,
        rate_limiter: RateLimiter::from_config(&config.rate_limit),
        expose_details: !config.server.is_production(),
    };

    Ok(Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/errors", get(handle_list_errors).post(handle_submit_error))
        .route("/api/errors/{id}", get(handle_get_error))
        .route("/api/links", get(handle_get_links).post(handle_submit_link))
        .fallback(handle_not_found)
        .layer(cors_layer(&config.server.cors_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o)
                .map_err(|_| anyhow::anyhow!("invalid CORS origin: {}", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
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
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    detail: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                detail: self.detail,
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
        detail: None,
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
        detail: None,
    }
}

fn too_many_requests() -> AppError {
    AppError {
        status: StatusCode::TOO_MANY_REQUESTS,
        code: "rate_limited".to_string(),
        message: "Too many requests, please try again later.".to_string(),
        detail: None,
    }
}

fn internal_error(err: &anyhow::Error, expose_details: bool) -> AppError {
    tracing::error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: "Something went wrong".to_string(),
        detail: expose_details.then(|| format!("{:#}", err)),
    }
}

impl AppState {
    fn map_error(&self, err: WhisperError) -> AppError {
        match err {
            WhisperError::InvalidInput(message) => bad_request(message),
            WhisperError::NotFound(message) => not_found(message),
            WhisperError::Internal(e) => internal_error(&e, self.expose_details),
        }
    }

    async fn check_rate_limit(&self) -> Result<(), AppError> {
        if let Some(limiter) = &self.rate_limiter {
            if !limiter.acquire().await {
                tracing::warn!("rate limit exceeded");
                return Err(too_many_requests());
            }
        }
        Ok(())
    }
}

// ============ GET /api/health ============

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

// ============ /api/errors ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitErrorRequest {
    error_data: Option<ErrorReport>,
}

/// Handler for `POST /api/errors`.
///
/// Returns `400` when the body is not JSON, lacks `errorData`, or carries
/// no message.
async fn handle_submit_error(
    State(state): State<AppState>,
    body: Result<Json<SubmitErrorRequest>, JsonRejection>,
) -> Result<Json<CombinedResponse>, AppError> {
    state.check_rate_limit().await?;

    let report = body
        .ok()
        .and_then(|Json(request)| request.error_data)
        .ok_or_else(|| bad_request("Invalid error data"))?;

    let response = state
        .whisperer
        .submit_error(report)
        .await
        .map_err(|e| state.map_error(e))?;
    Ok(Json(response))
}

#[derive(Serialize)]
struct ErrorListResponse {
    errors: Vec<RecentErrorSummary>,
}

async fn handle_list_errors(
    State(state): State<AppState>,
) -> Result<Json<ErrorListResponse>, AppError> {
    state.check_rate_limit().await?;
    Ok(Json(ErrorListResponse {
        errors: state.whisperer.list_recent_errors().await,
    }))
}

async fn handle_get_error(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CombinedResponse>, AppError> {
    state.check_rate_limit().await?;

    let id: u64 = id
        .parse()
        .map_err(|_| bad_request(format!("Invalid error id: {}", id)))?;
    let response = state
        .whisperer
        .get_error_by_id(id)
        .await
        .map_err(|e| state.map_error(e))?;
    Ok(Json(response))
}

// ============ /api/links ============

#[derive(Deserialize)]
struct LinksQuery {
    query: Option<String>,
}

#[derive(Serialize)]
struct LinksResponse {
    links: Vec<RankedLink>,
}

async fn handle_get_links(
    State(state): State<AppState>,
    Query(params): Query<LinksQuery>,
) -> Result<Json<LinksResponse>, AppError> {
    state.check_rate_limit().await?;

    let query = params.query.unwrap_or_default();
    let links = state
        .whisperer
        .query_links(&query)
        .await
        .map_err(|e| state.map_error(e))?;
    Ok(Json(LinksResponse { links }))
}

#[derive(Serialize)]
struct SubmitLinkResponse {
    success: bool,
}

async fn handle_submit_link(
    State(state): State<AppState>,
    body: Result<Json<LinkSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitLinkResponse>), AppError> {
    state.check_rate_limit().await?;

    let Json(submission) = body.map_err(|_| bad_request("Invalid link data"))?;
    state
        .whisperer
        .submit_link(&submission)
        .await
        .map_err(|e| state.map_error(e))?;
    Ok((StatusCode::CREATED, Json(SubmitLinkResponse { success: true })))
}

async fn handle_not_found() -> AppError {
    not_found("Route not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::DisabledExplainer;
    use console_whisperer_core::store::memory::MemoryStore;

    fn state(expose_details: bool) -> AppState {
        let whisperer = Whisperer::with_collaborators(
            &Config::minimal(),
            Arc::new(MemoryStore::new()),
            Arc::new(DisabledExplainer),
            Vec::new(),
        );
        AppState {
            whisperer: Arc::new(whisperer),
            rate_limiter: None,
            expose_details,
        }
    }

    #[test]
    fn test_error_mapping() {
        let state = state(true);
        let err = state.map_error(WhisperError::invalid("bad"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "bad_request");

        let err = state.map_error(WhisperError::not_found("gone"));
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = state.map_error(anyhow::anyhow!("db down").into());
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.detail.as_deref(), Some("db down"));
    }

    #[test]
    fn test_production_hides_details() {
        let state = state(false);
        let err = state.map_error(anyhow::anyhow!("db down").into());
        assert_eq!(err.code, "internal");
        assert!(err.detail.is_none());
        assert!(!err.message.contains("db down"));
    }

    #[test]
    fn test_cors_origins() {
        assert!(cors_layer(&[]).is_ok());
        assert!(cors_layer(&["http://localhost:5173".to_string()]).is_ok());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_rate_limit_check() {
        let mut state = state(true);
        state.rate_limiter = RateLimiter::new(1, std::time::Duration::from_secs(3600));
        assert!(state.check_rate_limit().await.is_ok());
        let err = state.check_rate_limit().await.unwrap_err();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code, "rate_limited");
    }
}
