//! HTTP server exposing the yield monitor to a dashboard.
//!
//! This module provides a thin HTTP layer over [`YieldService`]:
//! - Counts, trend and combined stats for charts
//! - Full-history CSV export
//! - Log reset
//!
//! # Architecture
//!
//! ```text
//! Dashboard ──→ GET /api/stats ──→ YieldService ──→ snapshot ──→ aggregation
//!           ──→ POST /api/reset ─┘        ↑
//!                                  Simulator (writer)
//! ```

use crate::core::{TrendError, TrendPoint, YieldCounts};
use crate::export;
use crate::service::{ServiceError, YieldService, YieldStats};
use crate::store::{Record, SnapshotOrder, StoreError};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub type SharedService = Arc<YieldService>;

/// Trend query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct TrendQuery {
    pub window_size: Option<i64>,
    pub recent_limit: Option<i64>,
    /// Reverse points for a newest-first display
    #[serde(default)]
    pub newest_first: bool,
}

/// History query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    #[serde(default)]
    pub order: SnapshotOrder,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Reset response
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(err: ServiceError) -> ApiError {
    let (status, code) = match &err {
        ServiceError::Trend(TrendError::InvalidParameter { .. }) => {
            (StatusCode::BAD_REQUEST, "INVALID_PARAMETER")
        }
        ServiceError::Store(StoreError::StorageUnavailable { .. }) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_UNAVAILABLE")
        }
        ServiceError::Export(_) => (StatusCode::INTERNAL_SERVER_ERROR, "EXPORT_FAILED"),
    };

    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: code.to_string(),
        }),
    )
}

/// Run a service call on the blocking pool; storage access holds a mutex
/// and does synchronous SQLite I/O.
async fn blocking<T, F>(service: SharedService, call: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&YieldService) -> Result<T, ServiceError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || call(&service)).await {
        Ok(result) => result.map_err(error_response),
        Err(e) => {
            tracing::error!("Service task failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "service task failed".to_string(),
                    code: "INTERNAL".to_string(),
                }),
            ))
        }
    }
}

/// Convert an optional signed query value into a positive count.
fn positive(name: &'static str, value: Option<i64>) -> Result<Option<usize>, ApiError> {
    match value {
        None => Ok(None),
        Some(v) if v > 0 => Ok(Some(usize::try_from(v).unwrap_or(usize::MAX))),
        Some(_) => Err(error_response(ServiceError::Trend(
            TrendError::InvalidParameter {
                name,
                reason: "must be positive",
            },
        ))),
    }
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/yield
async fn yield_counts(
    State(service): State<SharedService>,
) -> Result<Json<YieldCounts>, ApiError> {
    blocking(service, |s| s.get_counts()).await.map(Json)
}

/// GET /api/stats
async fn stats(
    State(service): State<SharedService>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<YieldStats>, ApiError> {
    let window_size = positive("window_size", query.window_size)?;
    let recent_limit = positive("recent_limit", query.recent_limit)?;

    let mut stats =
        blocking(service, move |s| s.get_stats(window_size, recent_limit)).await?;
    if query.newest_first {
        stats.trend.reverse();
    }
    Ok(Json(stats))
}

/// GET /api/trend
async fn trend(
    State(service): State<SharedService>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Vec<TrendPoint>>, ApiError> {
    let window_size = positive("window_size", query.window_size)?;
    let recent_limit = positive("recent_limit", query.recent_limit)?;

    let mut points =
        blocking(service, move |s| s.get_trend(window_size, recent_limit)).await?;
    // Display order only; the engine always returns oldest first.
    if query.newest_first {
        points.reverse();
    }
    Ok(Json(points))
}

/// GET /api/history
async fn history(
    State(service): State<SharedService>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let limit = positive("limit", query.limit)?;
    let order = query.order;
    let records = blocking(service, move |s| Ok(s.log().snapshot(order, limit)?)).await?;
    Ok(Json(records))
}

/// GET /api/export
///
/// Full history as a CSV attachment.
async fn export_report(State(service): State<SharedService>) -> Result<Response, ApiError> {
    let csv = blocking(service, |s| s.export_csv()).await?;
    let filename = export::report_filename(Utc::now());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        csv,
    )
        .into_response())
}

/// POST /api/reset
async fn reset(State(service): State<SharedService>) -> Result<Json<MessageResponse>, ApiError> {
    blocking(service, |s| s.reset_all()).await?;
    Ok(Json(MessageResponse {
        message: "Database reset successful".to_string(),
    }))
}

/// Build the router.
pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/yield", get(yield_counts))
        .route("/api/stats", get(stats))
        .route("/api/trend", get(trend))
        .route("/api/history", get(history))
        .route("/api/export", get(export_report))
        .route("/api/reset", post(reset))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(service)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    service: SharedService,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(service);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Yield monitor server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
