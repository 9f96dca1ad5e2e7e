//! HTTP boundary: report submission, reads and operator status changes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use vigil_core::{Report, ReportStatus};

use crate::ingest::{IngestError, ReportIntake, ReportSubmission};
use crate::storage::Storage;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    intake: Arc<ReportIntake>,
    storage: Storage,
}

impl AppState {
    /// Create the handler state.
    pub fn new(intake: ReportIntake, storage: Storage) -> Self {
        Self {
            intake: Arc::new(intake),
            storage,
        }
    }
}

const ERROR_CODE_VALIDATION: &str = "validation";
const ERROR_CODE_INVALID_REQUEST: &str = "invalid_request";
const ERROR_CODE_NOT_FOUND: &str = "not_found";
const ERROR_CODE_STORAGE: &str = "storage";

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorInfo,
}

#[derive(Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: ErrorInfo {
                code,
                message: message.into(),
            },
        }),
    )
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, ERROR_CODE_INVALID_REQUEST, msg)
}

fn validation_error(msg: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, ERROR_CODE_VALIDATION, msg)
}

fn not_found(msg: impl Into<String>) -> ApiError {
    api_error(StatusCode::NOT_FOUND, ERROR_CODE_NOT_FOUND, msg)
}

fn storage_error<E: std::fmt::Display>(err: E) -> ApiError {
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        ERROR_CODE_STORAGE,
        format!("Storage error: {}", err),
    )
}

/// Build the API router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/reports", post(create_report).get(list_reports))
        .route("/v1/reports/{id}", get(get_report))
        .route("/v1/reports/{id}/status", put(set_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until a shutdown signal arrives.
pub async fn serve(listen: &str, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid listen address: {}", listen))?;
    let app = router(state);

    info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server shutdown complete");
    Ok(())
}

/// Resolve when SIGINT or SIGTERM is received.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

async fn health(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state.storage.health_check().await.map_err(storage_error)?;
    Ok("OK")
}

async fn create_report(
    State(state): State<AppState>,
    Json(submission): Json<ReportSubmission>,
) -> Result<(StatusCode, Json<Report>), ApiError> {
    match state.intake.submit(submission).await {
        Ok(report) => Ok((StatusCode::CREATED, Json(report))),
        Err(IngestError::Validation(msg)) => Err(validation_error(msg)),
        Err(IngestError::Storage(e)) => Err(storage_error(e)),
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

#[derive(Serialize)]
struct ReportsResponse {
    reports: Vec<Report>,
}

async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ReportsResponse>, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            raw.parse::<ReportStatus>()
                .map_err(|e| bad_request(e.to_string()))?,
        ),
        None => None,
    };

    let reports = state
        .storage
        .list_reports(status)
        .await
        .map_err(storage_error)?;

    Ok(Json(ReportsResponse { reports }))
}

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Report>, ApiError> {
    let report = state
        .storage
        .get_report(&id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found(format!("No report with id {}", id)))?;

    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    status: ReportStatus,
}

async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Report>, ApiError> {
    let updated = state
        .storage
        .update_status(&id, update.status)
        .await
        .map_err(storage_error)?;

    if !updated {
        return Err(not_found(format!("No report with id {}", id)));
    }

    let report = state
        .storage
        .get_report(&id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found(format!("No report with id {}", id)))?;

    Ok(Json(report))
}
