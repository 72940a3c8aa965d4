use alarmcall_core::engine::Runner;
use alarmcall_core::errors::RunError;
use alarmcall_core::model::{RunSummary, UncallableAlarm};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

const DEFAULT_UNCALLABLE_LIMIT: u32 = 50;
const MAX_UNCALLABLE_LIMIT: u32 = 500;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error("Store error: {0:#}")]
    Store(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
}

pub fn router(runner: Arc<Runner>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/trigger-alarm", post(trigger_alarm))
        .route("/uncallable", get(list_uncallable))
        .with_state(AppState { runner })
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn trigger_alarm(State(state): State<AppState>) -> Result<Json<RunSummary>, ApiError> {
    tracing::info!(event = "trigger_received", source = "http");
    let summary = state.runner.run_once().await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
struct UncallableQuery {
    limit: Option<u32>,
}

async fn list_uncallable(
    State(state): State<AppState>,
    Query(q): Query<UncallableQuery>,
) -> Result<Json<Vec<UncallableAlarm>>, ApiError> {
    let Some(ledger) = &state.runner.ledger else {
        return Ok(Json(Vec::new()));
    };
    let limit = q
        .limit
        .unwrap_or(DEFAULT_UNCALLABLE_LIMIT)
        .min(MAX_UNCALLABLE_LIMIT);
    let rows = ledger.recent_uncallable(limit).map_err(ApiError::Store)?;
    Ok(Json(rows))
}

pub async fn serve<F>(runner: Arc<Runner>, bind: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind).await?;
    tracing::info!(event = "http_listening", addr = %listener.local_addr()?);
    axum::serve(listener, router(runner))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
