//! HTTP transport: `POST /process` takes a command batch, returns the
//! resolved print targets.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::consts::{DEFAULT_BIND, DEFAULT_REQUEST_TIMEOUT, PROCESS_PATH};
use crate::error::{EvalError, ValidationError};
use crate::orchestrator::Executor;
use crate::protocol::{ErrorBody, ProcessResponse, RawCommand, parse_batch};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Deadline for one batch, from parsing to the last value read.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080))),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Clone)]
struct AppState {
    executor: Arc<dyn Executor>,
    request_timeout: Duration,
}

/// Everything a request can fail with, mapped onto a status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Malformed(#[from] JsonRejection),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("batch did not finish within {0:?}")]
    Timeout(Duration),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Malformed(rejection) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new("invalid_request", rejection.body_text()),
            ),
            ApiError::Invalid(err) => (StatusCode::BAD_REQUEST, ErrorBody::from(err)),
            ApiError::Eval(err) => (StatusCode::UNPROCESSABLE_ENTITY, ErrorBody::from(err)),
            ApiError::Timeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorBody::new("timeout", self.to_string()),
            ),
        };
        debug!(status = %status, error = %body.message, "request rejected");
        (status, Json(body)).into_response()
    }
}

pub fn router(executor: Arc<dyn Executor>, request_timeout: Duration) -> Router {
    Router::new()
        .route(PROCESS_PATH, post(process))
        .with_state(AppState {
            executor,
            request_timeout,
        })
        .layer(TraceLayer::new_for_http())
}

/// Serve on an already bound listener until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    executor: Arc<dyn Executor>,
    request_timeout: Duration,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(executor, request_timeout))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn process(
    State(state): State<AppState>,
    payload: Result<Json<Vec<RawCommand>>, JsonRejection>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let Json(commands) = payload?;
    let batch = parse_batch(&commands)?;

    // Cancels in-flight sentences if the deadline drops the future below.
    let token = CancellationToken::new();
    let _guard = token.clone().drop_guard();

    let items = tokio::time::timeout(state.request_timeout, state.executor.run(&token, &batch))
        .await
        .map_err(|_| ApiError::Timeout(state.request_timeout))??;

    Ok(Json(ProcessResponse { items }))
}
