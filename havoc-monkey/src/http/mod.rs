//! HTTP endpoints for havoc-monkey.
//!
//! Read-only views of the engine plus two writes: a manual single-cycle
//! trigger and telemetry ingest. There is no pause/resume.

pub mod health;
mod metrics;

use crate::engine::Engine;
use crate::scheduler::spawn_trigger;
use crate::telemetry::{ChaosEvent, Observation, TelemetrySnapshot};
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use havoc_core::{ActionKind, ChangeRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

pub use health::HealthStatus;

/// Ledger records returned when no limit is given.
pub const DEFAULT_LEDGER_LIMIT: usize = 20;

/// Build the HTTP router with all endpoints.
pub fn build_router(engine: Arc<Engine>, ingest: mpsc::Sender<Observation>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/ledger", get(ledger_handler))
        .route("/events", get(events_handler))
        .route("/telemetry", get(telemetry_handler).post(ingest_handler))
        .route("/trigger/:kind", post(trigger_handler))
        .layer(Extension(engine))
        .layer(Extension(ingest))
}

/// Serve the router until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// `?limit=N` for the ledger view.
#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    /// Maximum records returned.
    pub limit: Option<usize>,
}

async fn ledger_handler(
    Extension(engine): Extension<Arc<Engine>>,
    Query(query): Query<LedgerQuery>,
) -> Json<Vec<ChangeRecord>> {
    Json(engine.ledger_tail(query.limit.unwrap_or(DEFAULT_LEDGER_LIMIT)))
}

async fn events_handler(Extension(engine): Extension<Arc<Engine>>) -> Json<Vec<ChaosEvent>> {
    Json(engine.telemetry().events())
}

async fn telemetry_handler(Extension(engine): Extension<Arc<Engine>>) -> Json<TelemetrySnapshot> {
    Json(engine.telemetry().snapshot())
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

fn api_error(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ApiError {
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// Accepted trigger.
#[derive(Debug, Serialize)]
struct Accepted {
    accepted: ActionKind,
}

async fn trigger_handler(
    Extension(engine): Extension<Arc<Engine>>,
    Path(kind): Path<String>,
) -> Response {
    let kind: ActionKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, e),
    };

    match spawn_trigger(engine, kind) {
        Ok(_) => (StatusCode::ACCEPTED, Json(Accepted { accepted: kind })).into_response(),
        Err(e) => api_error(StatusCode::CONFLICT, e),
    }
}

async fn ingest_handler(
    Extension(ingest): Extension<mpsc::Sender<Observation>>,
    Json(observation): Json<Observation>,
) -> Response {
    match ingest.try_send(observation) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(mpsc::error::TrySendError::Full(_)) => {
            api_error(StatusCode::SERVICE_UNAVAILABLE, "telemetry buffer full")
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            api_error(StatusCode::SERVICE_UNAVAILABLE, "telemetry ingest stopped")
        }
    }
}
