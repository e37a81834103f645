//! Health check endpoint.

use crate::engine::Engine;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Engine version.
    pub version: String,
    /// Run state (running, cancelling, stopped).
    pub state: String,
    /// Devices in the fleet.
    pub devices: usize,
    /// Ledger records so far.
    pub ledger_records: usize,
    /// Devices with an open session.
    pub open_sessions: usize,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
pub async fn health_handler(Extension(engine): Extension<Arc<Engine>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        state: engine.state().as_str().to_string(),
        devices: engine.fleet().len(),
        ledger_records: engine.ledger_len(),
        open_sessions: engine.open_session_count(),
        uptime_seconds: engine.uptime().as_secs(),
    })
}
