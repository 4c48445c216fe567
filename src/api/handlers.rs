//! API route handlers
//!
//! Thin adapters over [`PipelineHandle`]: the serial link for port listing and
//! (re)connect, the control state for tare, and the cycle store for
//! historical queries.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::acquisition::ConnectRequest;
use crate::config::defaults::MAX_TARE_STEPS;
use crate::pipeline::{LinkState, PipelineHandle, PipelineStats};
use crate::types::Device;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct DashboardState {
    pub pipeline: PipelineHandle,
    started: Instant,
}

impl DashboardState {
    pub fn new(pipeline: PipelineHandle) -> Self {
        Self { pipeline, started: Instant::now() }
    }
}

// ============================================================================
// Serial Link
// ============================================================================

/// GET /api/v1/serial_ports - Port names a connect request may target
pub async fn list_serial_ports(State(state): State<DashboardState>) -> Response {
    match state.pipeline.link.available_ports().await {
        Ok(ports) => (StatusCode::OK, Json(ports)).into_response(),
        Err(e) => {
            tracing::error!("Failed to list serial ports: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to list serial ports: {}", e))
                .into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub port_name: String,
    pub baud_rate: u32,
    pub generation: u64,
}

/// POST /api/v1/connect - (Re)connect the serial link
///
/// A failed open has already been published as an error status by the link.
pub async fn connect(
    State(state): State<DashboardState>,
    Json(request): Json<ConnectRequest>,
) -> Response {
    match state.pipeline.link.connect(request.clone()).await {
        Ok(generation) => (
            StatusCode::OK,
            Json(ConnectResponse {
                port_name: request.port_name,
                baud_rate: request.baud_rate,
                generation,
            }),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to connect: {}", e))
            .into_response(),
    }
}

// ============================================================================
// Tare
// ============================================================================

/// Tare offset in encoder steps
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TareValue {
    pub value: i64,
}

/// GET /api/v1/tare
pub async fn get_tare(State(state): State<DashboardState>) -> Json<TareValue> {
    Json(TareValue { value: state.pipeline.control.tare() })
}

/// POST /api/v1/tare
pub async fn set_tare(
    State(state): State<DashboardState>,
    Json(tare): Json<TareValue>,
) -> Response {
    if tare.value.unsigned_abs() > MAX_TARE_STEPS.unsigned_abs() {
        tracing::warn!(steps = tare.value, "Rejected out-of-range tare offset");
        return (
            StatusCode::BAD_REQUEST,
            format!("tare must be within ±{} steps", MAX_TARE_STEPS),
        )
            .into_response();
    }

    state.pipeline.control.set_tare(tare.value);
    tracing::info!(steps = tare.value, "Tare offset updated");
    StatusCode::OK.into_response()
}

// ============================================================================
// Historical Data
// ============================================================================

/// Inclusive corrected-time range in microseconds
#[derive(Debug, Deserialize)]
pub struct HistoricalQuery {
    pub start: u64,
    pub end: u64,
}

/// GET /api/v1/historical_data?start=&end= - Stored cycle records in range
pub async fn get_historical_data(
    State(state): State<DashboardState>,
    Query(range): Query<HistoricalQuery>,
) -> Response {
    if range.start > range.end {
        return (StatusCode::BAD_REQUEST, "start must not be after end").into_response();
    }

    match state.pipeline.store.query(range.start, range.end) {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => {
            tracing::error!("Historical query failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database query failed").into_response()
        }
    }
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub device: Device,
    #[serde(flatten)]
    pub link: LinkState,
    pub subscribers: usize,
    pub stored_records: usize,
    pub stats: PipelineStats,
}

/// GET /api/v1/status - Serial link state and pipeline counters
pub async fn get_status(State(state): State<DashboardState>) -> Json<StatusResponse> {
    let pipeline = &state.pipeline;
    Json(StatusResponse {
        device: Device::Serial,
        link: pipeline.link.state().await,
        subscribers: pipeline.hub.subscriber_count(),
        stored_records: pipeline.store.len(),
        stats: pipeline.counters.snapshot(),
    })
}

// ============================================================================
// Legacy Endpoints
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LegacyHealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// GET /health - Liveness check
pub async fn legacy_health_check(State(state): State<DashboardState>) -> Json<LegacyHealthResponse> {
    Json(LegacyHealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
    })
}
