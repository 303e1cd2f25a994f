use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use campus_shared::errors::AppResult;
use campus_shared::types::api::ApiResponse;
use campus_shared::types::auth::AuthUser;

use crate::sync::SyncEntry;
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub seq: u64,
}

#[derive(Debug, Deserialize)]
pub struct PendingParams {
    pub limit: Option<usize>,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct WatermarkResponse {
    pub device_id: String,
    pub seq: u64,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub entries: Vec<SyncEntry>,
    /// Sequence of the last entry in this page. Ack this value to resume
    /// past the page, even when the backlog exceeded the limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<u64>,
    /// The newest sequence number in the caller's stream; the device has
    /// caught up once its acknowledged watermark reaches this.
    pub latest_seq: u64,
}

// --- Handlers ---

/// POST /sync/devices - register a device cursor; idempotent, an existing
/// watermark is kept
pub async fn register_device(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterDeviceRequest>,
) -> AppResult<Json<ApiResponse<WatermarkResponse>>> {
    state.sync.register(auth_user.id, &req.device_id);
    Ok(Json(ApiResponse::ok(WatermarkResponse {
        device_id: req.device_id,
        seq: 0,
    })))
}

/// DELETE /sync/devices/:device_id
pub async fn unregister_device(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.sync.unregister(auth_user.id, &device_id);
    Ok(Json(ApiResponse::ok(())))
}

/// POST /sync/devices/:device_id/ack - advance the device watermark.
/// The watermark only moves forward; a stale ack is a no-op.
pub async fn acknowledge(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Json(req): Json<AckRequest>,
) -> AppResult<Json<ApiResponse<WatermarkResponse>>> {
    let seq = state.sync.advance(auth_user.id, &device_id, req.seq)?;
    Ok(Json(ApiResponse::ok(WatermarkResponse { device_id, seq })))
}

/// GET /sync/devices/:device_id/pending - replay messages past the device
/// watermark, oldest first. Pure read; the watermark moves only on ack,
/// and a client should ack `next_cursor` rather than `latest_seq` so a
/// truncated page never skips messages.
pub async fn pending(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Query(params): Query<PendingParams>,
) -> AppResult<Json<ApiResponse<PendingResponse>>> {
    let limit = params
        .limit
        .unwrap_or(state.config.sync_page_limit)
        .min(200);
    let entries = state.sync.pending(auth_user.id, &device_id, limit)?;
    Ok(Json(ApiResponse::ok(PendingResponse {
        next_cursor: entries.last().map(|e| e.seq),
        entries,
        latest_seq: state.sync.latest_seq(auth_user.id),
    })))
}
