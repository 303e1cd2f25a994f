use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use campus_shared::errors::AppResult;
use campus_shared::types::api::ApiResponse;
use campus_shared::types::auth::AuthUser;
use campus_shared::types::pagination::{Paginated, PaginationParams};

use crate::models::{ConversationEntry, ConversationKind};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct OpenConversationRequest {
    pub kind: ConversationKind,
    pub target_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub pinned: bool,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

// --- Handlers ---

/// GET /conversations - caller's conversation list, pinned first then by
/// most recent activity
pub async fn list_conversations(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<ConversationEntry>>>> {
    let items: Vec<ConversationEntry> = state
        .conversations
        .list_for(auth_user.id)
        .into_iter()
        .skip(params.offset())
        .take(params.limit())
        .collect();
    Ok(Json(ApiResponse::ok(Paginated::new(items, &params))))
}

/// POST /conversations - open (or revive) the caller's entry for a target
pub async fn open_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenConversationRequest>,
) -> AppResult<Json<ApiResponse<ConversationEntry>>> {
    let entry = state
        .conversations
        .upsert(auth_user.id, req.kind, req.target_id);
    Ok(Json(ApiResponse::ok(entry)))
}

/// PUT /conversations/:id/pin
pub async fn set_pinned(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
    Json(req): Json<PinRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.conversations.set_pinned(entry_id, auth_user.id, req.pinned)?;
    Ok(Json(ApiResponse::ok(())))
}

/// PUT /conversations/:id/mute
pub async fn set_muted(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
    Json(req): Json<MuteRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.conversations.set_muted(entry_id, auth_user.id, req.muted)?;
    Ok(Json(ApiResponse::ok(())))
}

/// POST /conversations/:id/read - zero the unread counter
pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.conversations.mark_read(entry_id, auth_user.id)?;
    Ok(Json(ApiResponse::ok(())))
}

/// POST /conversations/:id/clear - reset counters and last-message pointer
/// without removing the entry
pub async fn clear_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.conversations.clear(entry_id, auth_user.id)?;
    Ok(Json(ApiResponse::ok(())))
}

/// DELETE /conversations/:id - soft delete; the next message in scope
/// revives the entry with fresh state
pub async fn delete_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.conversations.soft_delete(entry_id, auth_user.id)?;
    Ok(Json(ApiResponse::ok(())))
}
