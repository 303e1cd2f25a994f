use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use campus_shared::errors::{AppError, AppResult, ErrorCode};
use campus_shared::types::api::ApiResponse;
use campus_shared::types::auth::AuthUser;

use crate::events::publisher;
use crate::models::{ContentKind, Message, Scope};
use crate::recall::RecallOutcome;
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize, Validate)]
pub struct SendPrivateRequest {
    pub target_id: Uuid,
    #[serde(default = "default_content_kind")]
    pub content_kind: ContentKind,
    #[validate(length(min = 1, max = 5000, message = "content must be 1-5000 characters"))]
    pub content: String,
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendGroupRequest {
    pub group_id: Uuid,
    #[serde(default = "default_content_kind")]
    pub content_kind: ContentKind,
    #[validate(length(min = 1, max = 5000, message = "content must be 1-5000 characters"))]
    pub content: String,
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
    #[serde(default)]
    pub mentioned_user_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub before_id: Option<u64>,
    pub limit: Option<usize>,
}

fn default_content_kind() -> ContentKind {
    ContentKind::Text
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct RecallResponse {
    pub message_id: u64,
    pub already_recalled: bool,
}

#[derive(Debug, Serialize)]
pub struct ReceiptSummary {
    pub message_id: u64,
    pub read_by: Vec<Uuid>,
    pub unread_by: Vec<Uuid>,
    pub read_count: usize,
    pub unread_count: usize,
}

// --- Handlers ---

/// POST /messages/private - send a one-to-one message
pub async fn send_private(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendPrivateRequest>,
) -> AppResult<Json<ApiResponse<Message>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let message = state
        .dispatcher
        .send_private(
            auth_user.id,
            req.target_id,
            req.content_kind,
            req.content,
            req.extra,
        )
        .await?;

    publisher::publish_message_sent(&state.rabbitmq, &message).await;

    Ok(Json(ApiResponse::ok(message)))
}

/// POST /messages/group - send a group message with optional mentions
pub async fn send_group(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendGroupRequest>,
) -> AppResult<Json<ApiResponse<Message>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let message = state
        .dispatcher
        .send_group(
            auth_user.id,
            req.group_id,
            req.content_kind,
            req.content,
            req.extra,
            &req.mentioned_user_ids,
        )
        .await?;

    publisher::publish_message_sent(&state.rabbitmq, &message).await;

    Ok(Json(ApiResponse::ok(message)))
}

/// POST /messages/:id/recall
pub async fn recall_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<u64>,
) -> AppResult<Json<ApiResponse<RecallResponse>>> {
    let outcome = state.dispatcher.recall_message(auth_user.id, message_id).await?;

    if outcome == RecallOutcome::Recalled {
        publisher::publish_message_recalled(&state.rabbitmq, message_id, auth_user.id).await;
    }

    Ok(Json(ApiResponse::ok(RecallResponse {
        message_id,
        already_recalled: outcome == RecallOutcome::AlreadyRecalled,
    })))
}

/// POST /messages/:id/read - flip the caller's read receipt
pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<u64>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.dispatcher.mark_read(auth_user.id, message_id)?;
    Ok(Json(ApiResponse::ok(())))
}

/// DELETE /messages/:id - sender-only soft delete
pub async fn delete_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<u64>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.dispatcher.delete_message(auth_user.id, message_id)?;
    Ok(Json(ApiResponse::ok(())))
}

/// GET /messages/private/:peer_id - private history, newest first
pub async fn private_history(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(peer_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<ApiResponse<Vec<Message>>>> {
    let limit = params
        .limit
        .unwrap_or(state.config.history_page_limit)
        .min(100);
    let scope = Scope::private(auth_user.id, peer_id);
    let items = state.store.range(scope, params.before_id, limit);
    Ok(Json(ApiResponse::ok(items)))
}

/// GET /messages/group/:group_id - group history, membership-gated
pub async fn group_history(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<ApiResponse<Vec<Message>>>> {
    let role = state
        .roster
        .role_of(group_id, auth_user.id)
        .await
        .map_err(|e| AppError::Internal(e))?;
    if role.is_none() {
        return Err(AppError::new(
            ErrorCode::NotGroupMember,
            "you are not a member of this group",
        ));
    }

    let limit = params
        .limit
        .unwrap_or(state.config.history_page_limit)
        .min(100);
    let items = state
        .store
        .range(Scope::group(group_id), params.before_id, limit);
    Ok(Json(ApiResponse::ok(items)))
}

/// GET /messages/:id/receipts - who has read the message; sender only
pub async fn message_receipts(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<u64>,
) -> AppResult<Json<ApiResponse<ReceiptSummary>>> {
    let message = state
        .store
        .get(message_id)
        .ok_or_else(|| AppError::new(ErrorCode::MessageNotFound, "message not found"))?;

    if message.sender_id != auth_user.id {
        return Err(AppError::new(
            ErrorCode::Forbidden,
            "only the sender may view receipts",
        ));
    }

    Ok(Json(ApiResponse::ok(ReceiptSummary {
        message_id,
        read_by: state.receipts.readers_of(message_id),
        unread_by: state.receipts.unread_recipients_of(message_id),
        read_count: state.receipts.read_count(message_id),
        unread_count: state.receipts.unread_count(message_id),
    })))
}
