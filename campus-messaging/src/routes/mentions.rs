use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use campus_shared::errors::AppResult;
use campus_shared::types::api::ApiResponse;
use campus_shared::types::auth::AuthUser;

use crate::mentions::MentionRef;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MentionListParams {
    pub group_id: Option<Uuid>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MentionUnreadResponse {
    pub unread: i64,
}

/// GET /mentions - caller's mentions, newest first, optionally scoped to
/// one group
pub async fn list_mentions(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<MentionListParams>,
) -> AppResult<Json<ApiResponse<Vec<MentionRef>>>> {
    let items = state.mentions.list(
        auth_user.id,
        params.group_id,
        params.limit.unwrap_or(20).min(100),
        params.offset,
    );
    Ok(Json(ApiResponse::ok(items)))
}

/// POST /mentions/:message_id/ack - acknowledge one mention; idempotent
pub async fn acknowledge_mention(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<u64>,
) -> AppResult<Json<ApiResponse<MentionUnreadResponse>>> {
    state.mentions.acknowledge(auth_user.id, message_id);
    Ok(Json(ApiResponse::ok(MentionUnreadResponse {
        unread: state.mentions.unread_count(auth_user.id),
    })))
}

/// GET /mentions/unread-count
pub async fn unread_count(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<MentionUnreadResponse>>> {
    Ok(Json(ApiResponse::ok(MentionUnreadResponse {
        unread: state.mentions.unread_count(auth_user.id),
    })))
}
