use std::sync::Arc;

use serde::{Deserialize, Serialize};
use socketioxide::extract::{Data, SocketRef};
use uuid::Uuid;

use campus_shared::middleware::auth_extractor::validate_token;

use crate::dispatch::push_events;
use crate::error::EngineError;
use crate::events::publisher;
use crate::models::ContentKind;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct PrivateMessagePayload {
    target_id: Uuid,
    #[serde(default = "default_content_kind")]
    content_kind: ContentKind,
    content: String,
    #[serde(default)]
    extra: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GroupMessagePayload {
    group_id: Uuid,
    #[serde(default = "default_content_kind")]
    content_kind: ContentKind,
    content: String,
    #[serde(default)]
    extra: Option<serde_json::Value>,
    #[serde(default)]
    mentioned_user_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct MessageRefPayload {
    message_id: u64,
}

#[derive(Debug, Deserialize)]
struct GroupRefPayload {
    group_id: Uuid,
}

fn default_content_kind() -> ContentKind {
    ContentKind::Text
}

fn get_user_id(socket: &SocketRef) -> Option<Uuid> {
    socket.extensions.get::<Uuid>()
}

fn emit_engine_error(socket: &SocketRef, e: &EngineError) {
    let code = match e {
        EngineError::Validation(_) => "VALIDATION",
        EngineError::PermissionDenied(_) => "FORBIDDEN",
        EngineError::NotFound(_) => "NOT_FOUND",
        EngineError::StoreUnavailable => "STORE_UNAVAILABLE",
        EngineError::Collaborator(_) => "UPSTREAM_ERROR",
    };
    let _ = socket.emit(
        "error",
        &ErrorPayload {
            code: code.into(),
            message: e.to_string(),
        },
    );
}

pub async fn on_connect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match authenticate_socket(&socket, &state) {
        Ok(id) => id,
        Err(msg) => {
            tracing::warn!(error = %msg, "messaging socket auth failed");
            let _ = socket.emit(
                "error",
                &ErrorPayload {
                    code: "AUTH_FAILED".into(),
                    message: msg,
                },
            );
            socket.disconnect().ok();
            return;
        }
    };

    socket.extensions.insert(user_id);

    // Join user-specific room so directed pushes reach every device session
    let user_room = format!("user:{user_id}");
    socket.join(user_room).ok();

    tracing::info!(user_id = %user_id, sid = %socket.id, "messaging socket connected");

    let _ = state
        .redis
        .set(&format!("online:msg:{user_id}"), "1", 120)
        .await;

    let _ = socket.emit("connected", &serde_json::json!({ "user_id": user_id }));

    socket.on(push_events::PRIVATE_MESSAGE, {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move {
                on_private_message(socket, payload, &state).await;
            }
        }
    });

    socket.on(push_events::GROUP_MESSAGE, {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move {
                on_group_message(socket, payload, &state).await;
            }
        }
    });

    socket.on("message.recall", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move {
                on_message_recall(socket, payload, &state).await;
            }
        }
    });

    socket.on("message.read", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move {
                on_message_read(socket, payload, &state);
            }
        }
    });

    socket.on("group.join", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move {
                on_group_join(socket, payload, &state).await;
            }
        }
    });

    socket.on("group.leave", move |socket: SocketRef, Data::<serde_json::Value>(payload)| async move {
        if let Ok(req) = serde_json::from_value::<GroupRefPayload>(payload) {
            socket.leave(format!("group:{}", req.group_id)).ok();
        }
    });

    // Heartbeat refreshes the presence TTL
    socket.on("heartbeat", {
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                if let Some(user_id) = get_user_id(&socket) {
                    let _ = state
                        .redis
                        .set(&format!("online:msg:{user_id}"), "1", 120)
                        .await;
                }
            }
        }
    });

    socket.on_disconnect({
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                on_disconnect_with_state(socket, state).await;
            }
        }
    });
}

async fn on_disconnect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    tracing::info!(user_id = %user_id, sid = %socket.id, "messaging socket disconnected");

    let _ = state.redis.del(&format!("online:msg:{user_id}")).await;
}

async fn on_private_message(socket: SocketRef, payload: serde_json::Value, state: &Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    let req: PrivateMessagePayload = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed private.message payload");
            return;
        }
    };

    match state
        .dispatcher
        .send_private(user_id, req.target_id, req.content_kind, req.content, req.extra)
        .await
    {
        Ok(message) => {
            publisher::publish_message_sent(&state.rabbitmq, &message).await;
        }
        Err(e) => emit_engine_error(&socket, &e),
    }
}

async fn on_group_message(socket: SocketRef, payload: serde_json::Value, state: &Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    let req: GroupMessagePayload = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed group.message payload");
            return;
        }
    };

    match state
        .dispatcher
        .send_group(
            user_id,
            req.group_id,
            req.content_kind,
            req.content,
            req.extra,
            &req.mentioned_user_ids,
        )
        .await
    {
        Ok(message) => {
            publisher::publish_message_sent(&state.rabbitmq, &message).await;
        }
        Err(e) => emit_engine_error(&socket, &e),
    }
}

async fn on_message_recall(socket: SocketRef, payload: serde_json::Value, state: &Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    let req: MessageRefPayload = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed message.recall payload");
            return;
        }
    };

    match state.dispatcher.recall_message(user_id, req.message_id).await {
        Ok(_) => {
            publisher::publish_message_recalled(&state.rabbitmq, req.message_id, user_id).await;
        }
        Err(e) => emit_engine_error(&socket, &e),
    }
}

fn on_message_read(socket: SocketRef, payload: serde_json::Value, state: &Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    let req: MessageRefPayload = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed message.read payload");
            return;
        }
    };

    if let Err(e) = state.dispatcher.mark_read(user_id, req.message_id) {
        emit_engine_error(&socket, &e);
    }
}

/// Group broadcast rooms are opt-in and membership-gated.
async fn on_group_join(socket: SocketRef, payload: serde_json::Value, state: &Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    let req: GroupRefPayload = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed group.join payload");
            return;
        }
    };

    match state.roster.role_of(req.group_id, user_id).await {
        Ok(Some(_)) => {
            socket.join(format!("group:{}", req.group_id)).ok();
            let _ = socket.emit(
                "group.joined",
                &serde_json::json!({ "group_id": req.group_id }),
            );
        }
        Ok(None) => {
            let _ = socket.emit(
                "error",
                &ErrorPayload {
                    code: "FORBIDDEN".into(),
                    message: "not a group member".into(),
                },
            );
        }
        Err(e) => {
            tracing::warn!(group_id = %req.group_id, error = %e, "roster lookup failed");
        }
    }
}

fn authenticate_socket(socket: &SocketRef, state: &Arc<AppState>) -> Result<Uuid, String> {
    let connect_info = socket.req_parts();

    // Token arrives as a ?token=xxx query parameter on the handshake
    let query = connect_info.uri.query().unwrap_or_default();
    let token = query
        .split('&')
        .find_map(|pair| {
            let mut split = pair.splitn(2, '=');
            let key = split.next()?;
            let value = split.next()?;
            if key == "token" {
                Some(value.to_string())
            } else {
                None
            }
        })
        .ok_or_else(|| "missing token query parameter".to_string())?;

    let claims = validate_token(&token, &state.config.jwt_secret)
        .map_err(|e| format!("invalid token: {e}"))?;

    Ok(claims.sub)
}
