use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use socketioxide::SocketIo;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use campus_shared::clients::rabbitmq::RabbitMQClient;
use campus_shared::clients::redis::RedisClient;

use campus_messaging::clients::{HttpGroupRoster, HttpUserDirectory};
use campus_messaging::config::AppConfig;
use campus_messaging::conversations::ConversationIndex;
use campus_messaging::dispatch::Dispatcher;
use campus_messaging::mentions::MentionIndex;
use campus_messaging::receipts::ReceiptTracker;
use campus_messaging::routes;
use campus_messaging::socket::registry::SocketSessions;
use campus_messaging::store::MessageStore;
use campus_messaging::sync::SyncTracker;
use campus_messaging::{socket, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    campus_shared::middleware::init_tracing("campus-messaging");

    let config = AppConfig::load()?;
    let port = config.port;

    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let redis = RedisClient::connect(&config.redis_url).await?;

    // Socket.IO layer first - the io handle lands in AppState so REST
    // handlers can push to live sessions through the dispatcher
    let (sio_layer, io) = SocketIo::builder().build_layer();

    let http_client = reqwest::Client::new();
    let roster = Arc::new(HttpGroupRoster::new(
        http_client.clone(),
        config.group_service_url.clone(),
    ));
    let directory = Arc::new(HttpUserDirectory::new(
        http_client,
        config.user_service_url.clone(),
    ));
    let sessions = Arc::new(SocketSessions::new(io.clone()));

    let store = Arc::new(MessageStore::new());
    let conversations = Arc::new(ConversationIndex::new());
    let receipts = Arc::new(ReceiptTracker::new());
    let mentions = Arc::new(MentionIndex::new());
    let sync = Arc::new(SyncTracker::new(store.clone()));

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        conversations.clone(),
        receipts.clone(),
        mentions.clone(),
        sync.clone(),
        roster.clone(),
        directory,
        sessions,
    ));

    let state = Arc::new(AppState {
        config,
        store,
        conversations,
        receipts,
        mentions,
        sync,
        roster,
        dispatcher,
        rabbitmq,
        redis,
    });

    io.ns("/", {
        let state = state.clone();
        move |socket: socketioxide::extract::SocketRef| {
            let state = state.clone();
            async move {
                socket::handlers::on_connect_with_state(socket, state).await;
            }
        }
    });

    let shutdown_store = state.store.clone();

    let app = Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        // Messages
        .route("/messages/private", post(routes::messages::send_private))
        .route("/messages/group", post(routes::messages::send_group))
        .route("/messages/private/:peer_id", get(routes::messages::private_history))
        .route("/messages/group/:group_id", get(routes::messages::group_history))
        .route("/messages/:id/recall", post(routes::messages::recall_message))
        .route("/messages/:id/read", post(routes::messages::mark_read))
        .route("/messages/:id/receipts", get(routes::messages::message_receipts))
        .route("/messages/:id", delete(routes::messages::delete_message))
        // Conversations
        .route("/conversations", get(routes::conversations::list_conversations)
            .post(routes::conversations::open_conversation))
        .route("/conversations/:id/pin", put(routes::conversations::set_pinned))
        .route("/conversations/:id/mute", put(routes::conversations::set_muted))
        .route("/conversations/:id/read", post(routes::conversations::mark_read))
        .route("/conversations/:id/clear", post(routes::conversations::clear_conversation))
        .route("/conversations/:id", delete(routes::conversations::delete_conversation))
        // Mentions
        .route("/mentions", get(routes::mentions::list_mentions))
        .route("/mentions/unread-count", get(routes::mentions::unread_count))
        .route("/mentions/:message_id/ack", post(routes::mentions::acknowledge_mention))
        // Device sync
        .route("/sync/devices", post(routes::sync::register_device))
        .route("/sync/devices/:device_id", delete(routes::sync::unregister_device))
        .route("/sync/devices/:device_id/ack", post(routes::sync::acknowledge))
        .route("/sync/devices/:device_id/pending", get(routes::sync::pending))
        .layer(sio_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "campus-messaging starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            // New appends fail fast while in-flight requests drain.
            shutdown_store.close();
            tracing::info!("shutdown signal received, store closed to appends");
        })
        .await?;

    Ok(())
}
