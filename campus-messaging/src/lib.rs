use std::sync::Arc;

pub mod clients;
pub mod collab;
pub mod config;
pub mod conversations;
pub mod counters;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod mentions;
pub mod models;
pub mod recall;
pub mod receipts;
pub mod routes;
pub mod socket;
pub mod store;
pub mod sync;

use campus_shared::clients::rabbitmq::RabbitMQClient;
use campus_shared::clients::redis::RedisClient;

use crate::collab::GroupRoster;
use crate::config::AppConfig;
use crate::conversations::ConversationIndex;
use crate::dispatch::Dispatcher;
use crate::mentions::MentionIndex;
use crate::receipts::ReceiptTracker;
use crate::store::MessageStore;
use crate::sync::SyncTracker;

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<MessageStore>,
    pub conversations: Arc<ConversationIndex>,
    pub receipts: Arc<ReceiptTracker>,
    pub mentions: Arc<MentionIndex>,
    pub sync: Arc<SyncTracker>,
    pub roster: Arc<dyn GroupRoster>,
    pub dispatcher: Arc<Dispatcher>,
    pub rabbitmq: RabbitMQClient,
    pub redis: RedisClient,
}
