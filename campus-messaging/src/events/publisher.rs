use uuid::Uuid;

use campus_shared::clients::rabbitmq::RabbitMQClient;
use campus_shared::types::event::{payloads, routing_keys, Event};

use crate::models::{ConversationKind, Message};

const PREVIEW_MAX_CHARS: usize = 80;

fn content_preview(content: &str) -> String {
    content.chars().take(PREVIEW_MAX_CHARS).collect()
}

pub async fn publish_message_sent(rabbitmq: &RabbitMQClient, message: &Message) {
    let event = Event::new(
        "campus-messaging",
        routing_keys::MESSAGING_MESSAGE_SENT,
        payloads::MessageSent {
            message_id: message.id,
            sender_id: message.sender_id,
            target_id: message.target_id,
            is_group: message.kind == ConversationKind::Group,
            content_preview: content_preview(&message.content),
        },
    )
    .with_user(message.sender_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MESSAGING_MESSAGE_SENT, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish message.sent event");
    }
}

pub async fn publish_message_recalled(
    rabbitmq: &RabbitMQClient,
    message_id: u64,
    operator_id: Uuid,
) {
    let event = Event::new(
        "campus-messaging",
        routing_keys::MESSAGING_MESSAGE_RECALLED,
        payloads::MessageRecalled {
            message_id,
            operator_id,
        },
    )
    .with_user(operator_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MESSAGING_MESSAGE_RECALLED, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish message.recalled event");
    }
}
