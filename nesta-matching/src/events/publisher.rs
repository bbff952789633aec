use nesta_shared::clients::rabbitmq::RabbitMQClient;
use nesta_shared::types::event::{payloads, routing_keys, Event};

use crate::models::Swipe;

pub async fn publish_swipe_recorded(rabbitmq: &RabbitMQClient, swipe: &Swipe) {
    let event = Event::new(
        "nesta-matching",
        routing_keys::SWIPE_RECORDED,
        payloads::SwipeRecorded {
            swiper_id: swipe.swiper_id.clone(),
            target_id: swipe.target_id.clone(),
            direction: swipe.direction.as_str().to_string(),
        },
    )
    .with_user(swipe.swiper_id.clone());

    if let Err(e) = rabbitmq.publish(routing_keys::SWIPE_RECORDED, &event).await {
        tracing::error!(error = %e, "failed to publish swipe.recorded event");
    }
}

pub async fn publish_swipe_dead_lettered(rabbitmq: &RabbitMQClient, swipe: &Swipe, attempts: u32) {
    let event = Event::new(
        "nesta-matching",
        routing_keys::SWIPE_DEAD_LETTERED,
        payloads::SwipeDeadLettered {
            swiper_id: swipe.swiper_id.clone(),
            target_id: swipe.target_id.clone(),
            attempts,
        },
    )
    .with_user(swipe.swiper_id.clone());

    if let Err(e) = rabbitmq.publish(routing_keys::SWIPE_DEAD_LETTERED, &event).await {
        tracing::error!(error = %e, "failed to publish swipe.dead_lettered event");
    }
}

pub async fn publish_match_created(rabbitmq: &RabbitMQClient, user_a: &str, user_b: &str, chat_id: &str) {
    let event = Event::new(
        "nesta-matching",
        routing_keys::MATCH_CREATED,
        payloads::MatchCreated {
            user_a: user_a.to_string(),
            user_b: user_b.to_string(),
            chat_id: chat_id.to_string(),
        },
    )
    .with_user(user_a.to_string());

    if let Err(e) = rabbitmq.publish(routing_keys::MATCH_CREATED, &event).await {
        tracing::error!(error = %e, "failed to publish match.created event");
    }
}

pub async fn publish_match_removed(
    rabbitmq: &RabbitMQClient,
    user_a: &str,
    user_b: &str,
    chat_id: Option<&str>,
) {
    let event = Event::new(
        "nesta-matching",
        routing_keys::MATCH_REMOVED,
        payloads::MatchRemoved {
            user_a: user_a.to_string(),
            user_b: user_b.to_string(),
            chat_id: chat_id.map(|c| c.to_string()),
        },
    )
    .with_user(user_a.to_string());

    if let Err(e) = rabbitmq.publish(routing_keys::MATCH_REMOVED, &event).await {
        tracing::error!(error = %e, "failed to publish match.removed event");
    }
}
