use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ event envelope wrapping all domain events.
///
/// Routing key format: `nesta.{domain}.{entity}.{action}`
/// Example: `nesta.matching.match.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    // Swipe events
    pub const SWIPE_RECORDED: &str = "nesta.matching.swipe.recorded";
    pub const SWIPE_DEAD_LETTERED: &str = "nesta.matching.swipe.dead_lettered";

    // Match events
    pub const MATCH_CREATED: &str = "nesta.matching.match.created";
    pub const MATCH_REMOVED: &str = "nesta.matching.match.removed";
}

/// Common event data payloads
pub mod payloads {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SwipeRecorded {
        pub swiper_id: String,
        pub target_id: String,
        pub direction: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SwipeDeadLettered {
        pub swiper_id: String,
        pub target_id: String,
        pub attempts: u32,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchCreated {
        pub user_a: String,
        pub user_b: String,
        pub chat_id: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchRemoved {
        pub user_a: String,
        pub user_b: String,
        pub chat_id: Option<String>,
    }
}
