use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nesta_shared::clients::store::Item;

/// Swipe direction, stored as the single-letter codes the swipe log uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "l")]
    Left,
    #[serde(rename = "r")]
    Right,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "l",
            Self::Right => "r",
        }
    }
}

/// A swipe log entry. Immutable once written; composite identity is
/// (swiperId, timestamp), with timestamp in microseconds so two swipes in the
/// same millisecond cannot collide.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Swipe {
    #[serde(rename = "userId")]
    pub swiper_id: String,
    #[serde(rename = "swipedOnUserId")]
    pub target_id: String,
    pub direction: Direction,
    #[serde(rename = "timestamp")]
    pub timestamp_micros: i64,
    #[serde(rename = "expirationTimestamp")]
    pub expires_at: i64,
}

impl Swipe {
    pub fn to_item(&self) -> Item {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Item::new(),
        }
    }

    pub fn from_item(item: Item) -> Option<Self> {
        serde_json::from_value(serde_json::Value::Object(item)).ok()
    }
}

/// User profile as stored in the profiles table. Only the attributes the
/// engine reads are modeled; everything else stays opaque in the store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Profile {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "fullName", default)]
    pub full_name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub matches: Vec<String>,
    #[serde(default)]
    pub chats: Vec<String>,
    #[serde(rename = "blockedUsers", default)]
    pub blocked_users: Vec<String>,
    #[serde(rename = "lastTimeActive", default, deserialize_with = "de_last_active")]
    pub last_active: Option<DateTime<Utc>>,
    #[serde(rename = "normalizedWeightedPrefs", default)]
    pub preference_vector: Option<Vec<f64>>,
}

/// Older profile records stored last-active as an empty string; treat anything
/// unparseable as never-active.
fn de_last_active<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

impl Profile {
    pub fn from_item(item: Item) -> Option<Self> {
        serde_json::from_value(serde_json::Value::Object(item)).ok()
    }
}

/// Chat record derived from a match; exactly one per matched pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub participants: Vec<String>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "lastMessage", default)]
    pub last_message: Option<String>,
    #[serde(rename = "lastMessageSender", default)]
    pub last_message_sender: Option<String>,
}

impl Chat {
    pub fn to_item(&self) -> Item {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Item::new(),
        }
    }

    pub fn from_item(item: Item) -> Option<Self> {
        serde_json::from_value(serde_json::Value::Object(item)).ok()
    }
}

/// Saga progress for one match creation, keyed by the normalized pair.
/// Durable so a crash mid-sequence resumes instead of abandoning partial
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchIntent {
    #[serde(rename = "pairKey")]
    pub pair_key: String,
    #[serde(rename = "userA")]
    pub user_a: String,
    #[serde(rename = "userB")]
    pub user_b: String,
    pub state: IntentState,
    #[serde(rename = "chatId", default)]
    pub chat_id: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    Pending,
    ChatCreated,
    Completed,
}

impl MatchIntent {
    /// Order-independent key for a user pair.
    pub fn pair_key_for(a: &str, b: &str) -> String {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        format!("{lo}:{hi}")
    }

    pub fn to_item(&self) -> Item {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Item::new(),
        }
    }

    pub fn from_item(item: Item) -> Option<Self> {
        serde_json::from_value(serde_json::Value::Object(item)).ok()
    }
}

/// Ranking-time view of a profile; never persisted.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub profile: Profile,
    pub liked_by_candidate: bool,
    pub last_active_micros: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swipe_item_roundtrip() {
        let swipe = Swipe {
            swiper_id: "u1".into(),
            target_id: "u2".into(),
            direction: Direction::Right,
            timestamp_micros: 1_700_000_000_000_123,
            expires_at: 1_705_000_000,
        };
        let item = swipe.to_item();
        assert_eq!(
            item.get("direction"),
            Some(&serde_json::Value::String("r".into()))
        );
        assert_eq!(Swipe::from_item(item), Some(swipe));
    }

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(
            MatchIntent::pair_key_for("u9", "u2"),
            MatchIntent::pair_key_for("u2", "u9")
        );
    }

    #[test]
    fn profile_tolerates_missing_attributes() {
        let item: Item = serde_json::from_str(r#"{"userId": "u1"}"#).unwrap();
        let profile = Profile::from_item(item).unwrap();
        assert!(profile.matches.is_empty());
        assert!(profile.preference_vector.is_none());
    }
}
