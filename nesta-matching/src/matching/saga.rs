use std::sync::Arc;

use chrono::Utc;
use metrics::counter;

use nesta_shared::clients::store::{DocumentStore, Key, StoreError};

use crate::models::{Chat, IntentState, MatchIntent};
use crate::store::{ChatStore, ProfileStore};

const ATTR_PAIR: &str = "pairKey";

/// Match creation as a saga of independently retryable, idempotent steps:
///
/// 1. record a durable intent for the pair
/// 2. append each user to the other's match list (if absent)
/// 3. create the chat (exactly once, guarded by the intent)
/// 4. link the chat id into both profiles
/// 5. mark the intent completed
///
/// The store offers no multi-item transactions, so a crash between steps is
/// possible; the intent record carries enough progress that a retry resumes
/// and converges to fully-matched instead of leaving partial state behind.
#[derive(Clone)]
pub struct MatchSaga {
    store: Arc<dyn DocumentStore>,
    intents_table: String,
    profiles: ProfileStore,
    chats: ChatStore,
}

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub chat_id: String,
    /// True when the pair was already fully matched and this run changed
    /// nothing.
    pub already_matched: bool,
}

impl MatchSaga {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        intents_table: impl Into<String>,
        profiles: ProfileStore,
        chats: ChatStore,
    ) -> Self {
        Self {
            store,
            intents_table: intents_table.into(),
            profiles,
            chats,
        }
    }

    async fn load_intent(&self, pair_key: &str) -> Result<Option<MatchIntent>, StoreError> {
        let item = self
            .store
            .get(&self.intents_table, &Key::partition(ATTR_PAIR, pair_key))
            .await?;
        Ok(item.and_then(MatchIntent::from_item))
    }

    /// Upsert keyed on the pair so repeated saves overwrite progress in place.
    async fn save_intent(&self, intent: &MatchIntent) -> Result<(), StoreError> {
        let mut attrs = intent.to_item();
        attrs.remove(ATTR_PAIR);
        self.store
            .update(
                &self.intents_table,
                &Key::partition(ATTR_PAIR, intent.pair_key.clone()),
                attrs,
            )
            .await
    }

    async fn delete_intent(&self, pair_key: &str) -> Result<(), StoreError> {
        self.store
            .delete(&self.intents_table, &Key::partition(ATTR_PAIR, pair_key))
            .await
    }

    pub async fn create_match(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<MatchOutcome, StoreError> {
        let pair_key = MatchIntent::pair_key_for(user_a, user_b);

        let mut intent = match self.load_intent(&pair_key).await? {
            Some(intent) if intent.state == IntentState::Completed => {
                // Nothing to do; duplicate detection race or client retry
                let chat_id = intent.chat_id.unwrap_or_default();
                return Ok(MatchOutcome {
                    chat_id,
                    already_matched: true,
                });
            }
            Some(intent) => {
                tracing::info!(pair_key = %pair_key, "resuming interrupted match creation");
                intent
            }
            None => {
                // A chat may predate the intent table; never create a second
                // one for the same pair
                let existing = self.find_existing_chat(user_a, user_b).await?;
                let now = Utc::now();
                let intent = MatchIntent {
                    pair_key: pair_key.clone(),
                    user_a: user_a.to_string(),
                    user_b: user_b.to_string(),
                    state: if existing.is_some() {
                        IntentState::ChatCreated
                    } else {
                        IntentState::Pending
                    },
                    chat_id: existing.map(|c| c.chat_id),
                    created_at: now,
                    updated_at: now,
                };
                self.save_intent(&intent).await?;
                intent
            }
        };

        self.profiles.add_match_edge(user_a, user_b).await?;
        self.profiles.add_match_edge(user_b, user_a).await?;

        let chat_id = match &intent.chat_id {
            Some(chat_id) => chat_id.clone(),
            None => {
                let chat = self.chats.create(user_a, user_b).await?;
                intent.state = IntentState::ChatCreated;
                intent.chat_id = Some(chat.chat_id.clone());
                intent.updated_at = Utc::now();
                self.save_intent(&intent).await?;
                chat.chat_id
            }
        };

        self.profiles.link_chat(user_a, &chat_id).await?;
        self.profiles.link_chat(user_b, &chat_id).await?;

        intent.state = IntentState::Completed;
        intent.updated_at = Utc::now();
        self.save_intent(&intent).await?;

        counter!("matches_created_total").increment(1);
        tracing::info!(user_a, user_b, chat_id = %chat_id, "match created");

        Ok(MatchOutcome {
            chat_id,
            already_matched: false,
        })
    }

    async fn find_existing_chat(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<Chat>, StoreError> {
        let chat_ids = self.profiles.chats(user_a).await?;
        self.chats.find_pair_in(&chat_ids, user_a, user_b).await
    }

    /// Unmatch: removes both match edges, the chat and all its messages, and
    /// the intent record, as one logical unit.
    pub async fn remove_match(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<String>, StoreError> {
        let pair_key = MatchIntent::pair_key_for(user_a, user_b);

        self.profiles.remove_match_edge(user_a, user_b).await?;
        self.profiles.remove_match_edge(user_b, user_a).await?;

        let chat = self.find_existing_chat(user_a, user_b).await?;
        let chat_id = if let Some(chat) = chat {
            self.profiles.unlink_chat(user_a, &chat.chat_id).await?;
            self.profiles.unlink_chat(user_b, &chat.chat_id).await?;
            self.chats.delete_with_messages(&chat.chat_id).await?;
            Some(chat.chat_id)
        } else {
            None
        };

        self.delete_intent(&pair_key).await?;
        tracing::info!(user_a, user_b, "match removed");
        Ok(chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nesta_shared::clients::store::{DocumentStore, MemoryStore};
    use serde_json::json;

    const PROFILES: &str = "user_profiles";
    const CHATS: &str = "chats";
    const MESSAGES: &str = "messages";
    const INTENTS: &str = "match_intents";

    async fn setup() -> (Arc<MemoryStore>, MatchSaga) {
        let mem = Arc::new(MemoryStore::new());
        for user in ["u1", "u2"] {
            mem.put(
                PROFILES,
                serde_json::from_value(json!({ "userId": user })).unwrap(),
            )
            .await
            .unwrap();
        }
        let saga = MatchSaga::new(
            mem.clone(),
            INTENTS,
            ProfileStore::new(mem.clone(), PROFILES),
            ChatStore::new(mem.clone(), CHATS, MESSAGES),
        );
        (mem, saga)
    }

    #[tokio::test]
    async fn creates_edges_chat_and_links() {
        let (mem, saga) = setup().await;
        let outcome = saga.create_match("u1", "u2").await.unwrap();
        assert!(!outcome.already_matched);

        let profiles = ProfileStore::new(mem.clone(), PROFILES);
        assert_eq!(profiles.matches("u1").await.unwrap(), vec!["u2".to_string()]);
        assert_eq!(profiles.matches("u2").await.unwrap(), vec!["u1".to_string()]);
        assert_eq!(profiles.chats("u1").await.unwrap(), vec![outcome.chat_id.clone()]);
        assert_eq!(profiles.chats("u2").await.unwrap(), vec![outcome.chat_id]);
        assert_eq!(mem.len(CHATS), 1);
    }

    #[tokio::test]
    async fn running_twice_is_idempotent() {
        let (mem, saga) = setup().await;
        let first = saga.create_match("u1", "u2").await.unwrap();
        let second = saga.create_match("u1", "u2").await.unwrap();

        assert!(second.already_matched);
        assert_eq!(first.chat_id, second.chat_id);
        assert_eq!(mem.len(CHATS), 1);

        let profiles = ProfileStore::new(mem, PROFILES);
        assert_eq!(profiles.matches("u1").await.unwrap(), vec!["u2".to_string()]);
        assert_eq!(profiles.matches("u2").await.unwrap(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_detection_race_reuses_pair_key_order() {
        let (mem, saga) = setup().await;
        saga.create_match("u1", "u2").await.unwrap();
        // Same pair from the other side, as a concurrent detection would run it
        let outcome = saga.create_match("u2", "u1").await.unwrap();

        assert!(outcome.already_matched);
        assert_eq!(mem.len(CHATS), 1);
    }

    #[tokio::test]
    async fn failed_run_converges_on_retry() {
        let (mem, saga) = setup().await;

        mem.fail_next_puts(1);
        assert!(saga.create_match("u1", "u2").await.is_err());

        let outcome = saga.create_match("u1", "u2").await.unwrap();
        assert_eq!(mem.len(CHATS), 1);

        let profiles = ProfileStore::new(mem.clone(), PROFILES);
        assert_eq!(profiles.matches("u1").await.unwrap(), vec!["u2".to_string()]);
        assert_eq!(profiles.chats("u1").await.unwrap(), vec![outcome.chat_id.clone()]);
        assert_eq!(profiles.chats("u2").await.unwrap(), vec![outcome.chat_id]);
    }

    #[tokio::test]
    async fn crash_after_chat_creation_resumes_without_second_chat() {
        let (mem, saga) = setup().await;

        // Simulate a crash right after the chat was created: intent says
        // chat_created, chat exists, but nothing is linked yet
        let chats = ChatStore::new(mem.clone(), CHATS, MESSAGES);
        let chat = chats.create("u1", "u2").await.unwrap();
        let now = Utc::now();
        let intent = MatchIntent {
            pair_key: MatchIntent::pair_key_for("u1", "u2"),
            user_a: "u1".into(),
            user_b: "u2".into(),
            state: IntentState::ChatCreated,
            chat_id: Some(chat.chat_id.clone()),
            created_at: now,
            updated_at: now,
        };
        mem.put(INTENTS, intent.to_item()).await.unwrap();

        let outcome = saga.create_match("u1", "u2").await.unwrap();
        assert!(!outcome.already_matched);
        assert_eq!(outcome.chat_id, chat.chat_id);
        assert_eq!(mem.len(CHATS), 1);

        let profiles = ProfileStore::new(mem.clone(), PROFILES);
        assert_eq!(profiles.matches("u1").await.unwrap(), vec!["u2".to_string()]);
        assert_eq!(profiles.matches("u2").await.unwrap(), vec!["u1".to_string()]);
        assert_eq!(profiles.chats("u1").await.unwrap(), vec![chat.chat_id.clone()]);
        assert_eq!(profiles.chats("u2").await.unwrap(), vec![chat.chat_id]);
    }

    #[tokio::test]
    async fn remove_match_clears_everything() {
        let (mem, saga) = setup().await;
        let outcome = saga.create_match("u1", "u2").await.unwrap();

        mem.put(
            MESSAGES,
            serde_json::from_value(json!({
                "chatId": outcome.chat_id,
                "createdAt": "2026-02-01T00:00:00Z",
                "text": "hello",
            }))
            .unwrap(),
        )
        .await
        .unwrap();

        let removed = saga.remove_match("u2", "u1").await.unwrap();
        assert_eq!(removed, Some(outcome.chat_id));

        let profiles = ProfileStore::new(mem.clone(), PROFILES);
        assert!(profiles.matches("u1").await.unwrap().is_empty());
        assert!(profiles.matches("u2").await.unwrap().is_empty());
        assert!(profiles.chats("u1").await.unwrap().is_empty());
        assert_eq!(mem.len(CHATS), 0);
        assert_eq!(mem.len(MESSAGES), 0);
        assert_eq!(mem.len(INTENTS), 0);

        // The pair can match again later
        let again = saga.create_match("u1", "u2").await.unwrap();
        assert!(!again.already_matched);
        assert_eq!(mem.len(CHATS), 1);
    }
}
