use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use nesta_shared::clients::store::{DocumentStore, Key, Query, StoreError};

use crate::models::Chat;

const ATTR_CHAT: &str = "chatId";
const ATTR_CREATED: &str = "createdAt";

/// Adapter over the chats and messages tables.
#[derive(Clone)]
pub struct ChatStore {
    store: Arc<dyn DocumentStore>,
    chats_table: String,
    messages_table: String,
}

impl ChatStore {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        chats_table: impl Into<String>,
        messages_table: impl Into<String>,
    ) -> Self {
        Self {
            store,
            chats_table: chats_table.into(),
            messages_table: messages_table.into(),
        }
    }

    pub async fn create(&self, user_a: &str, user_b: &str) -> Result<Chat, StoreError> {
        let chat = Chat {
            chat_id: Uuid::new_v4().to_string(),
            participants: vec![user_a.to_string(), user_b.to_string()],
            updated_at: Utc::now(),
            last_message: None,
            last_message_sender: None,
        };
        self.store.put(&self.chats_table, chat.to_item()).await?;
        Ok(chat)
    }

    pub async fn get(&self, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        let item = self
            .store
            .get(&self.chats_table, &Key::partition(ATTR_CHAT, chat_id))
            .await?;
        Ok(item.and_then(Chat::from_item))
    }

    /// Scans the given chat ids for one whose participants are exactly this
    /// pair. Chat records that fail to load are skipped.
    pub async fn find_pair_in(
        &self,
        chat_ids: &[String],
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<Chat>, StoreError> {
        for chat_id in chat_ids {
            if let Some(chat) = self.get(chat_id).await? {
                let has_a = chat.participants.iter().any(|p| p == user_a);
                let has_b = chat.participants.iter().any(|p| p == user_b);
                if has_a && has_b {
                    return Ok(Some(chat));
                }
            }
        }
        Ok(None)
    }

    /// Removes the chat record and every message in it, as one logical unit.
    pub async fn delete_with_messages(&self, chat_id: &str) -> Result<(), StoreError> {
        let messages = self
            .store
            .query(&self.messages_table, Query::on_partition(ATTR_CHAT, chat_id))
            .await?;
        for message in messages {
            let Some(created_at) = message.get(ATTR_CREATED) else {
                continue;
            };
            self.store
                .delete(
                    &self.messages_table,
                    &Key::partition(ATTR_CHAT, chat_id).with_sort(ATTR_CREATED, created_at.clone()),
                )
                .await?;
        }
        self.store
            .delete(&self.chats_table, &Key::partition(ATTR_CHAT, chat_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nesta_shared::clients::store::MemoryStore;
    use serde_json::json;

    fn chat_store(mem: Arc<MemoryStore>) -> ChatStore {
        ChatStore::new(mem, "chats", "messages")
    }

    #[tokio::test]
    async fn create_then_get() {
        let mem = Arc::new(MemoryStore::new());
        let chats = chat_store(mem);

        let chat = chats.create("u1", "u2").await.unwrap();
        let loaded = chats.get(&chat.chat_id).await.unwrap().unwrap();
        assert_eq!(loaded.participants, vec!["u1".to_string(), "u2".to_string()]);
    }

    #[tokio::test]
    async fn find_pair_matches_regardless_of_order() {
        let mem = Arc::new(MemoryStore::new());
        let chats = chat_store(mem);

        let chat = chats.create("u1", "u2").await.unwrap();
        let ids = vec![chat.chat_id.clone()];

        assert!(chats.find_pair_in(&ids, "u2", "u1").await.unwrap().is_some());
        assert!(chats.find_pair_in(&ids, "u1", "u3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_chat_and_messages() {
        let mem = Arc::new(MemoryStore::new());
        let chats = chat_store(mem.clone());

        let chat = chats.create("u1", "u2").await.unwrap();
        for i in 0..3 {
            mem.put(
                "messages",
                serde_json::from_value(json!({
                    "chatId": chat.chat_id,
                    "createdAt": format!("2026-01-0{}T00:00:00Z", i + 1),
                    "text": "hey",
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        }

        chats.delete_with_messages(&chat.chat_id).await.unwrap();
        assert_eq!(mem.len("chats"), 0);
        assert_eq!(mem.len("messages"), 0);
    }
}
