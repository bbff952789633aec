use std::sync::Arc;

use serde_json::{json, Value};

use nesta_shared::clients::store::{DocumentStore, Key, StoreError};

use crate::models::Profile;

const ATTR_USER: &str = "userId";
const ATTR_MATCHES: &str = "matches";
const ATTR_CHATS: &str = "chats";

/// Adapter over the user profiles table. The engine only ever touches the
/// match list, chat list, blocked list, and preference vector; the rest of a
/// profile is owned by the (out-of-scope) profile service.
#[derive(Clone)]
pub struct ProfileStore {
    store: Arc<dyn DocumentStore>,
    table: String,
}

impl ProfileStore {
    pub fn new(store: Arc<dyn DocumentStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    fn key(user_id: &str) -> Key {
        Key::partition(ATTR_USER, user_id)
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let item = self.store.get(&self.table, &Self::key(user_id)).await?;
        Ok(item.and_then(Profile::from_item))
    }

    /// Missing profiles are silently skipped: the ANN index can lag behind
    /// profile deletions and that staleness is expected.
    pub async fn batch_get(&self, user_ids: &[String]) -> Result<Vec<Profile>, StoreError> {
        let mut profiles = Vec::with_capacity(user_ids.len());
        for id in user_ids {
            if let Some(profile) = self.get(id).await? {
                profiles.push(profile);
            }
        }
        Ok(profiles)
    }

    async fn string_list(&self, user_id: &str, attr: &str) -> Result<Vec<String>, StoreError> {
        let item = self.store.get(&self.table, &Self::key(user_id)).await?;
        Ok(item
            .and_then(|it| it.get(attr).cloned())
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default())
    }

    async fn append_to_list(
        &self,
        user_id: &str,
        attr: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut list = self.string_list(user_id, attr).await?;
        if list.iter().any(|v| v == value) {
            return Ok(());
        }
        list.push(value.to_string());
        self.write_list(user_id, attr, list).await
    }

    async fn remove_from_list(
        &self,
        user_id: &str,
        attr: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut list = self.string_list(user_id, attr).await?;
        let before = list.len();
        list.retain(|v| v != value);
        if list.len() == before {
            return Ok(());
        }
        self.write_list(user_id, attr, list).await
    }

    async fn write_list(
        &self,
        user_id: &str,
        attr: &str,
        list: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut attrs = serde_json::Map::new();
        attrs.insert(attr.to_string(), json!(list));
        self.store
            .update(&self.table, &Self::key(user_id), attrs)
            .await
    }

    pub async fn matches(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        self.string_list(user_id, ATTR_MATCHES).await
    }

    /// Append-if-absent; running it twice leaves a single entry.
    pub async fn add_match_edge(&self, user_id: &str, other_id: &str) -> Result<(), StoreError> {
        self.append_to_list(user_id, ATTR_MATCHES, other_id).await
    }

    pub async fn remove_match_edge(&self, user_id: &str, other_id: &str) -> Result<(), StoreError> {
        self.remove_from_list(user_id, ATTR_MATCHES, other_id).await
    }

    pub async fn chats(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        self.string_list(user_id, ATTR_CHATS).await
    }

    pub async fn link_chat(&self, user_id: &str, chat_id: &str) -> Result<(), StoreError> {
        self.append_to_list(user_id, ATTR_CHATS, chat_id).await
    }

    pub async fn unlink_chat(&self, user_id: &str, chat_id: &str) -> Result<(), StoreError> {
        self.remove_from_list(user_id, ATTR_CHATS, chat_id).await
    }

    pub async fn blocked_users(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        self.string_list(user_id, "blockedUsers").await
    }

    pub async fn preference_vector(&self, user_id: &str) -> Result<Option<Vec<f64>>, StoreError> {
        let item = self.store.get(&self.table, &Self::key(user_id)).await?;
        Ok(item
            .and_then(|it| it.get("normalizedWeightedPrefs").cloned())
            .and_then(|v| match v {
                Value::Array(_) => serde_json::from_value(v).ok(),
                _ => None,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nesta_shared::clients::store::MemoryStore;

    const TABLE: &str = "user_profiles";

    async fn seed_profile(store: &MemoryStore, user_id: &str) {
        store
            .put(
                TABLE,
                serde_json::from_value(json!({ "userId": user_id })).unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn add_match_edge_is_idempotent() {
        let mem = Arc::new(MemoryStore::new());
        seed_profile(&mem, "u1").await;
        let profiles = ProfileStore::new(mem, TABLE);

        profiles.add_match_edge("u1", "u2").await.unwrap();
        profiles.add_match_edge("u1", "u2").await.unwrap();

        assert_eq!(profiles.matches("u1").await.unwrap(), vec!["u2".to_string()]);
    }

    #[tokio::test]
    async fn lists_default_to_empty_for_missing_profile() {
        let mem = Arc::new(MemoryStore::new());
        let profiles = ProfileStore::new(mem, TABLE);

        assert!(profiles.matches("ghost").await.unwrap().is_empty());
        assert!(profiles.blocked_users("ghost").await.unwrap().is_empty());
        assert!(profiles.preference_vector("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chat_link_and_unlink() {
        let mem = Arc::new(MemoryStore::new());
        seed_profile(&mem, "u1").await;
        let profiles = ProfileStore::new(mem, TABLE);

        profiles.link_chat("u1", "c1").await.unwrap();
        profiles.link_chat("u1", "c2").await.unwrap();
        profiles.link_chat("u1", "c1").await.unwrap();
        assert_eq!(
            profiles.chats("u1").await.unwrap(),
            vec!["c1".to_string(), "c2".to_string()]
        );

        profiles.unlink_chat("u1", "c1").await.unwrap();
        assert_eq!(profiles.chats("u1").await.unwrap(), vec!["c2".to_string()]);
    }

    #[tokio::test]
    async fn batch_get_drops_missing_profiles() {
        let mem = Arc::new(MemoryStore::new());
        seed_profile(&mem, "u1").await;
        let profiles = ProfileStore::new(mem, TABLE);

        let got = profiles
            .batch_get(&["u1".to_string(), "deleted".to_string()])
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].user_id, "u1");
    }
}
