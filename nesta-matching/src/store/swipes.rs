use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use serde_json::Value;

use nesta_shared::clients::store::{DocumentStore, Key, Query, StoreError};

use crate::models::{Direction, Swipe};

const ATTR_SWIPER: &str = "userId";
const ATTR_TARGET: &str = "swipedOnUserId";
const ATTR_DIRECTION: &str = "direction";
const ATTR_TIMESTAMP: &str = "timestamp";
const TARGET_INDEX: &str = "swipedOnUserId-index";

static LAST_TIMESTAMP: AtomicI64 = AtomicI64::new(0);

/// Microsecond timestamp: wall-clock millis scaled up, bumped past the last
/// issued value so two swipes in the same millisecond never share a
/// (swiper, timestamp) composite key.
pub fn next_timestamp_micros(now: DateTime<Utc>) -> i64 {
    let candidate = now.timestamp_millis() * 1000;
    LAST_TIMESTAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(candidate.max(last + 1))
        })
        .map(|last| candidate.max(last + 1))
        .unwrap_or(candidate)
}

/// Adapter over the swipe log table.
#[derive(Clone)]
pub struct SwipeStore {
    store: Arc<dyn DocumentStore>,
    table: String,
    retention_months: u32,
}

impl SwipeStore {
    pub fn new(store: Arc<dyn DocumentStore>, table: impl Into<String>, retention_months: u32) -> Self {
        Self {
            store,
            table: table.into(),
            retention_months,
        }
    }

    /// Earliest timestamp still considered valid, recomputed per call.
    pub fn retention_floor_micros(&self, now: DateTime<Utc>) -> i64 {
        now.checked_sub_months(Months::new(self.retention_months))
            .unwrap_or(now)
            .timestamp_micros()
    }

    /// Builds a swipe stamped with the current time and the retention-window
    /// expiry the TTL sweeper keys on.
    pub fn new_swipe(&self, swiper_id: &str, target_id: &str, direction: Direction) -> Swipe {
        let now = Utc::now();
        let expires = now
            .checked_add_months(Months::new(self.retention_months))
            .unwrap_or(now);
        Swipe {
            swiper_id: swiper_id.to_string(),
            target_id: target_id.to_string(),
            direction,
            timestamp_micros: next_timestamp_micros(now),
            expires_at: expires.timestamp(),
        }
    }

    pub async fn record(&self, swipe: &Swipe) -> Result<(), StoreError> {
        self.store.put(&self.table, swipe.to_item()).await
    }

    /// Target ids this user has swiped on (either direction) inside the
    /// retention window, deduplicated in first-seen order.
    pub async fn swiped_on(&self, swiper_id: &str) -> Result<Vec<String>, StoreError> {
        let floor = self.retention_floor_micros(Utc::now());
        let items = self
            .store
            .query(
                &self.table,
                Query::on_partition(ATTR_SWIPER, swiper_id).sort_after(ATTR_TIMESTAMP, floor),
            )
            .await?;

        let mut seen = Vec::new();
        for item in items {
            if let Some(Value::String(target)) = item.get(ATTR_TARGET) {
                if !seen.contains(target) {
                    seen.push(target.clone());
                }
            }
        }
        Ok(seen)
    }

    /// True if `swiper_id` right-swiped `target_id` within the retention
    /// window.
    pub async fn has_right_swipe(
        &self,
        swiper_id: &str,
        target_id: &str,
    ) -> Result<bool, StoreError> {
        let floor = self.retention_floor_micros(Utc::now());
        let items = self
            .store
            .query(
                &self.table,
                Query::on_partition(ATTR_SWIPER, swiper_id)
                    .sort_after(ATTR_TIMESTAMP, floor)
                    .filter_eq(ATTR_DIRECTION, Direction::Right.as_str()),
            )
            .await?;

        Ok(items
            .iter()
            .any(|item| item.get(ATTR_TARGET) == Some(&Value::String(target_id.to_string()))))
    }

    /// Ids of users who right-swiped the given target; feeds the
    /// reciprocal-interest signal in ranking.
    pub async fn right_swipers_on(&self, target_id: &str) -> Result<Vec<String>, StoreError> {
        let items = self
            .store
            .query(
                &self.table,
                Query::on_partition(ATTR_TARGET, target_id)
                    .filter_eq(ATTR_DIRECTION, Direction::Right.as_str())
                    .on_index(TARGET_INDEX),
            )
            .await?;

        Ok(items
            .into_iter()
            .filter_map(|item| match item.get(ATTR_SWIPER) {
                Some(Value::String(id)) => Some(id.clone()),
                _ => None,
            })
            .collect())
    }

    /// Deletes the most recent swipe matching (swiper, target, direction).
    /// Used to undo the triggering swipe when match creation fails.
    pub async fn rollback(
        &self,
        swiper_id: &str,
        target_id: &str,
        direction: Direction,
    ) -> Result<(), StoreError> {
        let items = self
            .store
            .query(
                &self.table,
                Query::on_partition(ATTR_SWIPER, swiper_id)
                    .filter_eq(ATTR_TARGET, target_id)
                    .filter_eq(ATTR_DIRECTION, direction.as_str())
                    .descending()
                    .limit(1),
            )
            .await?;

        let Some(item) = items.into_iter().next() else {
            tracing::warn!(
                swiper_id,
                target_id,
                "no matching swipe found to roll back"
            );
            return Ok(());
        };

        let timestamp = item
            .get(ATTR_TIMESTAMP)
            .cloned()
            .unwrap_or(Value::Null);
        self.store
            .delete(
                &self.table,
                &Key::partition(ATTR_SWIPER, swiper_id).with_sort(ATTR_TIMESTAMP, timestamp),
            )
            .await
    }

    /// Deletes every swipe made by or on the user (account deletion path).
    pub async fn purge_user(&self, user_id: &str) -> Result<(), StoreError> {
        let by_user = self
            .store
            .query(&self.table, Query::on_partition(ATTR_SWIPER, user_id))
            .await?;
        let on_user = self
            .store
            .query(
                &self.table,
                Query::on_partition(ATTR_TARGET, user_id).on_index(TARGET_INDEX),
            )
            .await?;

        for item in by_user.into_iter().chain(on_user) {
            let (Some(swiper), Some(ts)) = (item.get(ATTR_SWIPER), item.get(ATTR_TIMESTAMP))
            else {
                continue;
            };
            self.store
                .delete(
                    &self.table,
                    &Key::partition(ATTR_SWIPER, swiper.clone())
                        .with_sort(ATTR_TIMESTAMP, ts.clone()),
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nesta_shared::clients::store::MemoryStore;

    const TABLE: &str = "swipe_logs";

    fn swipe_store(store: Arc<MemoryStore>) -> SwipeStore {
        SwipeStore::new(store, TABLE, 2)
    }

    fn swipe_at(swiper: &str, target: &str, direction: Direction, ts: i64) -> Swipe {
        Swipe {
            swiper_id: swiper.into(),
            target_id: target.into(),
            direction,
            timestamp_micros: ts,
            expires_at: 0,
        }
    }

    #[test]
    fn timestamps_strictly_increase_within_a_millisecond() {
        let now = Utc::now();
        let a = next_timestamp_micros(now);
        let b = next_timestamp_micros(now);
        let c = next_timestamp_micros(now);
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn retention_floor_excludes_old_swipes() {
        let mem = Arc::new(MemoryStore::new());
        let swipes = swipe_store(mem);
        let floor = swipes.retention_floor_micros(Utc::now());

        swipes
            .record(&swipe_at("u1", "old", Direction::Right, floor - 1))
            .await
            .unwrap();
        swipes
            .record(&swipe_at("u1", "recent", Direction::Right, floor + 60_000_000))
            .await
            .unwrap();

        let seen = swipes.swiped_on("u1").await.unwrap();
        assert_eq!(seen, vec!["recent".to_string()]);
        assert!(swipes.has_right_swipe("u1", "recent").await.unwrap());
        assert!(!swipes.has_right_swipe("u1", "old").await.unwrap());
    }

    #[tokio::test]
    async fn swiped_on_deduplicates_targets() {
        let mem = Arc::new(MemoryStore::new());
        let swipes = swipe_store(mem);
        let base = Utc::now().timestamp_micros();

        swipes
            .record(&swipe_at("u1", "u2", Direction::Left, base))
            .await
            .unwrap();
        swipes
            .record(&swipe_at("u1", "u2", Direction::Right, base + 1))
            .await
            .unwrap();
        swipes
            .record(&swipe_at("u1", "u3", Direction::Right, base + 2))
            .await
            .unwrap();

        let seen = swipes.swiped_on("u1").await.unwrap();
        assert_eq!(seen, vec!["u2".to_string(), "u3".to_string()]);
    }

    #[tokio::test]
    async fn left_swipe_does_not_count_as_right() {
        let mem = Arc::new(MemoryStore::new());
        let swipes = swipe_store(mem);
        let base = Utc::now().timestamp_micros();

        swipes
            .record(&swipe_at("u1", "u2", Direction::Left, base))
            .await
            .unwrap();
        assert!(!swipes.has_right_swipe("u1", "u2").await.unwrap());
    }

    #[tokio::test]
    async fn rollback_deletes_only_most_recent_matching_swipe() {
        let mem = Arc::new(MemoryStore::new());
        let swipes = swipe_store(mem.clone());
        let base = Utc::now().timestamp_micros();

        swipes
            .record(&swipe_at("u1", "u2", Direction::Right, base))
            .await
            .unwrap();
        swipes
            .record(&swipe_at("u1", "u2", Direction::Right, base + 5))
            .await
            .unwrap();
        swipes
            .record(&swipe_at("u1", "u3", Direction::Right, base + 10))
            .await
            .unwrap();

        swipes.rollback("u1", "u2", Direction::Right).await.unwrap();

        assert_eq!(mem.len(TABLE), 2);
        // The older u2 swipe survives
        assert!(swipes.has_right_swipe("u1", "u2").await.unwrap());
        assert!(swipes.has_right_swipe("u1", "u3").await.unwrap());
    }

    #[tokio::test]
    async fn rollback_with_no_match_is_a_noop() {
        let mem = Arc::new(MemoryStore::new());
        let swipes = swipe_store(mem);
        swipes.rollback("u1", "u2", Direction::Right).await.unwrap();
    }

    #[tokio::test]
    async fn purge_removes_swipes_in_both_directions() {
        let mem = Arc::new(MemoryStore::new());
        let swipes = swipe_store(mem.clone());
        let base = Utc::now().timestamp_micros();

        swipes
            .record(&swipe_at("u1", "u2", Direction::Right, base))
            .await
            .unwrap();
        swipes
            .record(&swipe_at("u3", "u1", Direction::Left, base + 1))
            .await
            .unwrap();
        swipes
            .record(&swipe_at("u3", "u4", Direction::Right, base + 2))
            .await
            .unwrap();

        swipes.purge_user("u1").await.unwrap();
        assert_eq!(mem.len(TABLE), 1);
    }
}
