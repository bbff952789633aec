use nesta_shared::clients::store::StoreError;

use crate::store::SwipeStore;

/// Reciprocity check for a swipe-right by `swiper_id` on `target_id`: has the
/// target already right-swiped the swiper within the retention window?
///
/// This reads the same table the ingestion queue writes to, so a right swipe
/// still sitting in the queue is invisible here. The relation gets evaluated
/// again from the other side once that swipe flushes, which is why a missed
/// detection at this instant is tolerable.
pub async fn is_mutual_right_swipe(
    swipes: &SwipeStore,
    swiper_id: &str,
    target_id: &str,
) -> Result<bool, StoreError> {
    swipes.has_right_swipe(target_id, swiper_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use chrono::Utc;
    use nesta_shared::clients::store::MemoryStore;
    use std::sync::Arc;

    fn swipe_store() -> SwipeStore {
        SwipeStore::new(Arc::new(MemoryStore::new()), "swipe_logs", 2)
    }

    #[tokio::test]
    async fn detects_prior_right_swipe_from_target() {
        let swipes = swipe_store();
        let prior = crate::models::Swipe {
            swiper_id: "u2".into(),
            target_id: "u1".into(),
            direction: Direction::Right,
            timestamp_micros: Utc::now().timestamp_micros(),
            expires_at: 0,
        };
        swipes.record(&prior).await.unwrap();

        assert!(is_mutual_right_swipe(&swipes, "u1", "u2").await.unwrap());
        // Not symmetric: u2's swipe on u1 alone doesn't make u2's view mutual
        assert!(!is_mutual_right_swipe(&swipes, "u2", "u1").await.unwrap());
    }

    #[tokio::test]
    async fn left_swipe_is_not_mutual_interest() {
        let swipes = swipe_store();
        let prior = crate::models::Swipe {
            swiper_id: "u2".into(),
            target_id: "u1".into(),
            direction: Direction::Left,
            timestamp_micros: Utc::now().timestamp_micros(),
            expires_at: 0,
        };
        swipes.record(&prior).await.unwrap();

        assert!(!is_mutual_right_swipe(&swipes, "u1", "u2").await.unwrap());
    }

    #[tokio::test]
    async fn no_history_is_not_mutual() {
        let swipes = swipe_store();
        assert!(!is_mutual_right_swipe(&swipes, "u1", "u2").await.unwrap());
    }
}
