use std::collections::HashSet;
use std::sync::Arc;

use nesta_shared::clients::store::StoreError;
use nesta_shared::clients::vector::AnnIndex;

use crate::models::{Candidate, Profile};
use crate::store::{ProfileStore, SwipeStore};

/// Caller-supplied filters for a candidate request.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    /// `None` or `"All"` (any case) disables the gender filter.
    pub gender: Option<String>,
    /// Drop users the requester already swiped on within the retention
    /// window.
    pub exclude_swiped: bool,
}

/// Candidate ranking: ANN retrieval picks the pool, business rules pick the
/// order. Similarity only decides who is considered, never the final ranking.
#[derive(Clone)]
pub struct RankingPipeline {
    profiles: ProfileStore,
    swipes: SwipeStore,
    ann: Arc<dyn AnnIndex>,
    top_k: usize,
}

impl RankingPipeline {
    pub fn new(
        profiles: ProfileStore,
        swipes: SwipeStore,
        ann: Arc<dyn AnnIndex>,
        top_k: usize,
    ) -> Self {
        Self {
            profiles,
            swipes,
            ann,
            top_k,
        }
    }

    /// Produces the ordered candidate list for a user. An empty result is a
    /// normal outcome: no preferences, no neighbors, or everything filtered.
    pub async fn candidates_for(
        &self,
        user_id: &str,
        filter: &CandidateFilter,
    ) -> Result<Vec<Profile>, StoreError> {
        let Some(vector) = self.profiles.preference_vector(user_id).await? else {
            return Ok(Vec::new());
        };
        if vector.is_empty() {
            return Ok(Vec::new());
        }

        let nearest = match self.ann.query_nearest(&vector, self.top_k).await {
            Ok(nearest) => nearest,
            Err(err) => {
                // Degrade to an empty deck rather than failing the request
                tracing::warn!(error = %err, user_id, "ANN query failed, returning no candidates");
                return Ok(Vec::new());
            }
        };
        if nearest.user_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Stale index entries resolve to nothing here and drop out
        let pool = self.profiles.batch_get(&nearest.user_ids).await?;

        let blocked = self.profiles.blocked_users(user_id).await?;
        let swiped: HashSet<String> = if filter.exclude_swiped {
            self.swipes.swiped_on(user_id).await?.into_iter().collect()
        } else {
            HashSet::new()
        };
        let filtered = apply_filters(pool, user_id, &blocked, &swiped, filter.gender.as_deref());

        let likers: HashSet<String> = match self.swipes.right_swipers_on(user_id).await {
            Ok(ids) => ids.into_iter().collect(),
            Err(err) => {
                // Reciprocal interest is a ranking signal, not a correctness
                // requirement; rank on recency alone if it is unavailable
                tracing::warn!(error = %err, user_id, "failed to load right-swipers, ranking without reciprocity");
                HashSet::new()
            }
        };

        let candidates = filtered
            .into_iter()
            .map(|profile| {
                let liked_by_candidate = likers.contains(&profile.user_id);
                let last_active_micros = profile
                    .last_active
                    .map(|t| t.timestamp_micros())
                    .unwrap_or(i64::MIN);
                Candidate {
                    profile,
                    liked_by_candidate,
                    last_active_micros,
                }
            })
            .collect();

        Ok(rank(candidates))
    }
}

/// Removes the requester, blocked users, already-swiped users, and gender
/// mismatches. Retrieval order is preserved.
fn apply_filters(
    pool: Vec<Profile>,
    user_id: &str,
    blocked: &[String],
    swiped: &HashSet<String>,
    gender: Option<&str>,
) -> Vec<Profile> {
    let gender_filter = gender.filter(|g| !g.eq_ignore_ascii_case("All"));
    pool.into_iter()
        .filter(|p| p.user_id != user_id)
        .filter(|p| !blocked.contains(&p.user_id))
        .filter(|p| !swiped.contains(&p.user_id))
        .filter(|p| match gender_filter {
            Some(g) => p.gender.eq_ignore_ascii_case(g),
            None => true,
        })
        .collect()
}

/// Reciprocal interest first, then most recently active; the sort is stable,
/// so equal keys keep their retrieval order.
fn rank(mut candidates: Vec<Candidate>) -> Vec<Profile> {
    candidates.sort_by(|a, b| {
        b.liked_by_candidate
            .cmp(&a.liked_by_candidate)
            .then(b.last_active_micros.cmp(&a.last_active_micros))
    });
    candidates.into_iter().map(|c| c.profile).collect()
}
