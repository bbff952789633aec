use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use nesta_shared::errors::AppResult;
use nesta_shared::types::api::ApiResponse;

use crate::matching::rank::CandidateFilter;
use crate::models::Profile;
use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct CandidateQuery {
    pub gender: Option<String>,
    #[serde(default)]
    pub exclude_swiped: bool,
}

// ---------------------------------------------------------------------------
// GET /candidates/:user_id
// ---------------------------------------------------------------------------

pub async fn get_candidates(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<CandidateQuery>,
) -> AppResult<Json<ApiResponse<Vec<Profile>>>> {
    let filter = CandidateFilter {
        gender: query.gender,
        exclude_swiped: query.exclude_swiped,
    };

    let candidates = state.ranking.candidates_for(&user_id, &filter).await?;

    Ok(Json(ApiResponse::ok(candidates)))
}
