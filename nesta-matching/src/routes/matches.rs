use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use nesta_shared::errors::AppResult;
use nesta_shared::types::api::ApiResponse;

use crate::events::publisher;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MatchListResponse {
    pub user_id: String,
    pub matches: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UnmatchResponse {
    pub removed_chat_id: Option<String>,
}

// ---------------------------------------------------------------------------
// GET /matches/:user_id
// ---------------------------------------------------------------------------

pub async fn get_matches(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<MatchListResponse>>> {
    let matches = state.profiles.matches(&user_id).await?;

    Ok(Json(ApiResponse::ok(MatchListResponse { user_id, matches })))
}

// ---------------------------------------------------------------------------
// DELETE /matches/:user_id/:other_id
// ---------------------------------------------------------------------------

pub async fn unmatch(
    State(state): State<Arc<AppState>>,
    Path((user_id, other_id)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<UnmatchResponse>>> {
    let removed_chat_id = state.saga.remove_match(&user_id, &other_id).await?;

    if let Some(rabbitmq) = &state.rabbitmq {
        publisher::publish_match_removed(
            rabbitmq,
            &user_id,
            &other_id,
            removed_chat_id.as_deref(),
        )
        .await;
    }

    Ok(Json(ApiResponse::ok(UnmatchResponse { removed_chat_id })))
}
