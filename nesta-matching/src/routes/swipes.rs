use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use nesta_shared::errors::{AppError, AppResult, ErrorCode};
use nesta_shared::types::api::ApiResponse;

use crate::events::publisher;
use crate::matching::detect;
use crate::models::Direction;
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SwipePayload {
    pub swiper_id: String,
    pub target_id: String,
}

#[derive(Debug, Serialize)]
pub struct SwipeResponse {
    pub matched: bool,
    pub chat_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SwipeHistoryResponse {
    pub user_id: String,
    pub swiped_on: Vec<String>,
}

fn validate(payload: &SwipePayload) -> AppResult<()> {
    if payload.swiper_id.is_empty() || payload.target_id.is_empty() {
        return Err(AppError::bad_request("swiper_id and target_id are required"));
    }
    if payload.swiper_id == payload.target_id {
        return Err(AppError::bad_request("Cannot swipe on yourself"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// POST /swipes/left
// ---------------------------------------------------------------------------

pub async fn swipe_left(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SwipePayload>,
) -> AppResult<Json<ApiResponse<SwipeResponse>>> {
    validate(&payload)?;

    let swipe = state
        .swipes
        .new_swipe(&payload.swiper_id, &payload.target_id, Direction::Left);
    state.queue.enqueue(swipe)?;

    Ok(Json(ApiResponse::ok(SwipeResponse {
        matched: false,
        chat_id: None,
    })))
}

// ---------------------------------------------------------------------------
// POST /swipes/right
// ---------------------------------------------------------------------------

pub async fn swipe_right(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SwipePayload>,
) -> AppResult<Json<ApiResponse<SwipeResponse>>> {
    validate(&payload)?;

    let swipe = state
        .swipes
        .new_swipe(&payload.swiper_id, &payload.target_id, Direction::Right);
    state.queue.enqueue(swipe)?;

    let mutual =
        detect::is_mutual_right_swipe(&state.swipes, &payload.swiper_id, &payload.target_id)
            .await?;
    if !mutual {
        return Ok(Json(ApiResponse::ok(SwipeResponse {
            matched: false,
            chat_id: None,
        })));
    }

    let outcome = match state
        .saga
        .create_match(&payload.swiper_id, &payload.target_id)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(
                error = %err,
                swiper_id = %payload.swiper_id,
                target_id = %payload.target_id,
                "match creation failed, rolling back triggering swipe"
            );
            state
                .swipes
                .rollback(&payload.swiper_id, &payload.target_id, Direction::Right)
                .await?;
            return Err(AppError::new(
                ErrorCode::MatchRollback,
                "Match creation failed and the swipe was rolled back; please retry",
            ));
        }
    };

    if !outcome.already_matched {
        if let Some(rabbitmq) = &state.rabbitmq {
            publisher::publish_match_created(
                rabbitmq,
                &payload.swiper_id,
                &payload.target_id,
                &outcome.chat_id,
            )
            .await;
        }
    }

    Ok(Json(ApiResponse::ok(SwipeResponse {
        matched: true,
        chat_id: Some(outcome.chat_id),
    })))
}

// ---------------------------------------------------------------------------
// GET /swipes/history/:user_id
// ---------------------------------------------------------------------------

pub async fn swipe_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<SwipeHistoryResponse>>> {
    let swiped_on = state.swipes.swiped_on(&user_id).await?;

    Ok(Json(ApiResponse::ok(SwipeHistoryResponse {
        user_id,
        swiped_on,
    })))
}
