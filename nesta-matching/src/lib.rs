pub mod config;
pub mod events;
pub mod matching;
pub mod models;
pub mod queue;
pub mod routes;
pub mod store;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

use nesta_shared::clients::rabbitmq::RabbitMQClient;

use crate::matching::rank::RankingPipeline;
use crate::matching::saga::MatchSaga;
use crate::queue::SwipeQueue;
use crate::store::{ProfileStore, SwipeStore};

pub struct AppState {
    pub swipes: SwipeStore,
    pub profiles: ProfileStore,
    pub saga: MatchSaga,
    pub ranking: RankingPipeline,
    pub queue: SwipeQueue,
    pub rabbitmq: Option<RabbitMQClient>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/metrics", get(routes::health::metrics))
        .route("/swipes/left", post(routes::swipes::swipe_left))
        .route("/swipes/right", post(routes::swipes::swipe_right))
        .route("/swipes/history/:user_id", get(routes::swipes::swipe_history))
        .route("/candidates/:user_id", get(routes::candidates::get_candidates))
        .route("/matches/:user_id", get(routes::matches::get_matches))
        .route("/matches/:user_id/:other_id", delete(routes::matches::unmatch))
        .with_state(state)
}
