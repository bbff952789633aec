use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use nesta_matching::config::AppConfig;
use nesta_matching::matching::rank::RankingPipeline;
use nesta_matching::matching::saga::MatchSaga;
use nesta_matching::queue::{QueueSettings, SwipeQueue};
use nesta_matching::store::{ChatStore, ProfileStore, SwipeStore};
use nesta_matching::AppState;
use nesta_shared::clients::dynamo::DynamoStore;
use nesta_shared::clients::rabbitmq::RabbitMQClient;
use nesta_shared::clients::store::{DocumentStore, MemoryStore};
use nesta_shared::clients::vector::{AnnIndex, VectorServiceClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    nesta_shared::middleware::init_tracing("nesta-matching");

    // Load configuration
    let config = AppConfig::load()?;
    let port = config.port;

    // Initialize Prometheus metrics
    let metrics_handle = nesta_shared::middleware::init_metrics();

    // Select the document store backend
    let store: Arc<dyn DocumentStore> = match config.store_backend.as_str() {
        "memory" => {
            tracing::warn!("using in-memory store backend; data will not survive restarts");
            Arc::new(MemoryStore::new())
        }
        _ => Arc::new(DynamoStore::connect().await),
    };

    // Connect to RabbitMQ (degraded mode without it)
    let rabbitmq = match RabbitMQClient::connect(&config.rabbitmq_url).await {
        Ok(client) => {
            tracing::info!(url = %config.rabbitmq_url, "connected to RabbitMQ");
            Some(client)
        }
        Err(e) => {
            tracing::warn!(error = %e, "RabbitMQ unavailable, events will not be published");
            None
        }
    };

    let swipes = SwipeStore::new(store.clone(), &config.swipes_table, config.retention_months);
    let profiles = ProfileStore::new(store.clone(), &config.profiles_table);
    let chats = ChatStore::new(store.clone(), &config.chats_table, &config.messages_table);

    let saga = MatchSaga::new(store.clone(), &config.intents_table, profiles.clone(), chats);

    let ann: Arc<dyn AnnIndex> = Arc::new(VectorServiceClient::new(&config.vector_service_url));
    let ranking = RankingPipeline::new(
        profiles.clone(),
        swipes.clone(),
        ann,
        config.ranking_top_k,
    );

    // Spawn the single queue consumer before accepting traffic
    let settings = QueueSettings {
        tick: Duration::from_millis(config.queue_tick_ms),
        backoff: Duration::from_millis(config.queue_backoff_ms),
        capacity: config.queue_capacity,
        max_attempts: config.queue_max_attempts,
        store_timeout: Duration::from_millis(config.store_timeout_ms),
    };
    let (queue, consumer) = SwipeQueue::new(swipes.clone(), rabbitmq.clone(), settings);
    tokio::spawn(consumer.run());

    // Build shared state
    let state = Arc::new(AppState {
        swipes,
        profiles,
        saga,
        ranking,
        queue,
        rabbitmq,
        metrics_handle,
    });

    // Build router
    let app = nesta_matching::router(state)
        .layer(middleware::from_fn(
            nesta_shared::middleware::metrics_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "nesta-matching starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
