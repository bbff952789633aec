use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum AnnError {
    #[error("vector service request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Service(String),
}

/// K nearest user ids with their distances, in ascending distance order.
#[derive(Debug, Clone, Default)]
pub struct Nearest {
    pub user_ids: Vec<String>,
    pub distances: Vec<f32>,
}

/// Approximate-nearest-neighbor index over user preference vectors. The
/// production implementation is an HTTP sidecar; tests stub this trait.
#[async_trait]
pub trait AnnIndex: Send + Sync {
    async fn query_nearest(&self, vector: &[f64], top_k: usize) -> Result<Nearest, AnnError>;
}

/// HTTP client for the FAISS vector sidecar.
#[derive(Clone)]
pub struct VectorServiceClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f64],
    top_k: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<i64>,
    scores: Vec<f32>,
}

impl VectorServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AnnIndex for VectorServiceClient {
    async fn query_nearest(&self, vector: &[f64], top_k: usize) -> Result<Nearest, AnnError> {
        let resp: QueryResponse = self
            .http
            .post(format!("{}/query_matches", self.base_url))
            .json(&QueryRequest { vector, top_k })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // FAISS pads short result sets with id -1
        let mut nearest = Nearest::default();
        for (id, score) in resp.ids.into_iter().zip(resp.scores) {
            if id >= 0 {
                nearest.user_ids.push(id.to_string());
                nearest.distances.push(score);
            }
        }
        Ok(nearest)
    }
}
