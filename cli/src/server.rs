//! HTTP API: health and rewards summaries.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use stakeindex_core::{BlockStore, IndexerError, RewardStore, RewardSummary, RewardsParams};

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Maps core errors onto HTTP statuses.
pub struct ApiError(IndexerError);

impl From<IndexerError> for ApiError {
    fn from(e: IndexerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            IndexerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            IndexerError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    last_canonical_height: Option<u64>,
}

async fn health<S>(State(store): State<Arc<S>>) -> Result<Json<Health>, ApiError>
where
    S: BlockStore + RewardStore + 'static,
{
    Ok(Json(Health {
        status: "ok",
        last_canonical_height: store.last_canonical_height().await?,
    }))
}

async fn rewards<S>(
    State(store): State<Arc<S>>,
    Query(params): Query<RewardsParams>,
) -> Result<Json<Vec<RewardSummary>>, ApiError>
where
    S: BlockStore + RewardStore + 'static,
{
    let query = params.validate()?;
    Ok(Json(store.rewards_summary(&query).await?))
}

pub fn router<S>(store: Arc<S>) -> Router
where
    S: BlockStore + RewardStore + 'static,
{
    Router::new()
        .route("/health", get(health::<S>))
        .route("/rewards", get(rewards::<S>))
        .layer(CorsLayer::permissive())
        .with_state(store)
}

/// Serve the API until `cancel` fires.
pub async fn serve<S>(store: Arc<S>, addr: &str, cancel: CancellationToken) -> anyhow::Result<()>
where
    S: BlockStore + RewardStore + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "API server listening");
    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    tracing::info!("API server stopped");
    Ok(())
}
