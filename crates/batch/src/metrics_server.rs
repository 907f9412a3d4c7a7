//! Metrics HTTP server
//!
//! Exposes the batch snapshot as JSON for dashboards and scripts polling a
//! long batch.

use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use thiserror::Error;
use tracing::info;

use crate::metrics::{BatchSnapshot, SharedSnapshot};

/// Errors that can occur when running the metrics server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Handler for GET /metrics
async fn get_metrics(State(snapshot): State<SharedSnapshot>) -> Json<BatchSnapshot> {
    let snapshot = snapshot.read().await.clone();
    Json(snapshot)
}

/// Creates the axum Router with the metrics endpoint
pub fn create_metrics_router(snapshot: SharedSnapshot) -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .with_state(snapshot)
}

/// Serve `GET /metrics` on `addr` until the task is dropped or aborted
pub async fn run_metrics_server(
    snapshot: SharedSnapshot,
    addr: SocketAddr,
) -> Result<(), ServerError> {
    let app = create_metrics_router(snapshot);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "metrics server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
