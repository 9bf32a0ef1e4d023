//! Exposes the metrics registry for scraping over plain HTTP (§10.3). Kept
//! deliberately separate from the ingestion pipeline: binding or serving
//! failures here are logged and never propagate into a chain's tick loop.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use crate::metrics::Metrics;

/// Serves `GET /metrics` (Prometheus text exposition format) until the
/// listener is dropped or the server itself errors.
pub async fn serve(listener: TcpListener, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler)).with_state(metrics);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    let mut buf = String::new();
    if let Err(error) = prometheus_client::encoding::text::encode(&mut buf, metrics.registry()) {
        tracing::error!(%error, "failed to encode metrics registry");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/openmetrics-text; version=1.0.0; charset=utf-8")],
        buf,
    )
        .into_response()
}
