//! HTTP server for the Prometheus metrics endpoint.
//!
//! Runs on its own tokio task and serves `/metrics` for scraping.

use axum::{Router, routing::get};
use std::net::SocketAddr;

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve `/metrics` on `0.0.0.0:port` until the process exits.
pub async fn run_http_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind metrics server");
            return;
        }
    };
    tracing::info!(%addr, "Prometheus HTTP server listening");

    if let Err(e) = axum::serve(listener, router()).await {
        tracing::error!(error = %e, "Metrics server error");
    }
}
