use crate::{
    cache::BindingStore,
    config::MetricsConfig,
    metrics::{INGRESSES_TOTAL, encode_metrics},
};
use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Routes for `/metrics` and `/health`
#[must_use]
pub fn router(store: Arc<BindingStore>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(store)
}

/// Bind the metrics listener, returning the address actually bound
///
/// Without an explicit address `[::]` is tried first, then `0.0.0.0`.
///
/// # Errors
///
/// Returns an error if no socket can be bound
pub async fn bind(config: &MetricsConfig) -> anyhow::Result<(TcpListener, SocketAddr)> {
    let port = config.port;
    let listener = match config.listen {
        Some(addr) => TcpListener::bind(SocketAddr::new(addr, port)).await?,
        None => {
            if let Ok(listener) = TcpListener::bind(format!("[::]:{port}")).await {
                listener
            } else {
                TcpListener::bind(format!("0.0.0.0:{port}")).await?
            }
        }
    };

    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

/// Serve until `cancel` fires
///
/// # Errors
///
/// Returns an error if the server stops abnormally
pub async fn serve(
    listener: TcpListener,
    store: Arc<BindingStore>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(store).into_make_service())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("metrics server stopped");
    Ok(())
}

async fn metrics_handler(State(store): State<Arc<BindingStore>>) -> impl IntoResponse {
    INGRESSES_TOTAL.set(i64::try_from(store.len().await).unwrap_or(i64::MAX));

    match encode_metrics() {
        Ok(buffer) => (StatusCode::OK, buffer),
        Err(e) => {
            error!("{e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
