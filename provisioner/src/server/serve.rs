//! HTTP server setup

use std::future::Future;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::ProvisionError;
use crate::server::handlers::{hello_handler, status_handler};

/// Routes of the status service
pub fn router() -> Router {
    Router::new()
        .route("/", get(hello_handler))
        .route("/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
}

/// Serve the status service until `shutdown_signal` resolves
pub async fn serve(
    options: &ServerOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ProvisionError> {
    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting status server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ProvisionError::ServerError(format!("cannot bind {addr}: {e}")))?;

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ProvisionError::ServerError(e.to_string()))
}
