//! HTTP transport: JSON-RPC on `POST /rpc` plus liveness routes

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::rpc::Dispatcher;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ping() -> &'static str {
    "PONG"
}

/// Envelope errors answer 400, notifications 204, everything else 200
/// (method-level failures travel inside the JSON-RPC body).
async fn rpc(State(dispatcher): State<Arc<Dispatcher>>, body: String) -> Response {
    match dispatcher.handle_text(&body).await {
        None => StatusCode::NO_CONTENT.into_response(),
        Some(response) if response.is_envelope_error() => {
            (StatusCode::BAD_REQUEST, Json(response)).into_response()
        }
        Some(response) => Json(response).into_response(),
    }
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health_check))
        .route("/rpc", post(rpc))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// Bind `0.0.0.0:port` and serve until `shutdown` resolves
pub async fn serve(
    dispatcher: Arc<Dispatcher>,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
