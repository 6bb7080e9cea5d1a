//! HTTP surface: one command endpoint and a liveness probe.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::dispatch::CommandDispatcher;

/// Path of the command endpoint.
pub const COMMAND_PATH: &str = "/api/telegram/mtproto";

/// Build the router. The body is decoded by the dispatcher, not by an axum
/// extractor, so malformed JSON still gets the failure envelope.
pub fn router(dispatcher: Arc<CommandDispatcher>) -> Router {
    Router::new()
        .route(COMMAND_PATH, post(command))
        .route("/health", get(health))
        .with_state(dispatcher)
}

async fn command(State(dispatcher): State<Arc<CommandDispatcher>>, body: Bytes) -> impl IntoResponse {
    let reply = dispatcher.handle_json(&body).await;
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.envelope))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
