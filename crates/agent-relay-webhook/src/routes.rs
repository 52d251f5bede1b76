//! Webhook routes.

use std::sync::Arc;

use agent_relay_core::handler::{HandlerResponse, RelayContext};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// Build the relay router.
///
/// - `POST /webhook` takes the raw platform body, as an HTTP gateway would
///   pass it through, and maps the handler status onto the HTTP status.
/// - `POST /invoke` takes a structured invocation payload and returns the
///   `{statusCode, body}` response itself.
/// - `GET /health` answers `ok`.
pub fn router(ctx: Arc<RelayContext>) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/invoke", post(invoke))
        .route("/health", get(health))
        .with_state(ctx)
}

async fn webhook(State(ctx): State<Arc<RelayContext>>, body: Bytes) -> Response {
    let event = json!({ "body": String::from_utf8_lossy(&body) });
    into_http(ctx.handle(event).await)
}

async fn invoke(
    State(ctx): State<Arc<RelayContext>>,
    Json(event): Json<Value>,
) -> Json<HandlerResponse> {
    Json(ctx.handle(event).await)
}

async fn health() -> &'static str {
    "ok"
}

fn into_http(response: HandlerResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        response.body,
    )
        .into_response()
}
