//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to [`AppState`].

use axum::{
    extract::{Path, State},
    http::{header, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::response::api_success;
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::BridgeResult;
use crate::protocol_constants::SERVICE_ID;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct OnOffRequest {
    on: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{serial}", get(get_device))
        .route("/api/devices/{serial}/on-off", post(set_on_off))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "version": env!("CARGO_PKG_VERSION"),
        "devices": state.registry.len(),
    }))
}

async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "devices": state.devices() }))
}

async fn get_device(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> BridgeResult<impl IntoResponse> {
    Ok(api_success(state.device(&serial)?))
}

/// POST /api/devices/{serial}/on-off
///
/// Applies the command synchronously; appliance failures come back as 502.
async fn set_on_off(
    State(state): State<AppState>,
    Path(serial): Path<String>,
    Json(payload): Json<OnOffRequest>,
) -> BridgeResult<impl IntoResponse> {
    state.set_on_off(&serial, payload.on).await?;
    Ok(api_success(json!({ "serial": serial, "on": payload.on })))
}
