//! Relay status handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::RelayListResponse;
use crate::app_state::AppState;

/// `GET /relays` — Configured relays and their connection status.
///
/// Reads the pool's latest snapshot; unlike `PULL_STATUS` it broadcasts
/// nothing to WebSocket clients.
#[utoipa::path(
    get,
    path = "/api/v1/relays",
    tag = "Relays",
    summary = "Relay status",
    description = "Returns the configured relays, the active relay set, and which relays the pool is connected to.",
    responses(
        (status = 200, description = "Current relay status", body = RelayListResponse),
    )
)]
pub async fn list_relays(State(state): State<AppState>) -> impl IntoResponse {
    let response = RelayListResponse::from(&*state.status.borrow());
    (StatusCode::OK, Json(response))
}

/// Relay routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/relays", get(list_relays))
}
