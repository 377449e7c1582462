//! Startup wiring: bus, pool actor, gateway, and router.

use axum::Router;
use axum::routing::get;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api;
use crate::app_state::AppState;
use crate::config::GatewayConfig;
use crate::domain::EventBus;
use crate::gateway::Gateway;
use crate::service::ConnectionPool;
use crate::ws::handler::ws_handler;

/// Builds the bus, spawns the pool actor connected to the configured
/// default relays, and returns the handler state with the actor's handle.
#[must_use]
pub fn bootstrap(config: &GatewayConfig) -> (AppState, JoinHandle<()>) {
    let (bus, commands) = EventBus::new(config.command_queue_capacity, config.event_bus_capacity);
    let (mut pool, inbox) = ConnectionPool::new(bus.clone(), config.pool_settings());
    pool.add_relays(config.default_relays.iter().cloned());
    let status = pool.subscribe_status();
    info!(relays = config.default_relays.len(), "connection pool configured");

    let pool_task = tokio::spawn(pool.run(inbox, commands));
    let state = AppState {
        gateway: Gateway::new(bus),
        status,
    };
    (state, pool_task)
}

/// Builds the HTTP router: REST API, `/ws`, tracing and CORS layers.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    async fn status_of(uri: &str) -> StatusCode {
        let (state, _pool) = bootstrap(&GatewayConfig::default());
        let Ok(request) = Request::get(uri).body(Body::empty()) else {
            panic!("valid request");
        };
        let response = tokio_test::assert_ok!(build_app(state).oneshot(request).await);
        response.status()
    }

    #[tokio::test]
    async fn rest_routes_are_mounted() {
        assert_eq!(status_of("/health").await, StatusCode::OK);
        assert_eq!(status_of("/api/v1/relays").await, StatusCode::OK);
        assert_eq!(status_of("/api/v1/pools").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_route_requires_an_upgrade() {
        assert!(status_of("/ws").await.is_client_error());
    }
}
