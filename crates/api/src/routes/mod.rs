//! API routes

pub mod webhooks;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{
    auth::{require_operator_secret, require_webhook_secret},
    state::AppState,
};

pub fn create_router(state: AppState) -> Router {
    let ingress = Router::new()
        .route("/api/webhooks/kiwify", post(webhooks::receive_webhook))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_webhook_secret,
        ));

    let operator = Router::new()
        .route("/api/webhooks/kiwify/events", get(webhooks::list_events))
        .route(
            "/api/webhooks/kiwify/events/{id}/replay",
            post(webhooks::replay_event),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_operator_secret,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(ingress)
        .merge(operator)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
