use crate::state;

use axum::Router;
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};

mod notifications;
mod subscriptions;

/// Host-facing HTTP adapter around the engine. The acting username comes from
/// the `x-user` header injected by the host's auth proxy.
pub(crate) fn router(state: state::AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/push/key", get(notifications::public_key))
        .route(
            "/push/subscriptions",
            post(subscriptions::subscribe).delete(subscriptions::unsubscribe_all),
        )
        .route(
            "/push/subscriptions/{id}",
            delete(subscriptions::unsubscribe),
        )
        .route(
            "/push/notifications",
            post(notifications::ingest).delete(notifications::withdraw_all),
        )
        .route(
            "/push/notifications/{id}",
            get(notifications::view).delete(notifications::withdraw),
        )
        .route(
            "/push/notifications/{id}/actions/{action}",
            post(notifications::action),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

pub(crate) fn acting_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|username| !username.is_empty())
        .map(str::to_string)
}
