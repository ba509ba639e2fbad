use crate::app::acting_user;
use crate::state;
use crate::types::{DeviceKind, Subscription};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscribeRequest {
    pub(crate) id: String,
    pub(crate) endpoint: String,
    pub(crate) p256dh_key: String,
    pub(crate) auth_secret: String,
}

pub(crate) async fn subscribe(
    State(state): State<state::AppState>,
    headers: HeaderMap,
    Json(request): Json<SubscribeRequest>,
) -> StatusCode {
    let Some(username) = acting_user(&headers) else {
        return StatusCode::UNAUTHORIZED;
    };
    if request.id.trim().is_empty()
        || request.endpoint.trim().is_empty()
        || request.p256dh_key.trim().is_empty()
        || request.auth_secret.trim().is_empty()
    {
        return StatusCode::BAD_REQUEST;
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let subscription = Subscription {
        id: request.id,
        endpoint: request.endpoint,
        p256dh_key: request.p256dh_key,
        auth_secret: request.auth_secret,
        device_kind: DeviceKind::from_user_agent(user_agent),
    };
    state.subscriptions.create(subscription, &username);
    StatusCode::NO_CONTENT
}

pub(crate) async fn unsubscribe(
    State(state): State<state::AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> StatusCode {
    let Some(username) = acting_user(&headers) else {
        return StatusCode::UNAUTHORIZED;
    };
    state.subscriptions.delete(&id, &username);
    StatusCode::NO_CONTENT
}

pub(crate) async fn unsubscribe_all(
    State(state): State<state::AppState>,
    headers: HeaderMap,
) -> StatusCode {
    let Some(username) = acting_user(&headers) else {
        return StatusCode::UNAUTHORIZED;
    };
    state.subscriptions.delete_all(&username);
    StatusCode::NO_CONTENT
}
