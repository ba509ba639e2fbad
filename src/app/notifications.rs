use crate::app::acting_user;
use crate::errors::NotificationError;
use crate::state;
use crate::types::{NotificationMessage, WebNotification};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

#[derive(Serialize)]
pub(crate) struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub(crate) public_key: String,
}

pub(crate) async fn public_key(
    State(state): State<state::AppState>,
) -> Result<Json<PublicKeyResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.engine.vapid_public_key() {
        Ok(public_key) => Ok(Json(PublicKeyResponse { public_key })),
        Err(err) => {
            tracing::warn!(error = %err, "VAPID public key unavailable");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "Push notifications are not available.".to_string(),
                }),
            ))
        }
    }
}

/// Host notification-event ingress: stores the event payload and schedules
/// the notify sweep.
pub(crate) async fn ingest(
    State(state): State<state::AppState>,
    Json(notification): Json<WebNotification>,
) -> StatusCode {
    let id = notification.id;
    state.directory.insert(notification);
    state.engine.schedule_notify(id);
    StatusCode::ACCEPTED
}

pub(crate) async fn withdraw(
    State(state): State<state::AppState>,
    Path(id): Path<u64>,
) -> StatusCode {
    state.engine.schedule_withdraw(id);
    StatusCode::ACCEPTED
}

pub(crate) async fn withdraw_all(
    State(state): State<state::AppState>,
    headers: HeaderMap,
) -> StatusCode {
    let Some(username) = acting_user(&headers) else {
        return StatusCode::UNAUTHORIZED;
    };
    state.engine.schedule_withdraw_all(&username);
    StatusCode::ACCEPTED
}

pub(crate) async fn view(
    State(state): State<state::AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<NotificationMessage>, (StatusCode, Json<ErrorResponse>)> {
    let Some(username) = acting_user(&headers) else {
        return Err(unauthorized());
    };
    state
        .engine
        .notification(id, &username)
        .map(Json)
        .map_err(error_response)
}

pub(crate) async fn action(
    State(state): State<state::AppState>,
    headers: HeaderMap,
    Path((id, action)): Path<(u64, String)>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let Some(username) = acting_user(&headers) else {
        return Err(unauthorized());
    };
    state
        .engine
        .update_notification(id, &action, &username)
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

fn unauthorized() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Missing acting user.".to_string(),
        }),
    )
}

fn error_response(err: NotificationError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        NotificationError::NotFound(_) => StatusCode::NOT_FOUND,
        NotificationError::AccessDenied(_) => StatusCode::FORBIDDEN,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
