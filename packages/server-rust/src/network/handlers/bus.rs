//! Publish endpoints feeding the in-process bus.
//!
//! The body is published as-is. Decoding happens in the dispatcher, so a
//! message of an unknown kind is accepted here and dropped there.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use netplane_core::ServiceError;
use serde_json::{json, Value};
use tracing::debug;

use super::error::ApiResult;
use super::AppState;
use crate::dispatcher::ChannelPublisher;

async fn publish(publisher: &ChannelPublisher, body: Bytes) -> ApiResult<Value> {
    if body.is_empty() {
        return Err(ServiceError::invalid_argument("message body cannot be empty").into());
    }
    let id = publisher.publish(body.to_vec()).await.map_err(|e| {
        ServiceError::unavailable(format!("topic {}: {e}", publisher.topic()))
    })?;
    debug!(topic = publisher.topic(), message_id = %id, "message published");
    Ok(Json(json!({ "ok": true, "messageId": id.to_string() })))
}

/// `POST /api/v1/bus/network-ops`
pub async fn publish_network_op(State(state): State<AppState>, body: Bytes) -> ApiResult<Value> {
    publish(&state.services.network_ops, body).await
}

/// `POST /api/v1/bus/application-events`
pub async fn publish_application_event(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Value> {
    publish(&state.services.application_events, body).await
}
