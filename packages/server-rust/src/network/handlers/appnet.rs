//! Application network endpoints: service proxies and connections.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use netplane_core::messages::{
    AddConnectionRequest, InboundServiceProxyRequest, OutboundServiceRequest,
    RemoveConnectionRequest, ZtConnectionRequest,
};
use netplane_core::ConnectionRecord;
use serde_json::Value;

use super::error::{ok, payload, ApiResult};
use super::AppState;

pub async fn register_inbound(
    State(state): State<AppState>,
    body: Result<Json<InboundServiceProxyRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let request = payload(body)?;
    state
        .services
        .appnet
        .register_inbound_service_proxy(&request)
        .await?;
    Ok(ok())
}

pub async fn register_outbound(
    State(state): State<AppState>,
    body: Result<Json<OutboundServiceRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let request = payload(body)?;
    state.services.appnet.register_outbound_proxy(&request).await?;
    Ok(ok())
}

/// Returns the recorded connection, including its network id.
pub async fn add_connection(
    State(state): State<AppState>,
    body: Result<Json<AddConnectionRequest>, JsonRejection>,
) -> ApiResult<ConnectionRecord> {
    let request = payload(body)?;
    Ok(Json(state.services.appnet.add_connection(&request).await?))
}

pub async fn remove_connection(
    State(state): State<AppState>,
    body: Result<Json<RemoveConnectionRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let request = payload(body)?;
    state.services.appnet.remove_connection(&request).await?;
    Ok(ok())
}

pub async fn register_zt_connection(
    State(state): State<AppState>,
    body: Result<Json<ZtConnectionRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let request = payload(body)?;
    state.services.appnet.register_zt_connection(&request).await?;
    Ok(ok())
}
