//! Overlay network endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use netplane_core::messages::{
    AddNetworkRequest, MemberRequest, NetworkKey, OrganizationKey, ZtConnectionRequest,
};
use netplane_core::Network;
use serde_json::Value;

use super::error::{ok, payload, ApiResult};
use super::AppState;

/// `POST /api/v1/networks`: returns the created network.
pub async fn add_network(
    State(state): State<AppState>,
    body: Result<Json<AddNetworkRequest>, JsonRejection>,
) -> ApiResult<Network> {
    let request = payload(body)?;
    Ok(Json(state.services.network.add_network(&request).await?))
}

/// `GET /api/v1/networks?organizationId=...`
pub async fn list_networks(
    State(state): State<AppState>,
    Query(request): Query<OrganizationKey>,
) -> ApiResult<Vec<Network>> {
    Ok(Json(state.services.network.list_networks(&request).await?))
}

/// `GET /api/v1/networks/{organization_id}/{network_id}`
pub async fn get_network(
    State(state): State<AppState>,
    Path((organization_id, network_id)): Path<(String, String)>,
) -> ApiResult<Network> {
    let key = NetworkKey {
        organization_id,
        network_id,
    };
    Ok(Json(state.services.network.get_network(&key).await?))
}

/// `DELETE /api/v1/networks/{organization_id}/{network_id}`
pub async fn delete_network(
    State(state): State<AppState>,
    Path((organization_id, network_id)): Path<(String, String)>,
) -> ApiResult<Value> {
    let key = NetworkKey {
        organization_id,
        network_id,
    };
    state.services.network.delete_network(&key).await?;
    Ok(ok())
}

pub async fn authorize_member(
    State(state): State<AppState>,
    body: Result<Json<MemberRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let request = payload(body)?;
    state.services.network.authorize_member(&request).await?;
    Ok(ok())
}

pub async fn disauthorize_member(
    State(state): State<AppState>,
    body: Result<Json<MemberRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let request = payload(body)?;
    state.services.network.disauthorize_member(&request).await?;
    Ok(ok())
}

pub async fn join_network(
    State(state): State<AppState>,
    body: Result<Json<MemberRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let request = payload(body)?;
    state.services.network.join_network(&request).await?;
    Ok(ok())
}

/// Authorizes a member on an application connection network.
pub async fn authorize_zt_connection(
    State(state): State<AppState>,
    body: Result<Json<ZtConnectionRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let request = payload(body)?;
    state.services.appnet.authorize_zt_connection(&request).await?;
    Ok(ok())
}
