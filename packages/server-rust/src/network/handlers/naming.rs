//! DNS entry endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use netplane_core::messages::{AddDnsEntryRequest, DeleteDnsEntryRequest, OrganizationKey};
use netplane_core::DnsEntry;
use serde_json::{json, Value};

use super::error::{ok, payload, ApiResult};
use super::AppState;

pub async fn add_entry(
    State(state): State<AppState>,
    body: Result<Json<AddDnsEntryRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let request = payload(body)?;
    state.services.naming.add_entry(&request).await?;
    Ok(ok())
}

/// Responds with `{"ok": true, "removed": n}`.
pub async fn delete_entry(
    State(state): State<AppState>,
    body: Result<Json<DeleteDnsEntryRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let request = payload(body)?;
    let removed = state.services.naming.delete_entry(&request).await?;
    Ok(Json(json!({ "ok": true, "removed": removed })))
}

/// `GET /api/v1/dns/{organization_id}`
pub async fn list_entries(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> ApiResult<Vec<DnsEntry>> {
    let key = OrganizationKey { organization_id };
    Ok(Json(state.services.naming.list_entries(&key).await?))
}
