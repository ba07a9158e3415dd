//! Client for the system-model directory service.

use async_trait::async_trait;
use netplane_core::messages::{RemoveConnectionRequest, ServiceStatusUpdate};
use netplane_core::{
    ClusterInfo, ConnectionRecord, Directory, ErrorKind, InboundProxyRecord, ServiceResult,
};
use reqwest::{Client, Url};

use super::http::{endpoint, endpoint_segments, send_empty, send_json};

/// [`Directory`] over the directory's JSON API.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: Client,
    base_url: Url,
}

impl HttpDirectory {
    #[must_use]
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn organization_exists(&self, organization_id: &str) -> ServiceResult<bool> {
        let url = endpoint_segments(
            &self.base_url,
            &["api", "v1", "organizations", organization_id],
        )?;
        match send_empty(self.client.get(url), "GET organization").await {
            Ok(()) => Ok(true),
            Err(e) if e.is(ErrorKind::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_clusters(&self, organization_id: &str) -> ServiceResult<Vec<ClusterInfo>> {
        let url = endpoint_segments(
            &self.base_url,
            &["api", "v1", "organizations", organization_id, "clusters"],
        )?;
        send_json(self.client.get(url), "GET clusters").await
    }

    async fn add_inbound_proxy(&self, record: InboundProxyRecord) -> ServiceResult<()> {
        let url = endpoint(&self.base_url, "api/v1/appnet/inbound-proxies")?;
        send_empty(self.client.post(url).json(&record), "POST inbound proxy").await
    }

    async fn register_connection(&self, record: ConnectionRecord) -> ServiceResult<()> {
        let url = endpoint(&self.base_url, "api/v1/appnet/connections")?;
        send_empty(self.client.post(url).json(&record), "POST connection").await
    }

    async fn remove_connection(
        &self,
        organization_id: &str,
        source_instance_id: &str,
        target_instance_id: &str,
        inbound_name: &str,
        outbound_name: &str,
    ) -> ServiceResult<ConnectionRecord> {
        let url = endpoint(&self.base_url, "api/v1/appnet/connections/remove")?;
        let body = RemoveConnectionRequest {
            organization_id: organization_id.to_string(),
            source_instance_id: source_instance_id.to_string(),
            target_instance_id: target_instance_id.to_string(),
            inbound_name: inbound_name.to_string(),
            outbound_name: outbound_name.to_string(),
        };
        send_json(self.client.post(url).json(&body), "POST connection removal").await
    }

    async fn update_service_status(&self, update: ServiceStatusUpdate) -> ServiceResult<()> {
        let url = endpoint(&self.base_url, "api/v1/services/status")?;
        send_empty(self.client.post(url).json(&update), "POST service status").await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use netplane_core::ClusterStatus;
    use parking_lot::Mutex;

    use super::*;
    use crate::backend::test_support::serve;

    #[derive(Default)]
    struct FakeDirectory {
        connections: Vec<ConnectionRecord>,
    }

    type Shared = Arc<Mutex<FakeDirectory>>;

    async fn organization(Path(org): Path<String>) -> StatusCode {
        if org == "o1" {
            StatusCode::OK
        } else {
            StatusCode::NOT_FOUND
        }
    }

    async fn clusters(Path(org): Path<String>) -> Json<Vec<ClusterInfo>> {
        Json(vec![ClusterInfo {
            organization_id: org,
            cluster_id: "c1".to_string(),
            hostname: "c1.example.com".to_string(),
            status: ClusterStatus::Online,
            cordon: false,
        }])
    }

    async fn add_connection(
        State(s): State<Shared>,
        Json(record): Json<ConnectionRecord>,
    ) -> StatusCode {
        s.lock().connections.push(record);
        StatusCode::CREATED
    }

    async fn remove_connection(
        State(s): State<Shared>,
        Json(req): Json<RemoveConnectionRequest>,
    ) -> Response {
        let mut s = s.lock();
        let position = s.connections.iter().position(|c| {
            c.organization_id == req.organization_id
                && c.source_instance_id == req.source_instance_id
                && c.target_instance_id == req.target_instance_id
        });
        match position {
            Some(i) => Json(s.connections.remove(i)).into_response(),
            None => (StatusCode::NOT_FOUND, "no such connection").into_response(),
        }
    }

    async fn directory() -> (HttpDirectory, Shared) {
        let state: Shared = Arc::default();
        let router = Router::new()
            .route("/api/v1/organizations/{org}", get(organization))
            .route("/api/v1/organizations/{org}/clusters", get(clusters))
            .route("/api/v1/appnet/connections", post(add_connection))
            .route("/api/v1/appnet/connections/remove", post(remove_connection))
            .with_state(Arc::clone(&state));
        (HttpDirectory::new(Client::new(), serve(router).await), state)
    }

    fn record() -> ConnectionRecord {
        ConnectionRecord {
            organization_id: "o1".to_string(),
            source_instance_id: "a".to_string(),
            target_instance_id: "b".to_string(),
            inbound_name: "in".to_string(),
            outbound_name: "out".to_string(),
            network_id: "8056c2e21c000001".to_string(),
            cluster_ids: vec!["c1".to_string()],
        }
    }

    #[tokio::test]
    async fn missing_organization_is_false_not_error() {
        let (directory, _) = directory().await;
        assert!(directory.organization_exists("o1").await.unwrap());
        assert!(!directory.organization_exists("o2").await.unwrap());
    }

    #[tokio::test]
    async fn clusters_are_decoded() {
        let (directory, _) = directory().await;
        let clusters = directory.list_clusters("o1").await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].hostname, "c1.example.com");
        assert!(clusters[0].is_online());
    }

    #[tokio::test]
    async fn connection_register_and_remove() {
        let (directory, state) = directory().await;
        directory.register_connection(record()).await.unwrap();
        assert_eq!(state.lock().connections.len(), 1);

        let removed = directory
            .remove_connection("o1", "a", "b", "in", "out")
            .await
            .unwrap();
        assert_eq!(removed, record());

        let err = directory
            .remove_connection("o1", "a", "b", "in", "out")
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
    }
}
