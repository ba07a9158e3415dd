//! Domain managers: validate, check the organization, sequence backend calls.
//!
//! RPC handlers and bus handlers both end up here, so a request behaves the
//! same whichever way it arrives.

pub mod appnet;
pub mod naming;
pub mod network;

pub use appnet::AppNetworkManager;
pub use naming::NamingManager;
pub use network::NetworkManager;

use netplane_core::{ControllerBackend, Directory, Network, ResultExt, ServiceError, ServiceResult};

/// Fails with `NotFound` unless the directory knows `organization_id`.
pub(crate) async fn ensure_organization(
    directory: &dyn Directory,
    organization_id: &str,
) -> ServiceResult<()> {
    let exists = directory
        .organization_exists(organization_id)
        .await
        .with_context(|| format!("checking organization {organization_id}"))?;
    if exists {
        Ok(())
    } else {
        Err(ServiceError::not_found(format!(
            "organization {organization_id}"
        )))
    }
}

/// Fetches a network, reporting networks of other organizations as
/// `NotFound`.
pub(crate) async fn owned_network(
    controller: &dyn ControllerBackend,
    organization_id: &str,
    network_id: &str,
) -> ServiceResult<Network> {
    let network = controller
        .get(network_id)
        .await
        .with_context(|| format!("getting network {network_id}"))?;
    if network.organization_id != organization_id {
        return Err(ServiceError::not_found(format!(
            "network {network_id} of organization {organization_id}"
        )));
    }
    Ok(network)
}
