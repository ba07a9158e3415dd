//! Overlay network management.

use std::fmt;
use std::sync::Arc;

use netplane_core::messages::{AddNetworkRequest, MemberRequest, NetworkKey, OrganizationKey};
use netplane_core::{
    ControllerBackend, Directory, Network, ResultExt, ServiceError, ServiceResult, Validate,
};
use tracing::{info, warn};

use super::{ensure_organization, owned_network};

/// Networks live only in the controller; nothing is cached here.
pub struct NetworkManager {
    controller: Arc<dyn ControllerBackend>,
    directory: Arc<dyn Directory>,
}

impl fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkManager").finish_non_exhaustive()
    }
}

impl NetworkManager {
    #[must_use]
    pub fn new(controller: Arc<dyn ControllerBackend>, directory: Arc<dyn Directory>) -> Self {
        Self {
            controller,
            directory,
        }
    }

    /// # Errors
    ///
    /// `InvalidArgument`, `NotFound` for an unknown organization, or the
    /// controller error.
    pub async fn add_network(&self, request: &AddNetworkRequest) -> ServiceResult<Network> {
        request.validate()?;
        ensure_organization(self.directory.as_ref(), &request.organization_id).await?;
        let network = self
            .controller
            .add(&request.name, &request.organization_id)
            .await
            .with_context(|| format!("adding network {}", request.name))?;
        info!(
            organization_id = %network.organization_id,
            network_id = %network.network_id,
            name = %network.name,
            "network added"
        );
        Ok(network)
    }

    /// Networks of other organizations are reported as `NotFound`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument`, `NotFound`, or the controller error.
    pub async fn get_network(&self, request: &NetworkKey) -> ServiceResult<Network> {
        request.validate()?;
        ensure_organization(self.directory.as_ref(), &request.organization_id).await?;
        owned_network(
            self.controller.as_ref(),
            &request.organization_id,
            &request.network_id,
        )
        .await
    }

    /// # Errors
    ///
    /// `InvalidArgument`, `NotFound`, or the controller error.
    pub async fn delete_network(&self, request: &NetworkKey) -> ServiceResult<()> {
        request.validate()?;
        ensure_organization(self.directory.as_ref(), &request.organization_id).await?;
        self.controller
            .delete(&request.network_id, &request.organization_id)
            .await
            .with_context(|| format!("deleting network {}", request.network_id))?;
        info!(
            organization_id = %request.organization_id,
            network_id = %request.network_id,
            "network deleted"
        );
        Ok(())
    }

    /// # Errors
    ///
    /// `InvalidArgument`, `NotFound` for an unknown organization, or the
    /// controller error. An organization without networks gets an empty list.
    pub async fn list_networks(&self, request: &OrganizationKey) -> ServiceResult<Vec<Network>> {
        request.validate()?;
        ensure_organization(self.directory.as_ref(), &request.organization_id).await?;
        self.controller
            .list(&request.organization_id)
            .await
            .with_context(|| format!("listing networks of {}", request.organization_id))
    }

    /// # Errors
    ///
    /// `InvalidArgument`, `NotFound` when the organization or its network
    /// does not exist, or the controller error.
    pub async fn authorize_member(&self, request: &MemberRequest) -> ServiceResult<()> {
        request.validate()?;
        ensure_organization(self.directory.as_ref(), &request.organization_id).await?;
        owned_network(
            self.controller.as_ref(),
            &request.organization_id,
            &request.network_id,
        )
        .await?;
        self.controller
            .authorize(&request.network_id, &request.member_id)
            .await
            .with_context(|| {
                format!(
                    "authorizing member {} on {}",
                    request.member_id, request.network_id
                )
            })?;
        info!(
            network_id = %request.network_id,
            member_id = %request.member_id,
            "member authorized"
        );
        Ok(())
    }

    /// # Errors
    ///
    /// `InvalidArgument` for a malformed request, otherwise always
    /// `Unimplemented`.
    pub async fn disauthorize_member(&self, request: &MemberRequest) -> ServiceResult<()> {
        request.validate()?;
        warn!(
            network_id = %request.network_id,
            member_id = %request.member_id,
            "member disauthorization requested"
        );
        Err(ServiceError::unimplemented("member disauthorization"))
    }

    /// # Errors
    ///
    /// `InvalidArgument` for a malformed request, otherwise always
    /// `Unimplemented`.
    pub async fn join_network(&self, request: &MemberRequest) -> ServiceResult<()> {
        request.validate()?;
        Err(ServiceError::unimplemented("joining a network"))
    }
}
