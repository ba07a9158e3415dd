//! Tenant name records kept in the service catalog.

use std::fmt;
use std::sync::Arc;

use netplane_core::messages::{AddDnsEntryRequest, DeleteDnsEntryRequest, OrganizationKey};
use netplane_core::{
    catalog_service_id, CatalogBackend, CatalogRegistration, Directory, DnsEntry, ResultExt,
    ServiceKind, ServiceResult, Validate,
};
use tracing::info;

use super::ensure_organization;

/// Returns `tags` with `organization_id` added when missing, order kept.
fn scoped_tags(organization_id: &str, tags: &[String]) -> Vec<String> {
    let mut scoped = Vec::with_capacity(tags.len() + 1);
    for tag in tags {
        if !scoped.contains(tag) {
            scoped.push(tag.clone());
        }
    }
    if !scoped.iter().any(|t| t == organization_id) {
        scoped.insert(0, organization_id.to_string());
    }
    scoped
}

pub struct NamingManager {
    catalog: Arc<dyn CatalogBackend>,
    directory: Arc<dyn Directory>,
}

impl fmt::Debug for NamingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamingManager").finish_non_exhaustive()
    }
}

impl NamingManager {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogBackend>, directory: Arc<dyn Directory>) -> Self {
        Self { catalog, directory }
    }

    /// Registers `fqdn -> ip` for the organization. The organization id is
    /// always part of the stored tag set.
    ///
    /// # Errors
    ///
    /// `InvalidArgument`, `NotFound` for an unknown organization, or the
    /// catalog error.
    pub async fn add_entry(&self, request: &AddDnsEntryRequest) -> ServiceResult<()> {
        request.validate()?;
        ensure_organization(self.directory.as_ref(), &request.organization_id).await?;
        let registration = CatalogRegistration {
            id: catalog_service_id(ServiceKind::Dns, &request.organization_id, &request.fqdn),
            name: request.fqdn.clone(),
            address: request.ip.clone(),
            tags: scoped_tags(&request.organization_id, &request.tags),
            kind: ServiceKind::Dns,
        };
        self.catalog
            .add(registration)
            .await
            .with_context(|| format!("adding dns entry {}", request.fqdn))?;
        info!(
            organization_id = %request.organization_id,
            fqdn = %request.fqdn,
            ip = %request.ip,
            "dns entry added"
        );
        Ok(())
    }

    /// Deletes one entry by fqdn, or every entry of the organization whose
    /// tags include all requested tags. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// `InvalidArgument`, `NotFound` for an unknown organization, or the
    /// catalog error.
    pub async fn delete_entry(&self, request: &DeleteDnsEntryRequest) -> ServiceResult<usize> {
        request.validate()?;
        ensure_organization(self.directory.as_ref(), &request.organization_id).await?;
        let removed = match &request.fqdn {
            Some(fqdn) => {
                let id = catalog_service_id(ServiceKind::Dns, &request.organization_id, fqdn);
                self.catalog
                    .delete(Some(&id), &[])
                    .await
                    .with_context(|| format!("deleting dns entry {fqdn}"))?
            }
            None => {
                let tags = scoped_tags(&request.organization_id, &request.tags);
                self.catalog
                    .delete(None, &tags)
                    .await
                    .with_context(|| format!("deleting dns entries tagged {tags:?}"))?
            }
        };
        info!(
            organization_id = %request.organization_id,
            removed,
            "dns entries deleted"
        );
        Ok(removed)
    }

    /// # Errors
    ///
    /// `InvalidArgument`, `NotFound` for an unknown organization, or the
    /// catalog error.
    pub async fn list_entries(&self, request: &OrganizationKey) -> ServiceResult<Vec<DnsEntry>> {
        request.validate()?;
        ensure_organization(self.directory.as_ref(), &request.organization_id).await?;
        let entries = self
            .catalog
            .list(ServiceKind::Dns)
            .await
            .with_context(|| format!("listing dns entries of {}", request.organization_id))?;
        Ok(entries
            .into_iter()
            .filter(|e| e.tags.iter().any(|t| *t == request.organization_id))
            .map(|e| DnsEntry {
                organization_id: request.organization_id.clone(),
                fqdn: e.name,
                ip: e.address,
                tags: e.tags,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use netplane_core::ErrorKind;

    use super::*;
    use crate::backend::memory::{MemoryCatalog, MemoryDirectory};

    fn manager() -> (NamingManager, Arc<MemoryCatalog>) {
        let catalog = Arc::new(MemoryCatalog::new());
        let directory = Arc::new(MemoryDirectory::new());
        directory.add_organization("o1");
        directory.add_organization("o2");
        (NamingManager::new(catalog.clone(), directory), catalog)
    }

    fn entry(org: &str, fqdn: &str, ip: &str, tags: &[&str]) -> AddDnsEntryRequest {
        AddDnsEntryRequest {
            organization_id: org.to_string(),
            fqdn: fqdn.to_string(),
            ip: ip.to_string(),
            tags: tags.iter().map(ToString::to_string).collect(),
        }
    }

    fn org(id: &str) -> OrganizationKey {
        OrganizationKey {
            organization_id: id.to_string(),
        }
    }

    #[test]
    fn scoped_tags_add_organization_once() {
        assert_eq!(scoped_tags("o1", &[]), vec!["o1"]);
        assert_eq!(
            scoped_tags("o1", &["web".to_string(), "o1".to_string(), "web".to_string()]),
            vec!["web", "o1"]
        );
    }

    #[tokio::test]
    async fn added_entry_is_listed() {
        let (manager, _) = manager();
        manager
            .add_entry(&entry("o1", "svc.local", "10.0.0.5", &["o1"]))
            .await
            .unwrap();

        let entries = manager.list_entries(&org("o1")).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.fqdn == "svc.local" && e.ip == "10.0.0.5"));
    }

    #[tokio::test]
    async fn listing_is_scoped_to_organization() {
        let (manager, catalog) = manager();
        manager
            .add_entry(&entry("o1", "svc.local", "10.0.0.5", &[]))
            .await
            .unwrap();
        manager
            .add_entry(&entry("o2", "svc.local", "10.0.0.6", &[]))
            .await
            .unwrap();

        assert_eq!(catalog.entries().len(), 2);
        let entries = manager.list_entries(&org("o2")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ip, "10.0.0.6");
        assert!(entries[0].tags.contains(&"o2".to_string()));
    }

    #[tokio::test]
    async fn delete_by_fqdn() {
        let (manager, catalog) = manager();
        manager
            .add_entry(&entry("o1", "svc.local", "10.0.0.5", &[]))
            .await
            .unwrap();
        let removed = manager
            .delete_entry(&DeleteDnsEntryRequest {
                organization_id: "o1".to_string(),
                fqdn: Some("svc.local".to_string()),
                tags: vec![],
            })
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(catalog.entries().is_empty());
    }

    #[tokio::test]
    async fn delete_by_tags_stays_inside_organization() {
        let (manager, catalog) = manager();
        manager
            .add_entry(&entry("o1", "a.local", "10.0.0.1", &["web"]))
            .await
            .unwrap();
        manager
            .add_entry(&entry("o1", "b.local", "10.0.0.2", &["db"]))
            .await
            .unwrap();
        manager
            .add_entry(&entry("o2", "a.local", "10.0.0.3", &["web"]))
            .await
            .unwrap();

        let removed = manager
            .delete_entry(&DeleteDnsEntryRequest {
                organization_id: "o1".to_string(),
                fqdn: None,
                tags: vec!["web".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(removed, 1);
        let ids: Vec<String> = catalog.entries().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["dns:o1:b.local", "dns:o2:a.local"]);
    }

    #[tokio::test]
    async fn invalid_entry_never_reaches_catalog() {
        let (manager, catalog) = manager();
        let err = manager
            .add_entry(&entry("o1", "svc.local", "not-an-ip", &[]))
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::InvalidArgument));

        let err = manager
            .add_entry(&entry("ghost", "svc.local", "10.0.0.5", &[]))
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
        assert_eq!(catalog.call_count(), 0);
    }
}
