//! Request validation.
//!
//! Every mutating request is validated before any directory or backend call
//! is issued. A failed validation always yields `ErrorKind::InvalidArgument`.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ServiceError, ServiceResult};
use crate::messages::{
    AddConnectionRequest, AddDnsEntryRequest, AddNetworkRequest, DeleteDnsEntryRequest,
    InboundServiceProxyRequest, MemberRequest, NetworkKey, OrganizationKey,
    OutboundServiceRequest, RemoveConnectionRequest, ServiceStatusUpdate, ZtConnectionRequest,
};

static FQDN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9_]([A-Za-z0-9_-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9_]([A-Za-z0-9_-]{0,61}[A-Za-z0-9])?)*\.?$",
    )
    .expect("fqdn pattern is valid")
});

/// Implemented by every request that reaches a manager.
pub trait Validate {
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the first offending field.
    fn validate(&self) -> ServiceResult<()>;
}

/// Rejects empty or whitespace-only identity fields.
///
/// # Errors
///
/// Returns `InvalidArgument` when `value` is blank.
pub fn require(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::invalid_argument(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// # Errors
///
/// Returns `InvalidArgument` when `fqdn` is blank, longer than 253 bytes, or
/// not a dotted sequence of host labels.
pub fn require_fqdn(fqdn: &str) -> ServiceResult<()> {
    require("fqdn", fqdn)?;
    if fqdn.len() > 253 || !FQDN.is_match(fqdn) {
        return Err(ServiceError::invalid_argument(format!("invalid fqdn {fqdn:?}")));
    }
    Ok(())
}

/// # Errors
///
/// Returns `InvalidArgument` when `ip` is not an IPv4 or IPv6 literal.
pub fn require_ip(ip: &str) -> ServiceResult<()> {
    require("ip", ip)?;
    ip.parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ServiceError::invalid_argument(format!("invalid ip address {ip:?}")))
}

/// Rejects controller identifiers that would not survive as one URL path
/// segment.
///
/// # Errors
///
/// Returns `InvalidArgument` when `value` is blank, is `.` or `..`, or
/// contains a slash, backslash, `?`, `#`, `%` or whitespace.
pub fn require_controller_id(field: &str, value: &str) -> ServiceResult<()> {
    require(field, value)?;
    let reserved = |c: char| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace();
    if matches!(value, "." | "..") || value.contains(reserved) {
        return Err(ServiceError::invalid_argument(format!(
            "{field} {value:?} is not a valid controller id"
        )));
    }
    Ok(())
}

fn require_tags(tags: &[String]) -> ServiceResult<()> {
    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err(ServiceError::invalid_argument("tags cannot contain empty values"));
    }
    Ok(())
}

impl Validate for OrganizationKey {
    fn validate(&self) -> ServiceResult<()> {
        require("organization_id", &self.organization_id)
    }
}

impl Validate for AddNetworkRequest {
    fn validate(&self) -> ServiceResult<()> {
        require("organization_id", &self.organization_id)?;
        require("name", &self.name)?;
        if self.name.contains('/') {
            return Err(ServiceError::invalid_argument("network name cannot contain '/'"));
        }
        Ok(())
    }
}

impl Validate for NetworkKey {
    fn validate(&self) -> ServiceResult<()> {
        require("organization_id", &self.organization_id)?;
        require_controller_id("network_id", &self.network_id)
    }
}

impl Validate for MemberRequest {
    fn validate(&self) -> ServiceResult<()> {
        require("organization_id", &self.organization_id)?;
        require_controller_id("network_id", &self.network_id)?;
        require_controller_id("member_id", &self.member_id)
    }
}

impl Validate for AddDnsEntryRequest {
    fn validate(&self) -> ServiceResult<()> {
        require("organization_id", &self.organization_id)?;
        require_fqdn(&self.fqdn)?;
        require_ip(&self.ip)?;
        require_tags(&self.tags)
    }
}

impl Validate for DeleteDnsEntryRequest {
    fn validate(&self) -> ServiceResult<()> {
        require("organization_id", &self.organization_id)?;
        require_tags(&self.tags)?;
        match &self.fqdn {
            Some(fqdn) => require_fqdn(fqdn),
            None if self.tags.is_empty() => Err(ServiceError::invalid_argument(
                "either fqdn or tags must be provided",
            )),
            None => Ok(()),
        }
    }
}

impl Validate for InboundServiceProxyRequest {
    fn validate(&self) -> ServiceResult<()> {
        require("organization_id", &self.organization_id)?;
        require("app_instance_id", &self.app_instance_id)?;
        require("service_group_id", &self.service_group_id)?;
        require("service_id", &self.service_id)?;
        require("cluster_id", &self.cluster_id)?;
        require_fqdn(&self.fqdn)?;
        require_ip(&self.ip)
    }
}

impl Validate for OutboundServiceRequest {
    fn validate(&self) -> ServiceResult<()> {
        require("organization_id", &self.organization_id)?;
        require("app_instance_id", &self.app_instance_id)?;
        require("service_id", &self.service_id)?;
        require("outbound_name", &self.outbound_name)
    }
}

impl Validate for AddConnectionRequest {
    fn validate(&self) -> ServiceResult<()> {
        require("organization_id", &self.organization_id)?;
        require("source_instance_id", &self.source_instance_id)?;
        require("target_instance_id", &self.target_instance_id)?;
        require("inbound_name", &self.inbound_name)?;
        require("outbound_name", &self.outbound_name)?;
        for cluster_id in &self.cluster_ids {
            require("cluster_id", cluster_id)?;
        }
        Ok(())
    }
}

impl Validate for RemoveConnectionRequest {
    fn validate(&self) -> ServiceResult<()> {
        require("organization_id", &self.organization_id)?;
        require("source_instance_id", &self.source_instance_id)?;
        require("target_instance_id", &self.target_instance_id)?;
        require("inbound_name", &self.inbound_name)?;
        require("outbound_name", &self.outbound_name)
    }
}

impl Validate for ZtConnectionRequest {
    fn validate(&self) -> ServiceResult<()> {
        require("organization_id", &self.organization_id)?;
        require("app_instance_id", &self.app_instance_id)?;
        require_controller_id("network_id", &self.network_id)?;
        require_controller_id("member_id", &self.member_id)
    }
}

impl Validate for ServiceStatusUpdate {
    fn validate(&self) -> ServiceResult<()> {
        require("organization_id", &self.organization_id)?;
        require("app_instance_id", &self.app_instance_id)?;
        require("service_group_instance_id", &self.service_group_instance_id)?;
        require("service_instance_id", &self.service_instance_id)?;
        require("cluster_id", &self.cluster_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn dns(fqdn: &str, ip: &str) -> AddDnsEntryRequest {
        AddDnsEntryRequest {
            organization_id: "o1".to_string(),
            fqdn: fqdn.to_string(),
            ip: ip.to_string(),
            tags: vec!["o1".to_string()],
        }
    }

    #[test]
    fn blank_fields_are_rejected() {
        let err = require("member_id", "   ").unwrap_err();
        assert!(err.is(ErrorKind::InvalidArgument));
        assert!(err.message.contains("member_id"));
    }

    #[test]
    fn member_request_requires_member_id() {
        let req = MemberRequest {
            organization_id: "o1".to_string(),
            network_id: "8056c2e21c000001".to_string(),
            member_id: String::new(),
        };
        assert!(req.validate().unwrap_err().is(ErrorKind::InvalidArgument));
    }

    #[test]
    fn controller_ids_must_be_single_path_segments() {
        assert!(require_controller_id("network_id", "8056c2e21c000001").is_ok());
        for bad in ["..", ".", "a/../../status", "id?x=1", "id#frag", "id%2F", "a b"] {
            let err = require_controller_id("network_id", bad).unwrap_err();
            assert!(err.is(ErrorKind::InvalidArgument), "{bad}");
        }

        let req = NetworkKey {
            organization_id: "o1".to_string(),
            network_id: "../../status".to_string(),
        };
        assert!(req.validate().unwrap_err().is(ErrorKind::InvalidArgument));
    }

    #[test]
    fn dns_entry_checks_fqdn_and_ip() {
        assert!(dns("svc.local", "10.0.0.5").validate().is_ok());
        assert!(dns("svc-1.app.cluster.local.", "fd00::5").validate().is_ok());
        assert!(dns("bad..name", "10.0.0.5").validate().is_err());
        assert!(dns("-svc.local", "10.0.0.5").validate().is_err());
        assert!(dns("svc.local", "10.0.0").validate().is_err());
        assert!(dns("svc.local", "").validate().is_err());
    }

    #[test]
    fn dns_entry_rejects_blank_tags() {
        let mut req = dns("svc.local", "10.0.0.5");
        req.tags.push(" ".to_string());
        assert!(req.validate().is_err());
    }

    #[test]
    fn delete_needs_fqdn_or_tags() {
        let mut req = DeleteDnsEntryRequest {
            organization_id: "o1".to_string(),
            fqdn: None,
            tags: vec![],
        };
        assert!(req.validate().is_err());

        req.tags = vec!["app-1".to_string()];
        assert!(req.validate().is_ok());

        req.tags.clear();
        req.fqdn = Some("svc.local".to_string());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn network_name_cannot_embed_separator() {
        let req = AddNetworkRequest {
            organization_id: "o1".to_string(),
            name: "a/b".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn connection_rejects_blank_cluster_ids() {
        let req = AddConnectionRequest {
            organization_id: "o1".to_string(),
            source_instance_id: "app-a".to_string(),
            target_instance_id: "app-b".to_string(),
            inbound_name: "in".to_string(),
            outbound_name: "out".to_string(),
            cluster_ids: vec!["c1".to_string(), String::new()],
        };
        assert!(req.validate().is_err());
    }
}
