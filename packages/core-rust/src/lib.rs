//! `netplane` core — domain types, bus messages, error taxonomy, and the
//! provider traits implemented by backend adapters.

pub mod error;
pub mod messages;
pub mod traits;
pub mod types;
pub mod validation;

pub use error::{ErrorKind, ResultExt, ServiceError, ServiceResult};
pub use messages::{ApplicationEvent, KindedMessage, NetworkOperation};
pub use traits::{CatalogBackend, ControllerBackend, Directory};
pub use types::{
    catalog_service_id, tags_superset, CatalogEntry, CatalogRegistration, ClusterInfo,
    ClusterStatus, ConnectionRecord, DnsEntry, InboundProxyRecord, Network, ServiceKind,
    ServiceStatus,
};
pub use validation::Validate;

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::tags_superset;

    proptest! {
        #[test]
        fn superset_agrees_with_set_inclusion(
            entry in proptest::collection::hash_set("[a-d]", 0..4),
            requested in proptest::collection::hash_set("[a-d]", 0..4),
        ) {
            let entry: Vec<String> = entry.into_iter().collect();
            let requested_vec: Vec<String> = requested.iter().cloned().collect();
            let expected = requested.iter().all(|t| entry.contains(t));
            prop_assert_eq!(tags_superset(&entry, &requested_vec), expected);
        }
    }
}
