//! Server host for transport-agnostic API exposure
//!
//! This module provides a `ServerHost` structure that contains the state
//! needed to serve the collection: the resource configuration, the row store
//! and the identity provider.

use crate::config::{ResourceConfig, ResourcesConfig};
use crate::core::auth::IdentityProvider;
use crate::core::error::{ApiError, EntityError};
use crate::core::store::ResourceStore;
use anyhow::Result;
use std::sync::Arc;

/// Host context containing all server state
///
/// Everything in the host is immutable after startup and shared between
/// requests through `Arc`s.
///
/// # Example
///
/// ```rust,ignore
/// let host = ServerHost::from_builder_components(
///     ResourcesConfig::default_config(),
///     Arc::new(InMemoryStore::new()),
///     Arc::new(InMemoryIdentityProvider::new()),
/// )?;
///
/// let app = RestExposure::build_router(Arc::new(host), vec![])?;
/// ```
pub struct ServerHost {
    /// Exposed resources and their allow-lists
    pub resources: Arc<ResourcesConfig>,

    /// Row store serving listings and exports
    pub store: Arc<dyn ResourceStore>,

    /// Checks Basic credentials
    pub identity: Arc<dyn IdentityProvider>,
}

impl ServerHost {
    /// Build the host from builder components
    ///
    /// The resource configuration is validated again here so a host can never
    /// hold identifiers that were not checked.
    pub fn from_builder_components(
        resources: ResourcesConfig,
        store: Arc<dyn ResourceStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        resources.validate()?;

        Ok(Self {
            resources: Arc::new(resources),
            store,
            identity,
        })
    }

    /// Names of the exposed resources, in configuration order
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources
            .resources
            .iter()
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Look up a resource by name
    pub fn resource(&self, name: &str) -> Result<&ResourceConfig, ApiError> {
        self.resources.resource(name).ok_or_else(|| {
            EntityError::UnknownResource {
                resource: name.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldDescriptor, ResourceConfig};
    use crate::core::field::FieldKind;
    use crate::storage::{InMemoryIdentityProvider, InMemoryStore};

    fn make_host(resources: ResourcesConfig) -> Result<ServerHost> {
        ServerHost::from_builder_components(
            resources,
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryIdentityProvider::new()),
        )
    }

    #[test]
    fn test_resource_names_follow_config_order() {
        let host = make_host(ResourcesConfig::default_config()).unwrap();
        let names = host.resource_names();
        assert_eq!(names.first(), Some(&"money"));
        assert!(names.contains(&"transfer"));
    }

    #[test]
    fn test_unknown_resource_is_not_found() {
        let host = make_host(ResourcesConfig::default_config()).unwrap();
        assert!(host.resource("money").is_ok());

        let err = host.resource("stamps").unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_RESOURCE");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let resources = ResourcesConfig {
            resources: vec![ResourceConfig::new(
                "bad name",
                vec![FieldDescriptor::new("id", FieldKind::Integer)],
            )],
        };
        assert!(make_host(resources).is_err());
    }
}
