//! OpenNebula backend for occigate
//!
//! Drives a private cloud through the `one*` command line tools. VMs serve
//! compute, virtual networks serve network and datablock images serve
//! storage. VM templates are exposed as `os_tpl` mixins.

pub mod cli;
pub mod compute;
pub mod error;
pub mod mapping;
pub mod network;
pub mod storage;

pub use cli::{Credentials, OneCli};
pub use compute::OneCompute;
pub use error::{OpenNebulaError, classify};
pub use network::OneNetwork;
pub use storage::OneStorage;

use async_trait::async_trait;
use occigate_backend::{Backend, BackendError, TemplateBackend};
use occigate_core::{Mixin, Resource, template};
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "opennebula";

/// Settings for the OpenNebula adapter
#[derive(Debug, Clone)]
pub struct OpenNebulaConfig {
    pub credentials: Credentials,
    /// Image datastore for new storage
    pub datastore: String,
    /// Host bridge for new virtual networks
    pub bridge: String,
}

impl Default for OpenNebulaConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            datastore: "default".to_string(),
            bridge: "br0".to_string(),
        }
    }
}

pub struct OneTemplates {
    cli: Arc<OneCli>,
}

impl OneTemplates {
    pub fn new(cli: Arc<OneCli>) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl TemplateBackend for OneTemplates {
    async fn os_templates(&self) -> occigate_backend::Result<Vec<Mixin>> {
        let templates = self.cli.list_templates().await?;
        debug!("Found {} VM templates", templates.len());
        Ok(templates
            .iter()
            .map(|t| template::os_template(&t.name))
            .collect())
    }
}

/// Build the OpenNebula [`Backend`]
pub fn opennebula_backend(config: OpenNebulaConfig) -> Backend {
    let cli = Arc::new(OneCli::new(config.credentials));
    Backend {
        name: NAME.to_string(),
        compute: Arc::new(OneCompute::new(cli.clone())),
        network: Arc::new(OneNetwork::new(cli.clone(), config.bridge)),
        storage: Arc::new(OneStorage::new(cli.clone(), config.datastore)),
        templates: Arc::new(OneTemplates::new(cli)),
    }
}

/// `Ok(false)` when the target was already gone
pub(crate) fn absent_is_false(result: error::Result<()>) -> occigate_backend::Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) => match BackendError::from(e) {
            BackendError::ResourceNotFound(_) => Ok(false),
            other => Err(other),
        },
    }
}

/// `MethodNotImplemented` when `desired` changes anything beyond the title
pub(crate) fn check_updatable(
    current: &Resource,
    desired: &Resource,
) -> occigate_backend::Result<()> {
    let unsupported = mapping::unsupported_changes(current, desired);
    if unsupported.is_empty() {
        Ok(())
    } else {
        Err(BackendError::MethodNotImplemented(format!(
            "cannot update {} on {}",
            unsupported.join(", "),
            desired.id
        )))
    }
}

/// Provider rejections during create become `ResourceCreate`
pub(crate) fn create_error(err: OpenNebulaError) -> BackendError {
    match BackendError::from(err) {
        BackendError::ResourceAction(message) => BackendError::ResourceCreate(message),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_is_false() {
        let gone = Err(OpenNebulaError::CommandFailed {
            command: "onevnet delete 9".into(),
            stderr: "[one.vn.delete] Error getting virtual network [9].".into(),
        });
        assert!(!absent_is_false(gone).unwrap());
        assert!(absent_is_false(Ok(())).unwrap());

        let denied = Err(OpenNebulaError::CommandFailed {
            command: "onevnet delete 9".into(),
            stderr: "Not authorized to perform MANAGE NET [9].".into(),
        });
        assert!(matches!(
            absent_is_false(denied),
            Err(BackendError::UserNotAuthorized(_))
        ));
    }

    #[test]
    fn test_check_updatable() {
        use occigate_core::schema::infrastructure;

        let current = Resource::new(infrastructure::network())
            .with_id("4")
            .with_attribute("occi.core.title", "private");
        let renamed = current.clone().with_attribute("occi.core.title", "public");
        assert!(check_updatable(&current, &renamed).is_ok());

        let relabelled = current.clone().with_attribute("occi.network.vlan", 12i64);
        let err = check_updatable(&current, &relabelled).unwrap_err();
        assert!(matches!(err, BackendError::MethodNotImplemented(ref m) if m.contains("occi.network.vlan")));
    }

    #[test]
    fn test_create_error() {
        let err = create_error(OpenNebulaError::CommandFailed {
            command: "onetemplate instantiate 3".into(),
            stderr: "Cannot allocate more VMs".into(),
        });
        assert!(matches!(err, BackendError::ResourceCreate(_)));

        let err = create_error(OpenNebulaError::CommandFailed {
            command: "oneimage create".into(),
            stderr: "Parse error: syntax error".into(),
        });
        assert!(matches!(err, BackendError::ResourceNotValid(_)));
    }
}
