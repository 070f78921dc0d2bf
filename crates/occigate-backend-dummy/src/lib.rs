//! In-memory occigate backend
//!
//! Keeps every entity in process memory and follows the infrastructure
//! state machines. Used for local runs and tests.

pub mod compute;
pub mod resources;

pub use compute::DummyCompute;
pub use resources::DummyResources;

use async_trait::async_trait;
use occigate_backend::{Backend, ResourceKind, Result, TemplateBackend};
use occigate_core::{Mixin, template};
use std::sync::Arc;

pub const NAME: &str = "dummy";

/// Operating system images offered by the dummy backend
pub const OS_TEMPLATES: &[&str] = &["Ubuntu 22.04", "Debian 12"];

/// Sizing templates offered by the dummy backend
pub const RESOURCE_TEMPLATES: &[&str] = &["small", "medium", "large"];

pub struct DummyTemplates {
    os: Vec<Mixin>,
    resource: Vec<Mixin>,
}

impl DummyTemplates {
    pub fn new() -> Self {
        Self {
            os: OS_TEMPLATES.iter().map(|n| template::os_template(n)).collect(),
            resource: RESOURCE_TEMPLATES
                .iter()
                .map(|n| template::resource_template(n))
                .collect(),
        }
    }
}

impl Default for DummyTemplates {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TemplateBackend for DummyTemplates {
    async fn os_templates(&self) -> Result<Vec<Mixin>> {
        Ok(self.os.clone())
    }

    async fn resource_templates(&self) -> Result<Vec<Mixin>> {
        Ok(self.resource.clone())
    }
}

/// Handles on the stores behind a dummy [`Backend`]
#[derive(Clone)]
pub struct DummyBackend {
    pub compute: Arc<DummyCompute>,
    pub network: Arc<DummyResources>,
    pub storage: Arc<DummyResources>,
    pub templates: Arc<DummyTemplates>,
}

impl DummyBackend {
    pub fn new() -> Self {
        let templates = DummyTemplates::new();
        let os_ids = templates.os.iter().map(|m| m.id.clone()).collect();
        Self {
            compute: Arc::new(DummyCompute::new(os_ids)),
            network: Arc::new(DummyResources::new(ResourceKind::Network)),
            storage: Arc::new(DummyResources::new(ResourceKind::Storage)),
            templates: Arc::new(templates),
        }
    }

    pub fn backend(&self) -> Backend {
        Backend {
            name: NAME.to_string(),
            compute: self.compute.clone(),
            network: self.network.clone(),
            storage: self.storage.clone(),
            templates: self.templates.clone(),
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Fresh, empty dummy backend
pub fn dummy_backend() -> Backend {
    DummyBackend::new().backend()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_templates_are_encoded_mixins() {
        let backend = dummy_backend();
        let mixins = backend.templates().await.unwrap();
        assert_eq!(mixins.len(), OS_TEMPLATES.len() + RESOURCE_TEMPLATES.len());
        let ubuntu = &mixins[0];
        assert_eq!(ubuntu.title.as_deref(), Some("Ubuntu 22.04"));
        assert!(ubuntu.id.term().starts_with("tpl_ubuntu_22_04__"));
        assert!(ubuntu.location.as_deref().unwrap().starts_with("/mixins/os_tpl/"));
    }
}
