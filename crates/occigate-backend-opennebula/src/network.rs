//! Network backed by OpenNebula virtual networks

use crate::cli::OneCli;
use crate::mapping::{self, check_id};
use crate::{absent_is_false, check_updatable, create_error};
use async_trait::async_trait;
use occigate_backend::{BackendError, Filter, NetworkBackend, ResourceBackend, Result};
use occigate_core::{ActionInstance, Resource};
use std::sync::Arc;
use tracing::info;

pub struct OneNetwork {
    cli: Arc<OneCli>,
    bridge: String,
}

impl OneNetwork {
    pub fn new(cli: Arc<OneCli>, bridge: impl Into<String>) -> Self {
        Self {
            cli,
            bridge: bridge.into(),
        }
    }
}

#[async_trait]
impl ResourceBackend for OneNetwork {
    async fn list(&self, filter: &Filter) -> Result<Vec<Resource>> {
        Ok(self
            .cli
            .list_vnets()
            .await?
            .iter()
            .map(mapping::network_from)
            .filter(|r| filter.matches(r))
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Resource> {
        let vnet = self.cli.show_vnet(check_id(id)?).await?;
        Ok(mapping::network_from(&vnet))
    }

    async fn create(&self, resource: &Resource) -> Result<String> {
        let template = mapping::vnet_template(resource, &self.bridge);
        let id = self.cli.create_vnet(&template).await.map_err(create_error)?;
        info!("Created virtual network {}", id);
        Ok(id)
    }

    async fn update(&self, resource: &Resource) -> Result<bool> {
        let current = self.get(&resource.id).await?;
        check_updatable(&current, resource)?;
        match resource.title() {
            Some(title) if current.title() != Some(title) => {
                self.cli.rename_vnet(&resource.id, title).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        absent_is_false(self.cli.delete_vnet(check_id(id)?).await)
    }

    async fn trigger_action(&self, id: &str, action: &ActionInstance) -> Result<()> {
        check_id(id)?;
        Err(BackendError::MethodNotImplemented(format!(
            "network {}",
            action.action.term()
        )))
    }
}

impl NetworkBackend for OneNetwork {}
