//! Storage backed by OpenNebula datablock images

use crate::cli::OneCli;
use crate::mapping::{self, check_id};
use crate::{absent_is_false, check_updatable, create_error};
use async_trait::async_trait;
use occigate_backend::{BackendError, Filter, ResourceBackend, Result, StorageBackend};
use occigate_core::{ActionInstance, Resource};
use std::sync::Arc;
use tracing::info;

pub struct OneStorage {
    cli: Arc<OneCli>,
    datastore: String,
}

impl OneStorage {
    pub fn new(cli: Arc<OneCli>, datastore: impl Into<String>) -> Self {
        Self {
            cli,
            datastore: datastore.into(),
        }
    }
}

#[async_trait]
impl ResourceBackend for OneStorage {
    async fn list(&self, filter: &Filter) -> Result<Vec<Resource>> {
        Ok(self
            .cli
            .list_images()
            .await?
            .iter()
            .map(mapping::storage_from)
            .filter(|r| filter.matches(r))
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Resource> {
        let image = self.cli.show_image(check_id(id)?).await?;
        Ok(mapping::storage_from(&image))
    }

    async fn create(&self, resource: &Resource) -> Result<String> {
        let template = mapping::image_template(resource)?;
        let id = self
            .cli
            .create_image(&self.datastore, &template)
            .await
            .map_err(create_error)?;
        info!(datastore = %self.datastore, "Created image {}", id);
        Ok(id)
    }

    async fn update(&self, resource: &Resource) -> Result<bool> {
        let current = self.get(&resource.id).await?;
        check_updatable(&current, resource)?;
        match resource.title() {
            Some(title) if current.title() != Some(title) => {
                self.cli.rename_image(&resource.id, title).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        absent_is_false(self.cli.image_action("delete", check_id(id)?).await)
    }

    async fn trigger_action(&self, id: &str, action: &ActionInstance) -> Result<()> {
        let id = check_id(id)?;
        let command = match action.action.term() {
            "online" => "enable",
            "offline" => "disable",
            other => return Err(BackendError::MethodNotImplemented(format!("storage {other}"))),
        };
        self.cli.image_action(command, id).await?;
        Ok(())
    }
}

impl StorageBackend for OneStorage {}
