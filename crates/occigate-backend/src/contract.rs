//! Backend adapter contract
//!
//! Every provider implements one strategy object per resource kind. A
//! [`Backend`] bundles them and is built once from configuration.

use crate::batch::BatchOutcome;
use crate::error::{BackendError, Result};
use async_trait::async_trait;
use occigate_core::{ActionInstance, CategoryId, Entity, Link, Mixin, Resource};
use std::sync::Arc;
use tracing::debug;

/// Selection of entities for list and batch operations
///
/// An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Entities must carry every one of these mixins
    pub mixins: Vec<CategoryId>,
    /// Restrict to these ids
    pub ids: Vec<String>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_mixin(mut self, mixin: CategoryId) -> Self {
        self.mixins.push(mixin);
        self
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = ids;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mixins.is_empty() && self.ids.is_empty()
    }

    pub fn matches<E: Entity>(&self, entity: &E) -> bool {
        (self.ids.is_empty() || self.ids.iter().any(|id| id == entity.id()))
            && self.mixins.iter().all(|m| entity.has_mixin(m))
    }
}

/// Operations shared by compute, network and storage backends
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    /// Ids of the matching resources
    async fn list_ids(&self, filter: &Filter) -> Result<Vec<String>> {
        Ok(self
            .list(filter)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect())
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<Resource>>;

    async fn get(&self, id: &str) -> Result<Resource>;

    /// Create the resource and return its new id
    ///
    /// `ResourceNotValid` when a required mixin or attribute is missing,
    /// `ResourceCreate` when the provider rejects the request.
    async fn create(&self, resource: &Resource) -> Result<String>;

    /// Apply changes; `false` when nothing changed
    async fn update(&self, resource: &Resource) -> Result<bool>;

    /// Remove the resource; `false` when it did not exist
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Delete every matching resource, best effort
    ///
    /// Resources already gone count as neither success nor failure.
    async fn delete_all(&self, filter: &Filter) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::new();
        for id in self.list_ids(filter).await? {
            match self.delete(&id).await {
                Ok(true) => outcome.add_success(id),
                Ok(false) => debug!("{} vanished before delete", id),
                Err(e) => outcome.add_failure(id, e),
            }
        }
        Ok(outcome)
    }

    async fn trigger_action(&self, id: &str, action: &ActionInstance) -> Result<()>;

    /// Trigger `action` on every matching resource, best effort
    async fn trigger_action_on_all(
        &self,
        action: &ActionInstance,
        filter: &Filter,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::new();
        for id in self.list_ids(filter).await? {
            debug!("Triggering {} on {}", action.action, id);
            let result = self.trigger_action(&id, action).await;
            outcome.record(id, result);
        }
        Ok(outcome)
    }
}

/// Compute backend, also responsible for network and storage links
#[async_trait]
pub trait ComputeBackend: ResourceBackend {
    /// Attach a network interface and return the link id
    async fn attach_network(&self, link: &Link) -> Result<String> {
        let _ = link;
        Err(BackendError::not_implemented("attach_network"))
    }

    /// Attach a storage volume and return the link id
    async fn attach_storage(&self, link: &Link) -> Result<String> {
        let _ = link;
        Err(BackendError::not_implemented("attach_storage"))
    }

    async fn detach_network(&self, link_id: &str) -> Result<bool> {
        let _ = link_id;
        Err(BackendError::not_implemented("detach_network"))
    }

    async fn detach_storage(&self, link_id: &str) -> Result<bool> {
        let _ = link_id;
        Err(BackendError::not_implemented("detach_storage"))
    }

    async fn get_network(&self, link_id: &str) -> Result<Link> {
        let _ = link_id;
        Err(BackendError::not_implemented("get_network"))
    }

    async fn get_storage(&self, link_id: &str) -> Result<Link> {
        let _ = link_id;
        Err(BackendError::not_implemented("get_storage"))
    }
}

#[async_trait]
pub trait NetworkBackend: ResourceBackend {}

#[async_trait]
pub trait StorageBackend: ResourceBackend {}

/// Provider-specific template mixins
#[async_trait]
pub trait TemplateBackend: Send + Sync {
    /// `os_tpl` mixins
    async fn os_templates(&self) -> Result<Vec<Mixin>>;

    /// `resource_tpl` mixins
    async fn resource_templates(&self) -> Result<Vec<Mixin>> {
        Ok(Vec::new())
    }
}

/// One adapter: a strategy object per resource kind
#[derive(Clone)]
pub struct Backend {
    pub name: String,
    pub compute: Arc<dyn ComputeBackend>,
    pub network: Arc<dyn NetworkBackend>,
    pub storage: Arc<dyn StorageBackend>,
    pub templates: Arc<dyn TemplateBackend>,
}

impl Backend {
    /// All template mixins, merged into the registry at startup
    pub async fn templates(&self) -> Result<Vec<Mixin>> {
        let mut mixins = self.templates.os_templates().await?;
        mixins.extend(self.templates.resource_templates().await?);
        Ok(mixins)
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").field("name", &self.name).finish()
    }
}
