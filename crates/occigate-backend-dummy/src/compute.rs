//! In-memory compute with network and storage links

use crate::resources::DummyResources;
use async_trait::async_trait;
use occigate_backend::{
    BackendError, ComputeBackend, Filter, LinkKind, ResourceBackend, ResourceKind, Result,
};
use occigate_core::schema::infrastructure;
use occigate_core::{ActionInstance, CategoryId, Link, Resource};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

pub struct DummyCompute {
    resources: DummyResources,
    links: RwLock<BTreeMap<String, Link>>,
    next_link: AtomicU64,
    os_templates: Vec<CategoryId>,
}

impl DummyCompute {
    /// Compute store accepting the given `os_tpl` mixins
    pub fn new(os_templates: Vec<CategoryId>) -> Self {
        Self {
            resources: DummyResources::new(ResourceKind::Compute),
            links: RwLock::new(BTreeMap::new()),
            next_link: AtomicU64::new(0),
            os_templates,
        }
    }

    pub fn resources(&self) -> &DummyResources {
        &self.resources
    }

    async fn attach(&self, link: &Link, kind: LinkKind) -> Result<String> {
        if link.kind != kind.kind_id() {
            return Err(BackendError::ResourceNotValid(format!(
                "{} is not a {} link",
                link.kind, kind
            )));
        }
        let compute_id = last_segment(&link.source);
        if !self.resources.contains(compute_id).await {
            return Err(BackendError::ResourceNotFound(format!(
                "compute {compute_id}"
            )));
        }

        let n = self.next_link.fetch_add(1, Ordering::SeqCst);
        let suffix = match kind {
            LinkKind::NetworkInterface => "nic",
            LinkKind::StorageLink => "disk",
        };
        let id = format!("compute_{compute_id}_{suffix}_{n}");
        let mut stored = link.clone();
        stored.id = id.clone();

        self.resources
            .modify(compute_id, |compute| compute.add_link(id.clone()))
            .await?;
        self.links.write().await.insert(id.clone(), stored);
        debug!("dummy compute: attached {} to {}", id, compute_id);
        Ok(id)
    }

    async fn detach(&self, link_id: &str, kind: LinkKind) -> Result<bool> {
        let compute_id = owner_of(link_id)?;
        let removed = {
            let mut links = self.links.write().await;
            match links.get(link_id) {
                Some(link) if link.kind == kind.kind_id() => links.remove(link_id).is_some(),
                _ => false,
            }
        };
        if removed {
            // The compute may already be gone
            let _ = self
                .resources
                .modify(compute_id, |compute| compute.links.retain(|l| l != link_id))
                .await;
        }
        Ok(removed)
    }

    async fn find(&self, link_id: &str, kind: LinkKind) -> Result<Link> {
        owner_of(link_id)?;
        match self.links.read().await.get(link_id) {
            Some(link) if link.kind == kind.kind_id() => Ok(link.clone()),
            _ => Err(BackendError::ResourceNotFound(format!("{kind} {link_id}"))),
        }
    }
}

fn last_segment(location: &str) -> &str {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(location)
}

/// Compute id encoded in a `compute_<id>_<nic|disk>_<n>` link id
fn owner_of(link_id: &str) -> Result<&str> {
    link_id
        .strip_prefix("compute_")
        .and_then(|rest| rest.rsplitn(3, '_').nth(2))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| BackendError::IdentifierNotValid(link_id.to_string()))
}

#[async_trait]
impl ResourceBackend for DummyCompute {
    async fn list(&self, filter: &Filter) -> Result<Vec<Resource>> {
        self.resources.list(filter).await
    }

    async fn get(&self, id: &str) -> Result<Resource> {
        self.resources.get(id).await
    }

    async fn create(&self, resource: &Resource) -> Result<String> {
        let has_os = resource.mixins.iter().any(|m| {
            self.os_templates.contains(m) || *m == infrastructure::os_tpl()
        });
        if !has_os {
            return Err(BackendError::ResourceNotValid(
                "compute requires an os_tpl mixin".to_string(),
            ));
        }
        self.resources.create(resource).await
    }

    async fn update(&self, resource: &Resource) -> Result<bool> {
        self.resources.update(resource).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let deleted = self.resources.delete(id).await?;
        if deleted {
            let prefix = format!("compute_{id}_");
            self.links.write().await.retain(|link_id, _| !link_id.starts_with(&prefix));
        }
        Ok(deleted)
    }

    async fn trigger_action(&self, id: &str, action: &ActionInstance) -> Result<()> {
        self.resources.trigger_action(id, action).await
    }
}

#[async_trait]
impl ComputeBackend for DummyCompute {
    async fn attach_network(&self, link: &Link) -> Result<String> {
        self.attach(link, LinkKind::NetworkInterface).await
    }

    async fn attach_storage(&self, link: &Link) -> Result<String> {
        self.attach(link, LinkKind::StorageLink).await
    }

    async fn detach_network(&self, link_id: &str) -> Result<bool> {
        self.detach(link_id, LinkKind::NetworkInterface).await
    }

    async fn detach_storage(&self, link_id: &str) -> Result<bool> {
        self.detach(link_id, LinkKind::StorageLink).await
    }

    async fn get_network(&self, link_id: &str) -> Result<Link> {
        self.find(link_id, LinkKind::NetworkInterface).await
    }

    async fn get_storage(&self, link_id: &str) -> Result<Link> {
        self.find(link_id, LinkKind::StorageLink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compute() -> Resource {
        Resource::new(infrastructure::compute()).with_mixin(infrastructure::os_tpl())
    }

    #[test]
    fn test_owner_of() {
        assert_eq!(owner_of("compute_abc-1_nic_0").unwrap(), "abc-1");
        assert_eq!(owner_of("compute_a_b_disk_12").unwrap(), "a_b");
        assert!(owner_of("nic_0").is_err());
        assert!(owner_of("compute__nic_0").is_err());
    }

    #[tokio::test]
    async fn test_create_requires_os_template() {
        let store = DummyCompute::new(Vec::new());
        let err = store
            .create(&Resource::new(infrastructure::compute()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ResourceNotValid(_)));
        assert!(store.create(&compute()).await.is_ok());
    }

    #[tokio::test]
    async fn test_attach_and_detach_network() {
        let store = DummyCompute::new(Vec::new());
        let id = store.create(&compute()).await.unwrap();
        let link = Link::new(
            infrastructure::networkinterface(),
            format!("/compute/{id}"),
            "/network/n1",
        );
        let link_id = store.attach_network(&link).await.unwrap();
        assert!(link_id.starts_with(&format!("compute_{id}_nic_")));
        assert_eq!(store.get(&id).await.unwrap().links, vec![link_id.clone()]);
        assert_eq!(store.get_network(&link_id).await.unwrap().target, "/network/n1");
        assert!(store.get_storage(&link_id).await.is_err());

        assert!(!store.detach_storage(&link_id).await.unwrap());
        assert!(store.detach_network(&link_id).await.unwrap());
        assert!(store.get(&id).await.unwrap().links.is_empty());
        assert!(!store.detach_network(&link_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_attach_to_missing_compute() {
        let store = DummyCompute::new(Vec::new());
        let link = Link::new(infrastructure::storagelink(), "/compute/none", "/storage/s1");
        let err = store.attach_storage(&link).await.unwrap_err();
        assert!(matches!(err, BackendError::ResourceNotFound(_)));
    }
}
