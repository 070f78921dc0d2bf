//! In-memory resource store honouring the kind state machines

use async_trait::async_trait;
use occigate_backend::{
    BackendError, Filter, NetworkBackend, ResourceBackend, ResourceKind, Result, StorageBackend,
};
use occigate_core::schema::infrastructure;
use occigate_core::{ActionInstance, AttributeType, Resource, StateMachine};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

/// Resources of one kind, keyed by id
pub struct DummyResources {
    kind: ResourceKind,
    machine: StateMachine,
    entries: RwLock<BTreeMap<String, Resource>>,
    faults: RwLock<HashMap<String, BackendError>>,
}

impl DummyResources {
    pub fn new(kind: ResourceKind) -> Self {
        let machine = match kind {
            ResourceKind::Compute => infrastructure::compute_machine(),
            ResourceKind::Network => infrastructure::network_machine(),
            ResourceKind::Storage => infrastructure::storage_machine(),
        };
        Self {
            kind,
            machine,
            entries: RwLock::new(BTreeMap::new()),
            faults: RwLock::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Make every write on `id` fail with `error`
    pub async fn inject_fault(&self, id: &str, error: BackendError) {
        self.faults.write().await.insert(id.to_string(), error);
    }

    pub async fn clear_faults(&self) {
        self.faults.write().await.clear();
    }

    async fn check_fault(&self, id: &str) -> Result<()> {
        match self.faults.read().await.get(id) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Store a resource under a fresh id in the initial state
    pub async fn insert(&self, resource: &Resource) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut stored = resource.clone();
        stored.id = id.clone();
        stored.links.clear();
        stored.state = Some(self.machine.initial.clone());
        stored.actions = self.machine.actions_from(&self.machine.initial);
        debug!("dummy {}: stored {}", self.kind, id);
        self.entries.write().await.insert(id.clone(), stored);
        id
    }

    /// Run `f` on the stored resource
    pub async fn modify<T>(&self, id: &str, f: impl FnOnce(&mut Resource) -> T) -> Result<T> {
        let mut entries = self.entries.write().await;
        let resource = entries
            .get_mut(id)
            .ok_or_else(|| BackendError::ResourceNotFound(format!("{} {}", self.kind, id)))?;
        Ok(f(resource))
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }
}

#[async_trait]
impl ResourceBackend for DummyResources {
    async fn list(&self, filter: &Filter) -> Result<Vec<Resource>> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|r| filter.matches(*r))
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Resource> {
        self.entries
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::ResourceNotFound(format!("{} {}", self.kind, id)))
    }

    async fn create(&self, resource: &Resource) -> Result<String> {
        if resource.kind != self.kind.kind_id() {
            return Err(BackendError::ResourceNotValid(format!(
                "{} is not a {} resource",
                resource.kind, self.kind
            )));
        }
        Ok(self.insert(resource).await)
    }

    async fn update(&self, resource: &Resource) -> Result<bool> {
        self.check_fault(&resource.id).await?;
        self.modify(&resource.id, |stored| {
            let before = stored.clone();
            for mixin in &resource.mixins {
                stored.add_mixin(mixin.clone());
            }
            stored.mixins.retain(|m| resource.mixins.contains(m));
            for (name, value) in &resource.attributes {
                stored.attributes.insert(name.clone(), value.clone());
            }
            *stored != before
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.check_fault(id).await?;
        let removed = self.entries.write().await.remove(id).is_some();
        if removed {
            debug!("dummy {}: removed {}", self.kind, id);
        }
        Ok(removed)
    }

    async fn trigger_action(&self, id: &str, action: &ActionInstance) -> Result<()> {
        self.check_fault(id).await?;
        let machine = &self.machine;
        self.modify(id, |stored| {
            let current = stored.state.clone().unwrap_or_else(|| machine.initial.clone());
            let next = machine
                .transition(&current, &action.action)
                .map_err(|e| BackendError::ResourceState(e.to_string()))?
                .to_string();
            if action.action == infrastructure::storage_action("resize")
                && let Some(size) = action
                    .attributes
                    .get("size")
                    .and_then(|v| v.coerce(AttributeType::Float))
            {
                stored.attributes.insert("occi.storage.size".to_string(), size);
            }
            stored.actions = machine.actions_from(&next);
            stored.state = Some(next);
            Ok(())
        })
        .await?
    }
}

impl NetworkBackend for DummyResources {}

impl StorageBackend for DummyResources {}
