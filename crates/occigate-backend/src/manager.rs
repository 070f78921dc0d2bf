//! Backend dispatch
//!
//! The [`Manager`] owns the active [`Backend`], maps lifecycle signals and
//! action invocations onto it, and wraps every call with a timeout and,
//! for writers, a per-entity lock.

use crate::batch::BatchOutcome;
use crate::contract::{Backend, Filter, ResourceBackend};
use crate::error::{BackendError, DispatchResult, Result};
use crate::kind::{LinkKind, ResourceKind, Signal};
use crate::locks::KeyedLocks;
use occigate_core::{ActionInstance, CoreError, Entity, Kind, Link, Mixin, Resource};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on a single backend call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a lifecycle signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Deploy created the resource under this id
    Created(String),
    /// Update applied (`true`) or was a no-op (`false`)
    Updated(bool),
    /// Delete removed the resource (`true`) or found nothing (`false`)
    Deleted(bool),
}

pub struct Manager {
    backend: Backend,
    timeout: Duration,
    locks: Option<KeyedLocks>,
}

impl Manager {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            timeout: DEFAULT_TIMEOUT,
            locks: Some(KeyedLocks::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable per-entity write serialization
    pub fn serialize_writes(mut self, enabled: bool) -> Self {
        self.locks = enabled.then(KeyedLocks::new);
        self
    }

    pub fn backend_name(&self) -> &str {
        &self.backend.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn resources(&self, kind: ResourceKind) -> &dyn ResourceBackend {
        match kind {
            ResourceKind::Compute => self.backend.compute.as_ref(),
            ResourceKind::Network => self.backend.network.as_ref(),
            ResourceKind::Storage => self.backend.storage.as_ref(),
        }
    }

    async fn call<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        debug!("Backend {} {}", self.backend.name, operation);
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Backend {} {} timed out", self.backend.name, operation);
                Err(BackendError::ServiceUnavailable(format!(
                    "{} timed out after {}s",
                    operation,
                    self.timeout.as_secs_f64()
                )))
            }
        }
    }

    async fn write_lock(&self, key: String) -> Option<tokio::sync::OwnedMutexGuard<()>> {
        match &self.locks {
            Some(locks) => Some(locks.lock(&key).await),
            None => None,
        }
    }

    async fn write_locks(&self, keys: Vec<String>) -> Vec<tokio::sync::OwnedMutexGuard<()>> {
        match &self.locks {
            Some(locks) => locks.lock_many(&keys).await,
            None => Vec::new(),
        }
    }

    fn lock_key(kind: impl std::fmt::Display, id: &str) -> String {
        format!("{}/{}", kind, id)
    }

    fn resource_kind(resource: &Resource) -> Result<ResourceKind> {
        ResourceKind::from_kind(&resource.kind).ok_or_else(|| {
            BackendError::MethodNotImplemented(format!("no backend for kind {}", resource.kind))
        })
    }

    /// Provider template mixins
    pub async fn templates(&self) -> Result<Vec<Mixin>> {
        self.call("templates", self.backend.templates()).await
    }

    pub async fn list_ids(&self, kind: ResourceKind, filter: &Filter) -> Result<Vec<String>> {
        self.call(&format!("{} list_ids", kind), self.resources(kind).list_ids(filter))
            .await
    }

    pub async fn list(&self, kind: ResourceKind, filter: &Filter) -> Result<Vec<Resource>> {
        self.call(&format!("{} list", kind), self.resources(kind).list(filter))
            .await
    }

    /// Matching resources of every kind
    pub async fn list_all(&self, filter: &Filter) -> Result<Vec<Resource>> {
        let mut all = Vec::new();
        for kind in ResourceKind::ALL {
            all.extend(self.list(kind, filter).await?);
        }
        Ok(all)
    }

    pub async fn get(&self, kind: ResourceKind, id: &str) -> Result<Resource> {
        self.call(&format!("{} get {}", kind, id), self.resources(kind).get(id))
            .await
    }

    /// Invoke the backend operation for a generic signal
    ///
    /// Update and delete hold the resource's write lock.
    pub async fn signal_resource(&self, signal: Signal, resource: &Resource) -> Result<SignalOutcome> {
        let kind = Self::resource_kind(resource)?;
        let _guard = match signal {
            Signal::Deploy => None,
            Signal::UpdateState | Signal::Delete => {
                self.write_lock(Self::lock_key(kind, &resource.id)).await
            }
        };
        self.signal_locked(kind, signal, resource).await
    }

    /// [`Manager::signal_resource`] for a caller already holding the lock
    async fn signal_locked(
        &self,
        kind: ResourceKind,
        signal: Signal,
        resource: &Resource,
    ) -> Result<SignalOutcome> {
        let backend = self.resources(kind);
        match signal {
            Signal::Deploy => {
                let id = self.call(&format!("{} deploy", kind), backend.create(resource)).await?;
                info!("Created {} {}", kind, id);
                Ok(SignalOutcome::Created(id))
            }
            Signal::UpdateState => {
                let op = format!("{} update_state {}", kind, resource.id);
                let applied = self.call(&op, backend.update(resource)).await?;
                if applied {
                    info!("Updated {} {}", kind, resource.id);
                }
                Ok(SignalOutcome::Updated(applied))
            }
            Signal::Delete => {
                let op = format!("{} delete {}", kind, resource.id);
                let deleted = match self.call(&op, backend.delete(&resource.id)).await {
                    Ok(deleted) => deleted,
                    Err(BackendError::ResourceNotFound(_)) => false,
                    Err(e) => return Err(e),
                };
                if deleted {
                    info!("Deleted {} {}", kind, resource.id);
                }
                Ok(SignalOutcome::Deleted(deleted))
            }
        }
    }

    pub async fn create(&self, resource: &Resource) -> Result<String> {
        match self.signal_resource(Signal::Deploy, resource).await? {
            SignalOutcome::Created(id) => Ok(id),
            other => Err(BackendError::ResourceAction(format!(
                "unexpected deploy outcome {:?}",
                other
            ))),
        }
    }

    /// Delete by id; `false` when the resource does not exist
    pub async fn delete(&self, kind: ResourceKind, id: &str) -> Result<bool> {
        let resource = Resource::new(kind.kind_id()).with_id(id);
        match self.signal_resource(Signal::Delete, &resource).await? {
            SignalOutcome::Deleted(deleted) => Ok(deleted),
            other => Err(BackendError::ResourceAction(format!(
                "unexpected delete outcome {:?}",
                other
            ))),
        }
    }

    pub async fn delete_all(&self, kind: ResourceKind, filter: &Filter) -> Result<BatchOutcome> {
        let ids = self.list_ids(kind, filter).await?;
        if ids.is_empty() {
            return Ok(BatchOutcome::new());
        }
        let _guards = self
            .write_locks(ids.iter().map(|id| Self::lock_key(kind, id)).collect())
            .await;
        let filter = filter.clone().with_ids(ids);
        let outcome = self
            .call(&format!("{} delete_all", kind), self.resources(kind).delete_all(&filter))
            .await?;
        info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Deleted {} collection",
            kind
        );
        Ok(outcome)
    }

    /// Apply `change` to the stored resource under its write lock
    ///
    /// `change` sees the current resource and returns the desired one.
    /// Returns `false` when the result equals the stored resource or the
    /// backend reports a no-op.
    pub async fn update_with<F>(&self, kind: ResourceKind, id: &str, change: F) -> DispatchResult<bool>
    where
        F: FnOnce(&Resource) -> DispatchResult<Resource> + Send,
    {
        let _guard = self.write_lock(Self::lock_key(kind, id)).await;
        let current = self.get(kind, id).await?;
        let desired = change(&current)?;
        if desired == current {
            return Ok(false);
        }
        match self.signal_locked(kind, Signal::UpdateState, &desired).await? {
            SignalOutcome::Updated(applied) => Ok(applied),
            other => Err(BackendError::ResourceAction(format!(
                "unexpected update outcome {:?}",
                other
            ))
            .into()),
        }
    }

    /// Run `action` on `resource` through the state machine of `kind`
    ///
    /// The action must be declared by the kind. The stored state is read
    /// under the write lock and the edge `(state, action)` must exist; on
    /// success the returned resource carries the edge target as its state.
    /// Backend failures leave the state unchanged.
    pub async fn delegate_action(
        &self,
        kind: &Kind,
        action: &ActionInstance,
        resource: &Resource,
    ) -> DispatchResult<Resource> {
        let resource_kind = Self::resource_kind(resource)?;
        if kind.id != resource.kind {
            return Err(CoreError::KindMismatch {
                expected: kind.id.to_string(),
                found: resource.kind.to_string(),
            }
            .into());
        }
        if !kind.actions.contains(&action.action) {
            return Err(BackendError::MethodNotImplemented(format!(
                "{} does not declare {}",
                kind.id, action.action
            ))
            .into());
        }

        let _guard = self
            .write_lock(Self::lock_key(resource_kind, &resource.id))
            .await;
        let current = self.get(resource_kind, &resource.id).await?;
        let next = match &kind.state_machine {
            Some(machine) => {
                let state = current.state.as_deref().unwrap_or(&machine.initial);
                Some(machine.transition(state, &action.action)?.to_string())
            }
            None => None,
        };

        let op = format!(
            "{} {} {}",
            resource_kind,
            action.action.term(),
            resource.id
        );
        self.call(&op, self.resources(resource_kind).trigger_action(&resource.id, action))
            .await?;

        let mut updated = current;
        if let (Some(next), Some(machine)) = (next, &kind.state_machine) {
            updated.actions = machine.actions_from(&next);
            updated.state = Some(next);
        }
        info!(
            "Triggered {} on {} {}",
            action.action.term(),
            resource_kind,
            resource.id
        );
        Ok(updated)
    }

    /// Trigger `action` on every matching resource of `kind`, best effort
    ///
    /// Every matching resource is locked before its state is read.
    /// Resources whose state has no edge for the action are recorded as
    /// `ResourceState` failures without reaching the backend.
    pub async fn trigger_action_on_all(
        &self,
        kind: &Kind,
        action: &ActionInstance,
        filter: &Filter,
    ) -> DispatchResult<BatchOutcome> {
        let resource_kind = ResourceKind::from_kind(&kind.id).ok_or_else(|| {
            BackendError::MethodNotImplemented(format!("no backend for kind {}", kind.id))
        })?;
        if !kind.actions.contains(&action.action) {
            return Err(BackendError::MethodNotImplemented(format!(
                "{} does not declare {}",
                kind.id, action.action
            ))
            .into());
        }

        let mut outcome = BatchOutcome::new();
        let ids = self.list_ids(resource_kind, filter).await?;
        if ids.is_empty() {
            return Ok(outcome);
        }
        let _guards = self
            .write_locks(ids.iter().map(|id| Self::lock_key(resource_kind, id)).collect())
            .await;
        let filter = filter.clone().with_ids(ids);

        let mut allowed = Vec::new();
        for resource in self.list(resource_kind, &filter).await? {
            let permitted = match &kind.state_machine {
                Some(machine) => {
                    let current = resource.state.as_deref().unwrap_or(&machine.initial);
                    machine.next_state(current, &action.action).is_some()
                }
                None => true,
            };
            if permitted {
                allowed.push(resource.id);
            } else {
                let message = format!(
                    "{} is not allowed in state {}",
                    action.action.term(),
                    resource.state.as_deref().unwrap_or("unknown")
                );
                outcome.add_failure(resource.id, BackendError::ResourceState(message));
            }
        }

        if !allowed.is_empty() {
            let filter = filter.with_ids(allowed);
            let op = format!("{} {} on all", resource_kind, action.action.term());
            let triggered = self
                .call(
                    &op,
                    self.resources(resource_kind)
                        .trigger_action_on_all(action, &filter),
                )
                .await?;
            outcome.merge(triggered);
        }

        Ok(outcome)
    }

    /// Run `action` on the stored resource `id` of `kind`
    pub async fn trigger(
        &self,
        kind: &Kind,
        id: &str,
        action: &ActionInstance,
    ) -> DispatchResult<Resource> {
        let resource_kind = ResourceKind::from_kind(&kind.id).ok_or_else(|| {
            BackendError::MethodNotImplemented(format!("no backend for kind {}", kind.id))
        })?;
        let resource = Resource::new(resource_kind.kind_id()).with_id(id);
        self.delegate_action(kind, action, &resource).await
    }

    /// Attach a link through the compute backend
    pub async fn attach_link(&self, link: &Link) -> Result<String> {
        let kind = LinkKind::from_kind(link.kind()).ok_or_else(|| {
            BackendError::MethodNotImplemented(format!("no backend for link kind {}", link.kind))
        })?;
        let _guard = self
            .write_lock(Self::lock_key(ResourceKind::Compute, last_segment(&link.source)))
            .await;
        let compute = self.backend.compute.as_ref();
        let id = match kind {
            LinkKind::NetworkInterface => {
                self.call("compute attach_network", compute.attach_network(link))
                    .await?
            }
            LinkKind::StorageLink => {
                self.call("compute attach_storage", compute.attach_storage(link))
                    .await?
            }
        };
        info!("Attached {} {} to {}", kind, id, link.source);
        Ok(id)
    }

    pub async fn get_link(&self, kind: LinkKind, id: &str) -> Result<Link> {
        let compute = self.backend.compute.as_ref();
        match kind {
            LinkKind::NetworkInterface => {
                self.call("compute get_network", compute.get_network(id))
                    .await
            }
            LinkKind::StorageLink => {
                self.call("compute get_storage", compute.get_storage(id))
                    .await
            }
        }
    }

    /// Links of `kind` hanging off any compute resource
    pub async fn list_links(&self, kind: LinkKind) -> Result<Vec<Link>> {
        let mut links = Vec::new();
        for compute in self.list(ResourceKind::Compute, &Filter::all()).await? {
            for link_id in &compute.links {
                match self.get_link(kind, link_id).await {
                    Ok(link) => links.push(link),
                    Err(BackendError::ResourceNotFound(_)) | Err(BackendError::IdentifierNotValid(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(links)
    }

    /// Detach a link; `false` when it does not exist
    ///
    /// Locks the source compute, like [`Manager::attach_link`].
    pub async fn detach_link(&self, kind: LinkKind, id: &str) -> Result<bool> {
        let source = match self.get_link(kind, id).await {
            Ok(link) => link.source,
            Err(BackendError::ResourceNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let _guard = self
            .write_lock(Self::lock_key(ResourceKind::Compute, last_segment(&source)))
            .await;
        let compute = self.backend.compute.as_ref();
        let result = match kind {
            LinkKind::NetworkInterface => {
                self.call("compute detach_network", compute.detach_network(id))
                    .await
            }
            LinkKind::StorageLink => {
                self.call("compute detach_storage", compute.detach_storage(id))
                    .await
            }
        };
        match result {
            Ok(detached) => Ok(detached),
            Err(BackendError::ResourceNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Entity id at the end of a location
fn last_segment(location: &str) -> &str {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(location)
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("backend", &self.backend.name)
            .field("timeout", &self.timeout)
            .field("serialize_writes", &self.locks.is_some())
            .finish()
    }
}
