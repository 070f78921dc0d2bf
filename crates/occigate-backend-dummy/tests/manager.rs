use async_trait::async_trait;
use occigate_backend::{
    Backend, BackendError, DispatchError, Filter, LinkKind, Manager, NetworkBackend,
    ResourceBackend, ResourceKind, Result, StorageBackend,
};
use occigate_backend_dummy::{DummyBackend, OS_TEMPLATES};
use occigate_core::schema::infrastructure;
use occigate_core::{ActionInstance, CoreError, Kind, Link, Registry, Resource, template};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn compute_kind() -> Kind {
    Registry::with_builtin()
        .unwrap()
        .kind(&infrastructure::compute())
        .unwrap()
        .clone()
}

fn new_compute() -> Resource {
    Resource::new(infrastructure::compute())
        .with_mixin(template::os_template(OS_TEMPLATES[0]).id)
        .with_attribute("occi.core.title", "vm")
}

fn action(term: &str) -> ActionInstance {
    ActionInstance::new(infrastructure::compute_action(term))
}

#[tokio::test]
async fn test_suspend_then_start() {
    let manager = Manager::new(DummyBackend::new().backend());
    let kind = compute_kind();
    let id = manager.create(&new_compute()).await.unwrap();

    let suspended = manager.trigger(&kind, &id, &action("suspend")).await.unwrap();
    assert_eq!(suspended.state.as_deref(), Some("suspended"));
    assert_eq!(suspended.actions, vec![infrastructure::compute_action("start")]);

    let active = manager.trigger(&kind, &id, &action("start")).await.unwrap();
    assert_eq!(active.state.as_deref(), Some("active"));

    let err = manager.trigger(&kind, &id, &action("start")).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Core(CoreError::InvalidStateTransition { .. })
    ));
    let stored = manager.get(ResourceKind::Compute, &id).await.unwrap();
    assert_eq!(stored.state.as_deref(), Some("active"));
}

#[tokio::test]
async fn test_failed_action_keeps_state() {
    let dummy = DummyBackend::new();
    let manager = Manager::new(dummy.backend());
    let kind = compute_kind();
    let id = manager.create(&new_compute()).await.unwrap();
    dummy
        .compute
        .resources()
        .inject_fault(&id, BackendError::ResourceAction("hypervisor busy".into()))
        .await;

    let err = manager.trigger(&kind, &id, &action("suspend")).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Backend(BackendError::ResourceAction(ref message)) if message == "hypervisor busy"
    ));
    let stored = manager.get(ResourceKind::Compute, &id).await.unwrap();
    assert_eq!(stored.state.as_deref(), Some("active"));
}

#[tokio::test]
async fn test_undeclared_action_is_not_implemented() {
    let manager = Manager::new(DummyBackend::new().backend());
    let kind = compute_kind();
    let id = manager.create(&new_compute()).await.unwrap();
    let resize = ActionInstance::new(infrastructure::storage_action("resize"));
    let err = manager.trigger(&kind, &id, &resize).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Backend(BackendError::MethodNotImplemented(_))
    ));
}

#[tokio::test]
async fn test_create_assigns_distinct_ids() {
    let manager = Manager::new(DummyBackend::new().backend());
    let a = manager.create(&new_compute()).await.unwrap();
    let b = manager.create(&new_compute()).await.unwrap();
    assert_ne!(a, b);
    let ids = manager.list_ids(ResourceKind::Compute, &Filter::all()).await.unwrap();
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn test_compute_without_os_template_is_rejected() {
    let manager = Manager::new(DummyBackend::new().backend());
    let err = manager
        .create(&Resource::new(infrastructure::compute()))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::ResourceNotValid(_)));
}

#[tokio::test]
async fn test_delete_absent_returns_false() {
    let manager = Manager::new(DummyBackend::new().backend());
    assert!(!manager.delete(ResourceKind::Storage, "missing").await.unwrap());

    let id = manager
        .create(&Resource::new(infrastructure::storage()))
        .await
        .unwrap();
    assert!(manager.delete(ResourceKind::Storage, &id).await.unwrap());
    assert!(!manager.delete(ResourceKind::Storage, &id).await.unwrap());
}

#[tokio::test]
async fn test_batch_action_is_best_effort() {
    let dummy = DummyBackend::new();
    let manager = Manager::new(dummy.backend());
    let kind = compute_kind();
    let a = manager.create(&new_compute()).await.unwrap();
    let b = manager.create(&new_compute()).await.unwrap();
    let c = manager.create(&new_compute()).await.unwrap();

    // c is already inactive, so stop has no edge for it
    manager.trigger(&kind, &c, &action("stop")).await.unwrap();
    dummy
        .compute
        .resources()
        .inject_fault(&b, BackendError::ResourceAction("hypervisor busy".into()))
        .await;

    let outcome = manager
        .trigger_action_on_all(&kind, &action("stop"), &Filter::all())
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, vec![a.clone()]);
    assert_eq!(outcome.failed.len(), 2);
    assert!(!outcome.is_success());

    let failed_b = outcome.failed.iter().find(|f| f.id == b).unwrap();
    assert!(matches!(failed_b.error, BackendError::ResourceAction(_)));
    let failed_c = outcome.failed.iter().find(|f| f.id == c).unwrap();
    assert!(matches!(failed_c.error, BackendError::ResourceState(_)));

    let stopped = manager.get(ResourceKind::Compute, &a).await.unwrap();
    assert_eq!(stopped.state.as_deref(), Some("inactive"));
    let untouched = manager.get(ResourceKind::Compute, &b).await.unwrap();
    assert_eq!(untouched.state.as_deref(), Some("active"));
}

#[tokio::test]
async fn test_delete_all_with_mixin_filter() {
    let manager = Manager::new(DummyBackend::new().backend());
    let tag = occigate_core::CategoryId::parse("http://example.org/tags#prod").unwrap();
    let tagged = manager
        .create(&Resource::new(infrastructure::network()).with_mixin(tag.clone()))
        .await
        .unwrap();
    let plain = manager
        .create(&Resource::new(infrastructure::network()))
        .await
        .unwrap();

    let outcome = manager
        .delete_all(ResourceKind::Network, &Filter::all().with_mixin(tag))
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, vec![tagged]);
    let remaining = manager.list_ids(ResourceKind::Network, &Filter::all()).await.unwrap();
    assert_eq!(remaining, vec![plain]);
}

#[tokio::test]
async fn test_links_through_compute() {
    let manager = Manager::new(DummyBackend::new().backend());
    let vm = manager.create(&new_compute()).await.unwrap();
    let link = Link::new(
        infrastructure::storagelink(),
        format!("/compute/{vm}"),
        "/storage/disk1",
    );
    let link_id = manager.attach_link(&link).await.unwrap();

    let links = manager.list_links(LinkKind::StorageLink).await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].id, link_id);
    assert!(manager.list_links(LinkKind::NetworkInterface).await.unwrap().is_empty());

    assert!(manager.detach_link(LinkKind::StorageLink, &link_id).await.unwrap());
    assert!(!manager.detach_link(LinkKind::StorageLink, &link_id).await.unwrap());
}

struct SlowStorage;

#[async_trait]
impl ResourceBackend for SlowStorage {
    async fn list(&self, _filter: &Filter) -> Result<Vec<Resource>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }

    async fn get(&self, id: &str) -> Result<Resource> {
        Err(BackendError::ResourceNotFound(id.to_string()))
    }

    async fn create(&self, _resource: &Resource) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("late".to_string())
    }

    async fn update(&self, _resource: &Resource) -> Result<bool> {
        Ok(false)
    }

    async fn delete(&self, _id: &str) -> Result<bool> {
        Ok(false)
    }

    async fn trigger_action(&self, _id: &str, _action: &ActionInstance) -> Result<()> {
        Ok(())
    }
}

impl StorageBackend for SlowStorage {}

#[tokio::test(start_paused = true)]
async fn test_slow_backend_times_out() {
    let dummy = DummyBackend::new();
    let backend = Backend {
        storage: Arc::new(SlowStorage),
        ..dummy.backend()
    };
    let manager = Manager::new(backend).with_timeout(Duration::from_secs(5));

    let err = manager
        .create(&Resource::new(infrastructure::storage()))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::ServiceUnavailable(_)));

    let err = manager
        .list(ResourceKind::Storage, &Filter::all())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::ServiceUnavailable(_)));

    // Other kinds are unaffected
    assert!(manager.list(ResourceKind::Network, &Filter::all()).await.unwrap().is_empty());
}

/// One network that trusts every action and answers slowly
struct SlowNetwork {
    stored: Mutex<Option<Resource>>,
    actions: AtomicUsize,
}

impl SlowNetwork {
    fn with_network() -> Self {
        let network = Resource::new(infrastructure::network())
            .with_id("1")
            .with_state("inactive");
        Self {
            stored: Mutex::new(Some(network)),
            actions: AtomicUsize::new(0),
        }
    }

    fn snapshot(&self) -> Option<Resource> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceBackend for SlowNetwork {
    async fn list(&self, _filter: &Filter) -> Result<Vec<Resource>> {
        Ok(self.snapshot().into_iter().collect())
    }

    async fn get(&self, id: &str) -> Result<Resource> {
        self.snapshot()
            .ok_or_else(|| BackendError::ResourceNotFound(id.to_string()))
    }

    async fn create(&self, _resource: &Resource) -> Result<String> {
        Err(BackendError::not_implemented("create"))
    }

    async fn update(&self, resource: &Resource) -> Result<bool> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        *self.stored.lock().unwrap() = Some(resource.clone());
        Ok(true)
    }

    async fn delete(&self, _id: &str) -> Result<bool> {
        Ok(false)
    }

    async fn trigger_action(&self, _id: &str, _action: &ActionInstance) -> Result<()> {
        self.actions.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        if let Some(network) = self.stored.lock().unwrap().as_mut() {
            network.state = Some("active".to_string());
        }
        Ok(())
    }
}

impl NetworkBackend for SlowNetwork {}

fn network_kind() -> Kind {
    Registry::with_builtin()
        .unwrap()
        .kind(&infrastructure::network())
        .unwrap()
        .clone()
}

#[tokio::test]
async fn test_concurrent_actions_see_committed_state() {
    let network = Arc::new(SlowNetwork::with_network());
    let backend = Backend {
        network: network.clone(),
        ..DummyBackend::new().backend()
    };
    let manager = Manager::new(backend);
    let kind = network_kind();
    let up = ActionInstance::new(infrastructure::network_action("up"));

    let (first, second) = tokio::join!(
        manager.trigger(&kind, "1", &up),
        manager.trigger(&kind, "1", &up)
    );

    let results = [first, second];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(DispatchError::Core(CoreError::InvalidStateTransition { .. }))
    )));
    assert_eq!(network.actions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_updates_are_not_lost() {
    let network = Arc::new(SlowNetwork::with_network());
    let backend = Backend {
        network: network.clone(),
        ..DummyBackend::new().backend()
    };
    let manager = Manager::new(backend);
    let a = occigate_core::CategoryId::parse("http://example.org/tags#a").unwrap();
    let b = occigate_core::CategoryId::parse("http://example.org/tags#b").unwrap();

    let tag = |mixin: &occigate_core::CategoryId| {
        let mixin = mixin.clone();
        move |stored: &Resource| {
            let mut tagged = stored.clone();
            tagged.add_mixin(mixin);
            Ok::<_, DispatchError>(tagged)
        }
    };
    let (first, second) = tokio::join!(
        manager.update_with(ResourceKind::Network, "1", tag(&a)),
        manager.update_with(ResourceKind::Network, "1", tag(&b))
    );
    assert!(first.unwrap());
    assert!(second.unwrap());

    let stored = network.snapshot().unwrap();
    assert!(stored.mixins.contains(&a));
    assert!(stored.mixins.contains(&b));
}

#[tokio::test]
async fn test_update_with_unchanged_is_noop() {
    let manager = Manager::new(DummyBackend::new().backend());
    let id = manager.create(&new_compute()).await.unwrap();
    let changed = manager
        .update_with(ResourceKind::Compute, &id, |stored| Ok(stored.clone()))
        .await
        .unwrap();
    assert!(!changed);

    let changed = manager
        .update_with(ResourceKind::Compute, &id, |stored| {
            Ok(stored.clone().with_attribute("occi.core.title", "renamed"))
        })
        .await
        .unwrap();
    assert!(changed);
    let stored = manager.get(ResourceKind::Compute, &id).await.unwrap();
    assert_eq!(stored.title(), Some("renamed"));
}
