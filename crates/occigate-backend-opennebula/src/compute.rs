//! Compute backed by OpenNebula virtual machines

use crate::cli::{InstantiateConfig, OneCli};
use crate::mapping::{self, check_id, id_from_location, parse_link_id};
use crate::{absent_is_false, check_updatable, create_error};
use async_trait::async_trait;
use occigate_backend::{BackendError, ComputeBackend, Filter, ResourceBackend, Result};
use occigate_core::schema::infrastructure;
use occigate_core::{ActionInstance, Link, Resource, template};
use std::sync::Arc;
use tracing::info;

pub struct OneCompute {
    cli: Arc<OneCli>,
}

impl OneCompute {
    pub fn new(cli: Arc<OneCli>) -> Self {
        Self { cli }
    }

    /// VM template id selected by the resource's `os_tpl` mixin
    async fn template_for(&self, resource: &Resource) -> Result<String> {
        let mixin = resource
            .mixins
            .iter()
            .find(|m| m.scheme() == infrastructure::OS_TPL_SCHEME)
            .ok_or_else(|| {
                BackendError::ResourceNotValid("compute requires an os_tpl mixin".to_string())
            })?;

        let templates = self.cli.list_templates().await?;
        let name = template::decode(mixin.term(), templates.iter().map(|t| t.name.as_str()))
            .ok_or_else(|| {
                BackendError::ResourceNotValid(format!("unknown os_tpl {}", mixin))
            })?;
        templates
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.id.clone())
            .ok_or_else(|| BackendError::ResourceNotValid(format!("unknown os_tpl {}", mixin)))
    }
}

#[async_trait]
impl ResourceBackend for OneCompute {
    async fn list(&self, filter: &Filter) -> Result<Vec<Resource>> {
        Ok(self
            .cli
            .list_vms()
            .await?
            .iter()
            .map(mapping::compute_from)
            .filter(|r| filter.matches(r))
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Resource> {
        let vm = self.cli.show_vm(check_id(id)?).await?;
        Ok(mapping::compute_from(&vm))
    }

    async fn create(&self, resource: &Resource) -> Result<String> {
        let template_id = self.template_for(resource).await?;
        let attr = |name: &str| resource.attributes.get(name);
        let config = InstantiateConfig {
            name: resource.title().map(str::to_string),
            cpu: attr("occi.compute.cores").and_then(|v| v.as_i64()),
            memory_mb: attr("occi.compute.memory")
                .and_then(|v| v.as_f64())
                .map(|gb| mapping::gb_to_mb("occi.compute.memory", gb))
                .transpose()?,
        };
        let id = self
            .cli
            .instantiate(&template_id, &config)
            .await
            .map_err(create_error)?;
        info!(template = %template_id, "Instantiated VM {}", id);
        Ok(id)
    }

    async fn update(&self, resource: &Resource) -> Result<bool> {
        let current = self.get(&resource.id).await?;
        check_updatable(&current, resource)?;
        match resource.title() {
            Some(title) if current.title() != Some(title) => {
                self.cli.rename_vm(&resource.id, title).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        absent_is_false(self.cli.vm_action("terminate", check_id(id)?, &["--hard"]).await)
    }

    async fn trigger_action(&self, id: &str, action: &ActionInstance) -> Result<()> {
        let id = check_id(id)?;
        let method = action.param("method").unwrap_or_default();
        let hard: &[&str] = if matches!(method.as_str(), "poweroff" | "cold" | "hard") {
            &["--hard"]
        } else {
            &[]
        };
        let command = match action.action.term() {
            "start" => "resume",
            "stop" => "poweroff",
            "restart" => "reboot",
            "suspend" => "suspend",
            other => return Err(BackendError::MethodNotImplemented(format!("compute {other}"))),
        };
        self.cli.vm_action(command, id, hard).await?;
        Ok(())
    }
}

#[async_trait]
impl ComputeBackend for OneCompute {
    async fn attach_network(&self, link: &Link) -> Result<String> {
        let vm_id = id_from_location(&link.source)?;
        let network_id = id_from_location(&link.target)?;
        self.cli.nic_attach(vm_id, network_id).await?;

        let vm = self.cli.show_vm(vm_id).await?;
        vm.template
            .nics
            .iter()
            .filter(|nic| nic.network_id.as_deref() == Some(network_id))
            .filter_map(|nic| nic.nic_id.parse::<u64>().ok())
            .max()
            .map(|nic_id| mapping::nic_link_id(vm_id, &nic_id.to_string()))
            .ok_or_else(|| BackendError::ResourceAction(format!("no NIC for network {network_id}")))
    }

    async fn attach_storage(&self, link: &Link) -> Result<String> {
        let vm_id = id_from_location(&link.source)?;
        let image_id = id_from_location(&link.target)?;
        self.cli.disk_attach(vm_id, image_id).await?;

        let vm = self.cli.show_vm(vm_id).await?;
        vm.template
            .disks
            .iter()
            .filter(|disk| disk.image_id.as_deref() == Some(image_id))
            .filter_map(|disk| disk.disk_id.parse::<u64>().ok())
            .max()
            .map(|disk_id| mapping::disk_link_id(vm_id, &disk_id.to_string()))
            .ok_or_else(|| BackendError::ResourceAction(format!("no disk for image {image_id}")))
    }

    async fn detach_network(&self, link_id: &str) -> Result<bool> {
        let (vm_id, nic_id) = parse_link_id(link_id, "nic")?;
        if self.get_network(link_id).await.is_err() {
            return Ok(false);
        }
        absent_is_false(self.cli.nic_detach(vm_id, nic_id).await)
    }

    async fn detach_storage(&self, link_id: &str) -> Result<bool> {
        let (vm_id, disk_id) = parse_link_id(link_id, "disk")?;
        if self.get_storage(link_id).await.is_err() {
            return Ok(false);
        }
        absent_is_false(self.cli.disk_detach(vm_id, disk_id).await)
    }

    async fn get_network(&self, link_id: &str) -> Result<Link> {
        let (vm_id, nic_id) = parse_link_id(link_id, "nic")?;
        let vm = self.cli.show_vm(vm_id).await?;
        vm.template
            .nics
            .iter()
            .find(|nic| nic.nic_id == nic_id)
            .map(|nic| mapping::network_link_from(vm_id, nic))
            .ok_or_else(|| BackendError::ResourceNotFound(link_id.to_string()))
    }

    async fn get_storage(&self, link_id: &str) -> Result<Link> {
        let (vm_id, disk_id) = parse_link_id(link_id, "disk")?;
        let vm = self.cli.show_vm(vm_id).await?;
        vm.template
            .disks
            .iter()
            .find(|disk| disk.disk_id == disk_id)
            .map(|disk| mapping::storage_link_from(vm_id, disk))
            .ok_or_else(|| BackendError::ResourceNotFound(link_id.to_string()))
    }
}
