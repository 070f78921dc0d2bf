//! Conversions between OpenNebula objects and OCCI entities

use crate::cli::{DiskInfo, ImageInfo, NicInfo, VmInfo, VnetInfo};
use crate::error::{OpenNebulaError, Result};
use occigate_core::schema::infrastructure;
use occigate_core::{AttributeValue, Link, Resource, StateMachine};

/// VM `STATE` codes
pub mod vm_state {
    pub const INIT: &str = "0";
    pub const PENDING: &str = "1";
    pub const HOLD: &str = "2";
    pub const ACTIVE: &str = "3";
    pub const STOPPED: &str = "4";
    pub const SUSPENDED: &str = "5";
    pub const POWEROFF: &str = "8";
    pub const UNDEPLOYED: &str = "9";
}

/// Image `STATE` code for a disabled image
pub const IMAGE_DISABLED: &str = "4";

/// OCCI compute state for a VM `STATE`
pub fn compute_state(state: &str) -> &'static str {
    match state {
        vm_state::INIT | vm_state::PENDING | vm_state::HOLD | vm_state::ACTIVE => "active",
        vm_state::SUSPENDED => "suspended",
        _ => "inactive",
    }
}

/// OCCI storage state for an image `STATE`
pub fn storage_state(state: &str) -> &'static str {
    match state {
        IMAGE_DISABLED => "offline",
        _ => "online",
    }
}

/// OpenNebula ids are non-negative integers
pub fn check_id(id: &str) -> Result<&str> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Ok(id)
    } else {
        Err(OpenNebulaError::InvalidIdentifier(id.to_string()))
    }
}

/// Last path segment of an entity location
pub fn id_from_location(location: &str) -> Result<&str> {
    let id = location.trim_end_matches('/').rsplit('/').next().unwrap_or(location);
    check_id(id)
}

fn with_state(mut resource: Resource, machine: &StateMachine, state: &str) -> Resource {
    resource.actions = machine.actions_from(state);
    resource.state = Some(state.to_string());
    resource
}

fn parse_int(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

pub fn compute_from(vm: &VmInfo) -> Resource {
    let mut resource = Resource::new(infrastructure::compute())
        .with_id(&vm.id)
        .with_attribute("occi.core.title", vm.name.as_str())
        .with_attribute("occi.compute.hostname", vm.name.as_str());

    let cores = parse_int(vm.template.vcpu.as_deref()).or(parse_int(vm.template.cpu.as_deref()));
    if let Some(cores) = cores {
        resource
            .attributes
            .insert("occi.compute.cores".into(), AttributeValue::Integer(cores));
    }
    if let Some(memory_mb) = parse_int(vm.template.memory.as_deref()) {
        resource.attributes.insert(
            "occi.compute.memory".into(),
            AttributeValue::Float(memory_mb as f64 / 1024.0),
        );
    }
    for nic in vm.template.nics.iter() {
        resource.add_link(nic_link_id(&vm.id, &nic.nic_id));
    }
    for disk in vm.template.disks.iter() {
        resource.add_link(disk_link_id(&vm.id, &disk.disk_id));
    }

    with_state(
        resource,
        &infrastructure::compute_machine(),
        compute_state(&vm.state),
    )
}

pub fn network_from(vnet: &VnetInfo) -> Resource {
    let mut resource = Resource::new(infrastructure::network())
        .with_id(&vnet.id)
        .with_attribute("occi.core.title", vnet.name.as_str())
        .with_attribute("occi.network.label", vnet.name.as_str());
    if let Some(vlan) = parse_int(vnet.vlan_id.as_deref()) {
        resource
            .attributes
            .insert("occi.network.vlan".into(), AttributeValue::Integer(vlan));
    }
    if let Some(address) = &vnet.template.network_address {
        resource.add_mixin(infrastructure::ipnetwork());
        resource
            .attributes
            .insert("occi.network.address".into(), address.as_str().into());
        if let Some(gateway) = &vnet.template.gateway {
            resource
                .attributes
                .insert("occi.network.gateway".into(), gateway.as_str().into());
        }
    }
    // Virtual networks are usable as soon as they exist
    with_state(resource, &infrastructure::network_machine(), "active")
}

pub fn storage_from(image: &ImageInfo) -> Resource {
    let mut resource = Resource::new(infrastructure::storage())
        .with_id(&image.id)
        .with_attribute("occi.core.title", image.name.as_str());
    if let Some(size_mb) = parse_int(image.size.as_deref()) {
        resource.attributes.insert(
            "occi.storage.size".into(),
            AttributeValue::Float(size_mb as f64 / 1024.0),
        );
    }
    with_state(
        resource,
        &infrastructure::storage_machine(),
        storage_state(&image.state),
    )
}

pub fn nic_link_id(vm_id: &str, nic_id: &str) -> String {
    format!("compute_{vm_id}_nic_{nic_id}")
}

pub fn disk_link_id(vm_id: &str, disk_id: &str) -> String {
    format!("compute_{vm_id}_disk_{disk_id}")
}

/// Split `compute_<vm>_<nic|disk>_<n>` into `(vm, n)`
pub fn parse_link_id<'a>(link_id: &'a str, infix: &str) -> Result<(&'a str, &'a str)> {
    let invalid = || OpenNebulaError::InvalidIdentifier(link_id.to_string());
    let rest = link_id.strip_prefix("compute_").ok_or_else(invalid)?;
    let (vm, n) = rest
        .split_once(&format!("_{infix}_"))
        .ok_or_else(invalid)?;
    Ok((check_id(vm)?, check_id(n)?))
}

pub fn network_link_from(vm_id: &str, nic: &NicInfo) -> Link {
    let target = format!("/network/{}", nic.network_id.as_deref().unwrap_or_default());
    let mut link = Link::new(
        infrastructure::networkinterface(),
        format!("/compute/{vm_id}"),
        target,
    )
    .with_id(nic_link_id(vm_id, &nic.nic_id))
    .with_attribute("occi.networkinterface.interface", format!("eth{}", nic.nic_id));
    if let Some(mac) = &nic.mac {
        link = link.with_attribute("occi.networkinterface.mac", mac.as_str());
    }
    if let Some(ip) = &nic.ip {
        link = link
            .with_mixin(infrastructure::ipnetworkinterface())
            .with_attribute("occi.networkinterface.address", ip.as_str());
    }
    link
}

pub fn storage_link_from(vm_id: &str, disk: &DiskInfo) -> Link {
    let target = format!("/storage/{}", disk.image_id.as_deref().unwrap_or_default());
    let mut link = Link::new(
        infrastructure::storagelink(),
        format!("/compute/{vm_id}"),
        target,
    )
    .with_id(disk_link_id(vm_id, &disk.disk_id));
    if let Some(device) = &disk.target {
        link = link.with_attribute("occi.storagelink.deviceid", device.as_str());
    }
    link
}

/// Attributes the adapter can change on an existing object
pub const UPDATABLE: &[&str] = &["occi.core.title"];

/// Attributes and mixins that differ between `current` and `desired` but
/// cannot be applied to an existing object
pub fn unsupported_changes(current: &Resource, desired: &Resource) -> Vec<String> {
    let mut names: Vec<String> = desired
        .attributes
        .iter()
        .filter(|(name, value)| current.attributes.get(*name) != Some(*value))
        .map(|(name, _)| name.clone())
        .chain(
            current
                .attributes
                .keys()
                .filter(|name| !desired.attributes.contains_key(*name))
                .cloned(),
        )
        .filter(|name| !UPDATABLE.contains(&name.as_str()))
        .collect();
    names.extend(
        desired
            .mixins
            .iter()
            .filter(|m| !current.mixins.contains(m))
            .chain(current.mixins.iter().filter(|m| !desired.mixins.contains(m)))
            .map(|m| m.to_string()),
    );
    names
}

/// Quote a value for an OpenNebula template
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Virtual network template for `onevnet create`
pub fn vnet_template(network: &Resource, bridge: &str) -> String {
    let name = network.title().unwrap_or("occi-network");
    let mut lines = vec![
        format!("NAME = {}", quote(name)),
        "VN_MAD = \"bridge\"".to_string(),
        format!("BRIDGE = {}", quote(bridge)),
    ];
    if let Some(vlan) = network.attributes.get("occi.network.vlan").and_then(|v| v.as_i64()) {
        lines.push(format!("VLAN_ID = {vlan}"));
    }
    if let Some(address) = network.attributes.get("occi.network.address").and_then(|v| v.as_str()) {
        lines.push(format!("NETWORK_ADDRESS = {}", quote(address)));
    }
    if let Some(gateway) = network.attributes.get("occi.network.gateway").and_then(|v| v.as_str()) {
        lines.push(format!("GATEWAY = {}", quote(gateway)));
    }
    lines.join("\n") + "\n"
}

/// Whole megabytes for a size in gigabytes
///
/// Sizes that round to zero or below, or overflow, are rejected.
pub fn gb_to_mb(name: &str, gb: f64) -> Result<i64> {
    let mb = (gb * 1024.0).round();
    if mb.is_finite() && mb >= 1.0 && mb < i64::MAX as f64 {
        Ok(mb as i64)
    } else {
        Err(OpenNebulaError::InvalidAttribute(format!("{name} = {gb}")))
    }
}

/// Datablock image template for `oneimage create`
pub fn image_template(storage: &Resource) -> Result<String> {
    let name = storage.title().unwrap_or("occi-storage");
    let size_mb = match storage.attributes.get("occi.storage.size").and_then(|v| v.as_f64()) {
        Some(gb) => gb_to_mb("occi.storage.size", gb)?,
        None => 1024,
    };
    Ok(format!(
        "NAME = {}\nTYPE = \"DATABLOCK\"\nSIZE = {}\n",
        quote(name),
        size_mb
    ))
}
