//! OCCI infrastructure categories: compute, network, storage and their links

use super::base;
use crate::category::{Action, AttributeDef, Category, CategoryId, EntityType, Kind, Mixin};
use crate::state::StateMachine;

pub const SCHEME: &str = "http://schemas.ogf.org/occi/infrastructure#";
pub const COMPUTE_ACTION_SCHEME: &str = "http://schemas.ogf.org/occi/infrastructure/compute/action#";
pub const NETWORK_ACTION_SCHEME: &str = "http://schemas.ogf.org/occi/infrastructure/network/action#";
pub const STORAGE_ACTION_SCHEME: &str = "http://schemas.ogf.org/occi/infrastructure/storage/action#";
pub const OS_TPL_SCHEME: &str = "http://schemas.ogf.org/occi/infrastructure/os_tpl#";
pub const RESOURCE_TPL_SCHEME: &str = "http://schemas.ogf.org/occi/infrastructure/resource_tpl#";

pub fn compute() -> CategoryId {
    CategoryId::known(SCHEME, "compute")
}

pub fn network() -> CategoryId {
    CategoryId::known(SCHEME, "network")
}

pub fn storage() -> CategoryId {
    CategoryId::known(SCHEME, "storage")
}

pub fn networkinterface() -> CategoryId {
    CategoryId::known(SCHEME, "networkinterface")
}

pub fn storagelink() -> CategoryId {
    CategoryId::known(SCHEME, "storagelink")
}

pub fn os_tpl() -> CategoryId {
    CategoryId::known(SCHEME, "os_tpl")
}

pub fn resource_tpl() -> CategoryId {
    CategoryId::known(SCHEME, "resource_tpl")
}

pub fn ipnetwork() -> CategoryId {
    CategoryId::known(SCHEME, "ipnetwork")
}

pub fn ipnetworkinterface() -> CategoryId {
    CategoryId::known(SCHEME, "ipnetworkinterface")
}

pub fn compute_action(term: &str) -> CategoryId {
    CategoryId::known(COMPUTE_ACTION_SCHEME, term)
}

pub fn network_action(term: &str) -> CategoryId {
    CategoryId::known(NETWORK_ACTION_SCHEME, term)
}

pub fn storage_action(term: &str) -> CategoryId {
    CategoryId::known(STORAGE_ACTION_SCHEME, term)
}

const COMPUTE_ACTIONS: [&str; 4] = ["start", "stop", "restart", "suspend"];
const NETWORK_ACTIONS: [&str; 2] = ["up", "down"];
const STORAGE_ACTIONS: [&str; 5] = ["online", "offline", "backup", "snapshot", "resize"];

fn method_param(description: &str) -> AttributeDef {
    AttributeDef::string().with_description(description)
}

/// `inactive`, `active`, `suspended`; starts `active`
pub fn compute_machine() -> StateMachine {
    StateMachine::new("active")
        .with_state("inactive")
        .with_state("suspended")
        .with_transition("inactive", compute_action("restart"), "active")
        .with_transition("active", compute_action("stop"), "inactive")
        .with_transition("active", compute_action("suspend"), "suspended")
        .with_transition("suspended", compute_action("start"), "active")
}

/// `inactive`, `active`; starts `inactive`
pub fn network_machine() -> StateMachine {
    StateMachine::new("inactive")
        .with_state("active")
        .with_transition("inactive", network_action("up"), "active")
        .with_transition("active", network_action("down"), "inactive")
}

/// `offline`, `online`; starts `online`
pub fn storage_machine() -> StateMachine {
    StateMachine::new("online")
        .with_state("offline")
        .with_transition("offline", storage_action("online"), "online")
        .with_transition("online", storage_action("offline"), "offline")
        .with_transition("online", storage_action("backup"), "online")
        .with_transition("online", storage_action("snapshot"), "online")
        .with_transition("online", storage_action("resize"), "online")
        .with_transition("offline", storage_action("resize"), "offline")
}

fn actions() -> Vec<Action> {
    vec![
        Action::new(compute_action("start")).with_title("Start the compute"),
        Action::new(compute_action("stop"))
            .with_title("Stop the compute")
            .with_attribute("method", method_param("graceful, acpioff or poweroff")),
        Action::new(compute_action("restart"))
            .with_title("Restart the compute")
            .with_attribute("method", method_param("graceful, warm or cold")),
        Action::new(compute_action("suspend"))
            .with_title("Suspend the compute")
            .with_attribute("method", method_param("hibernate or suspend")),
        Action::new(network_action("up")).with_title("Activate the network"),
        Action::new(network_action("down")).with_title("Deactivate the network"),
        Action::new(storage_action("online")).with_title("Bring the storage online"),
        Action::new(storage_action("offline")).with_title("Take the storage offline"),
        Action::new(storage_action("backup")).with_title("Back up the storage"),
        Action::new(storage_action("snapshot")).with_title("Snapshot the storage"),
        Action::new(storage_action("resize"))
            .with_title("Resize the storage")
            .with_attribute(
                "size",
                AttributeDef::float().with_description("New size in GiB"),
            ),
    ]
}

fn kinds() -> Vec<Kind> {
    let mut compute_kind = Kind::new(compute())
        .with_title("Compute resource")
        .with_related(base::resource())
        .with_location("/compute/")
        .with_attribute(
            "occi.compute.architecture",
            AttributeDef::string().with_description("x86 or x64"),
        )
        .with_attribute("occi.compute.cores", AttributeDef::integer())
        .with_attribute("occi.compute.hostname", AttributeDef::string())
        .with_attribute(
            "occi.compute.memory",
            AttributeDef::float().with_description("Memory in GiB"),
        )
        .with_attribute(
            "occi.compute.speed",
            AttributeDef::float().with_description("CPU clock frequency in GHz"),
        )
        .with_state_machine(compute_machine());
    for term in COMPUTE_ACTIONS {
        compute_kind = compute_kind.with_action(compute_action(term));
    }

    let mut network_kind = Kind::new(network())
        .with_title("Network resource")
        .with_related(base::resource())
        .with_location("/network/")
        .with_attribute("occi.network.vlan", AttributeDef::integer())
        .with_attribute("occi.network.label", AttributeDef::string())
        .with_state_machine(network_machine());
    for term in NETWORK_ACTIONS {
        network_kind = network_kind.with_action(network_action(term));
    }

    let mut storage_kind = Kind::new(storage())
        .with_title("Storage resource")
        .with_related(base::resource())
        .with_location("/storage/")
        .with_attribute(
            "occi.storage.size",
            AttributeDef::float().with_description("Size in GiB"),
        )
        .with_state_machine(storage_machine());
    for term in STORAGE_ACTIONS {
        storage_kind = storage_kind.with_action(storage_action(term));
    }

    let networkinterface_kind = Kind::new(networkinterface())
        .with_title("Network interface link")
        .with_related(base::link())
        .with_entity_type(EntityType::Link)
        .with_location("/link/networkinterface/")
        .with_attribute(
            "occi.networkinterface.interface",
            AttributeDef::string().immutable(),
        )
        .with_attribute("occi.networkinterface.mac", AttributeDef::string());

    let storagelink_kind = Kind::new(storagelink())
        .with_title("Storage link")
        .with_related(base::link())
        .with_entity_type(EntityType::Link)
        .with_location("/link/storagelink/")
        .with_attribute("occi.storagelink.deviceid", AttributeDef::string())
        .with_attribute("occi.storagelink.mountpoint", AttributeDef::string());

    vec![
        compute_kind,
        network_kind,
        storage_kind,
        networkinterface_kind,
        storagelink_kind,
    ]
}

fn mixins() -> Vec<Mixin> {
    vec![
        Mixin::new(os_tpl())
            .with_title("Operating system template")
            .with_location("/mixins/os_tpl/")
            .with_applies(compute()),
        Mixin::new(resource_tpl())
            .with_title("Resource template")
            .with_location("/mixins/resource_tpl/")
            .with_applies(compute()),
        Mixin::new(ipnetwork())
            .with_title("IP network")
            .with_location("/mixins/ipnetwork/")
            .with_applies(network())
            .with_attribute("occi.network.address", AttributeDef::string())
            .with_attribute("occi.network.gateway", AttributeDef::string())
            .with_attribute(
                "occi.network.allocation",
                AttributeDef::string().with_description("dynamic or static"),
            ),
        Mixin::new(ipnetworkinterface())
            .with_title("IP network interface")
            .with_location("/mixins/ipnetworkinterface/")
            .with_applies(networkinterface())
            .with_attribute("occi.networkinterface.address", AttributeDef::string())
            .with_attribute("occi.networkinterface.gateway", AttributeDef::string())
            .with_attribute(
                "occi.networkinterface.allocation",
                AttributeDef::string().with_description("dynamic or static"),
            ),
    ]
}

pub fn categories() -> Vec<Category> {
    let mut categories: Vec<Category> = Vec::new();
    categories.extend(actions().into_iter().map(Category::Action));
    categories.extend(kinds().into_iter().map(Category::Kind));
    categories.extend(mixins().into_iter().map(Category::Mixin));
    categories
}
