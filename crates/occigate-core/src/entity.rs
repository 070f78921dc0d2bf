//! Entity instances: resources and links

use crate::category::{AttributeValue, CategoryId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Typed attribute map of an entity
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Attribute names shared by every entity
pub mod attr {
    pub const ID: &str = "occi.core.id";
    pub const TITLE: &str = "occi.core.title";
    pub const SUMMARY: &str = "occi.core.summary";
    pub const SOURCE: &str = "occi.core.source";
    pub const TARGET: &str = "occi.core.target";
}

/// Common view over resources and links
pub trait Entity {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn kind(&self) -> &CategoryId;
    fn mixins(&self) -> &[CategoryId];
    fn attributes(&self) -> &Attributes;
    fn attributes_mut(&mut self) -> &mut Attributes;

    fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes().get(name)
    }

    fn has_mixin(&self, mixin: &CategoryId) -> bool {
        self.mixins().contains(mixin)
    }
}

/// Instance of a resource kind (compute, network, storage, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub id: String,
    pub kind: CategoryId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<CategoryId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Actions currently applicable to the resource
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<CategoryId>,
    /// Ids of links whose source is this resource
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
}

impl Resource {
    pub fn new(kind: CategoryId) -> Self {
        Self {
            id: String::new(),
            kind,
            mixins: Vec::new(),
            attributes: Attributes::new(),
            state: None,
            actions: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_mixin(mut self, mixin: CategoryId) -> Self {
        self.add_mixin(mixin);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn add_mixin(&mut self, mixin: CategoryId) {
        if !self.mixins.contains(&mixin) {
            self.mixins.push(mixin);
        }
    }

    pub fn remove_mixin(&mut self, mixin: &CategoryId) -> bool {
        let before = self.mixins.len();
        self.mixins.retain(|m| m != mixin);
        before != self.mixins.len()
    }

    pub fn add_link(&mut self, link_id: impl Into<String>) {
        let link_id = link_id.into();
        if !self.links.contains(&link_id) {
            self.links.push(link_id);
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.attributes.get(attr::TITLE).and_then(|v| v.as_str())
    }
}

impl Entity for Resource {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn kind(&self) -> &CategoryId {
        &self.kind
    }

    fn mixins(&self) -> &[CategoryId] {
        &self.mixins
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }
}

/// Instance of a link kind connecting two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub id: String,
    pub kind: CategoryId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<CategoryId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    pub source: String,
    pub target: String,
}

impl Link {
    pub fn new(kind: CategoryId, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            kind,
            mixins: Vec::new(),
            attributes: Attributes::new(),
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_mixin(mut self, mixin: CategoryId) -> Self {
        if !self.mixins.contains(&mixin) {
            self.mixins.push(mixin);
        }
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

impl Entity for Link {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn kind(&self) -> &CategoryId {
        &self.kind
    }

    fn mixins(&self) -> &[CategoryId] {
        &self.mixins
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }
}

/// Action invocation request: the action and its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInstance {
    pub action: CategoryId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

impl ActionInstance {
    pub fn new(action: CategoryId) -> Self {
        Self {
            action,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Parameter value as text, whatever its type
    pub fn param(&self, name: &str) -> Option<String> {
        self.attributes.get(name).map(|v| v.to_string())
    }
}
