//! Aggregated query result handed to the renderers

use crate::category::{Action, Category, Kind, Mixin};
use crate::entity::{Link, Resource};
use serde::{Deserialize, Serialize};

/// Categories and entities returned by one request
///
/// Empty sequences are skipped on serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<Kind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<Mixin>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
            && self.mixins.is_empty()
            && self.actions.is_empty()
            && self.resources.is_empty()
            && self.links.is_empty()
    }

    /// Number of entities (resources and links)
    pub fn entity_count(&self) -> usize {
        self.resources.len() + self.links.len()
    }

    pub fn push_category(&mut self, category: Category) {
        match category {
            Category::Kind(k) => self.kinds.push(k),
            Category::Mixin(m) => self.mixins.push(m),
            Category::Action(a) => self.actions.push(a),
        }
    }

    pub fn merge(&mut self, other: Collection) {
        self.kinds.extend(other.kinds);
        self.mixins.extend(other.mixins);
        self.actions.extend(other.actions);
        self.resources.extend(other.resources);
        self.links.extend(other.links);
    }

    /// All categories in kind, mixin, action order
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.kinds
            .iter()
            .cloned()
            .map(Category::Kind)
            .chain(self.mixins.iter().cloned().map(Category::Mixin))
            .chain(self.actions.iter().cloned().map(Category::Action))
    }
}

impl From<Vec<Resource>> for Collection {
    fn from(resources: Vec<Resource>) -> Self {
        Self {
            resources,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryId;

    #[test]
    fn test_empty_sequences_are_omitted() {
        let kind = CategoryId::parse("http://schemas.ogf.org/occi/infrastructure#storage").unwrap();
        let c = Collection::from(vec![Resource::new(kind).with_id("1")]);
        let json = serde_json::to_value(&c).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["resources".to_string()]);
        assert_eq!(c.entity_count(), 1);
    }

    #[test]
    fn test_empty_collection_serializes_to_empty_object() {
        let c = Collection::new();
        assert!(c.is_empty());
        assert_eq!(serde_json::to_string(&c).unwrap(), "{}");
    }
}
