//! Category registry
//!
//! Holds every known kind, mixin and action. Categories registered before
//! [`Registry::seal`] form the startup schema and survive [`Registry::reset`].

use crate::category::{Action, AttributeSchema, Category, CategoryId, Kind, Mixin};
use crate::collection::Collection;
use crate::error::{CoreError, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    categories: BTreeMap<CategoryId, Category>,
    sealed: BTreeSet<CategoryId>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the core and infrastructure schema
    pub fn with_builtin() -> Result<Self> {
        let mut registry = Self::new();
        for category in crate::schema::builtin() {
            registry.register(category)?;
        }
        Ok(registry)
    }

    /// Add a category
    ///
    /// Re-registering an identical definition is a no-op.
    pub fn register(&mut self, category: impl Into<Category>) -> Result<()> {
        let category = category.into();
        let id = category.id().clone();

        if let Some(existing) = self.categories.get(&id) {
            if existing == &category {
                return Ok(());
            }
            return Err(CoreError::DuplicateCategory(id.to_string()));
        }

        if let Some(location) = category.location() {
            if !location.starts_with('/') || !location.ends_with('/') {
                return Err(CoreError::InvalidSchema(format!(
                    "location '{}' of {} must start and end with '/'",
                    location, id
                )));
            }
            if let Some(owner) = self
                .categories
                .values()
                .find(|c| c.location() == Some(location))
            {
                return Err(CoreError::LocationInUse {
                    location: location.to_string(),
                    owner: owner.id().to_string(),
                });
            }
        }

        if let Category::Kind(kind) = &category
            && let Some(machine) = &kind.state_machine
        {
            machine.validate(&id)?;
            if let Some(t) = machine
                .transitions
                .iter()
                .find(|t| !kind.actions.contains(&t.action))
            {
                return Err(CoreError::InvalidStateMachine {
                    kind: id.to_string(),
                    message: format!("action {} is not declared by the kind", t.action),
                });
            }
        }

        debug!("Registering {} {}", category.class().as_str(), id);
        self.categories.insert(id, category);
        Ok(())
    }

    /// Remove a category registered after startup
    pub fn unregister(&mut self, id: &CategoryId) -> Result<Category> {
        if self.sealed.contains(id) {
            return Err(CoreError::ProtectedCategory(id.to_string()));
        }
        let removed = self
            .categories
            .remove(id)
            .ok_or_else(|| CoreError::CategoryNotFound(id.to_string()))?;
        debug!("Unregistered {}", id);
        Ok(removed)
    }

    /// Mark every current category as part of the startup schema
    pub fn seal(&mut self) {
        self.sealed = self.categories.keys().cloned().collect();
    }

    pub fn is_sealed(&self, id: &CategoryId) -> bool {
        self.sealed.contains(id)
    }

    /// Drop everything registered after [`seal`](Self::seal)
    pub fn reset(&mut self) {
        let sealed = &self.sealed;
        self.categories.retain(|id, _| sealed.contains(id));
    }

    /// Categories matching `filter`, or all of them when no filter is given
    ///
    /// Unknown identifiers are skipped.
    pub fn get(&self, filter: Option<&[CategoryId]>) -> Collection {
        let mut collection = Collection::new();
        match filter {
            None => {
                for category in self.categories.values() {
                    collection.push_category(category.clone());
                }
            }
            Some(ids) => {
                for id in ids {
                    if let Some(category) = self.categories.get(id) {
                        collection.push_category(category.clone());
                    }
                }
            }
        }
        collection
    }

    pub fn get_by_id(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.get(id)
    }

    /// Look up a category from its textual identifier
    pub fn find(&self, id: &str) -> Option<&Category> {
        CategoryId::parse(id)
            .ok()
            .and_then(|id| self.categories.get(&id))
    }

    /// The kind or mixin whose location is the longest prefix of `path`
    pub fn get_by_location(&self, path: &str) -> Option<&Category> {
        let with_slash = format!("{}/", path.trim_end_matches('/'));
        self.categories
            .values()
            .filter_map(|c| c.location().map(|loc| (loc, c)))
            .filter(|(loc, _)| path.starts_with(loc) || with_slash == *loc)
            .max_by_key(|(loc, _)| loc.len())
            .map(|(_, c)| c)
    }

    pub fn contains(&self, id: &CategoryId) -> bool {
        self.categories.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn kind(&self, id: &CategoryId) -> Result<&Kind> {
        match self.categories.get(id) {
            Some(Category::Kind(k)) => Ok(k),
            _ => Err(CoreError::CategoryNotFound(id.to_string())),
        }
    }

    pub fn mixin(&self, id: &CategoryId) -> Result<&Mixin> {
        match self.categories.get(id) {
            Some(Category::Mixin(m)) => Ok(m),
            _ => Err(CoreError::CategoryNotFound(id.to_string())),
        }
    }

    pub fn action(&self, id: &CategoryId) -> Result<&Action> {
        match self.categories.get(id) {
            Some(Category::Action(a)) => Ok(a),
            _ => Err(CoreError::CategoryNotFound(id.to_string())),
        }
    }

    pub fn kinds(&self) -> impl Iterator<Item = &Kind> {
        self.categories.values().filter_map(|c| match c {
            Category::Kind(k) => Some(k),
            _ => None,
        })
    }

    pub fn mixins(&self) -> impl Iterator<Item = &Mixin> {
        self.categories.values().filter_map(|c| match c {
            Category::Mixin(m) => Some(m),
            _ => None,
        })
    }

    /// Every category reachable through `related`, nearest first
    pub fn ancestors(&self, id: &CategoryId) -> Vec<CategoryId> {
        let mut seen: Vec<CategoryId> = Vec::new();
        let mut queue: VecDeque<&CategoryId> = VecDeque::new();
        if let Some(category) = self.categories.get(id) {
            queue.extend(category.related());
        }
        while let Some(next) = queue.pop_front() {
            if next == id || seen.contains(next) {
                continue;
            }
            seen.push(next.clone());
            if let Some(category) = self.categories.get(next) {
                queue.extend(category.related());
            }
        }
        seen
    }

    /// Whether `id` is `ancestor` or transitively related to it
    pub fn is_related_to(&self, id: &CategoryId, ancestor: &CategoryId) -> bool {
        id == ancestor || self.ancestors(id).contains(ancestor)
    }

    /// Mixins that are (transitively) related to `id`
    pub fn mixins_related_to(&self, id: &CategoryId) -> Vec<&Mixin> {
        self.mixins()
            .filter(|m| &m.id != id && self.is_related_to(&m.id, id))
            .collect()
    }

    /// Merged attribute definitions of a kind, its ancestors and `mixins`
    ///
    /// Definitions closer to the entity override inherited ones.
    pub fn attribute_schema(&self, kind: &CategoryId, mixins: &[CategoryId]) -> Result<AttributeSchema> {
        let kind = self.kind(kind)?;
        let mut schema = AttributeSchema::new();

        let mut chain = self.ancestors(&kind.id);
        chain.reverse();
        for ancestor in &chain {
            if let Some(category) = self.categories.get(ancestor) {
                schema.extend(category.attributes().clone());
            }
        }
        schema.extend(kind.attributes.clone());

        for mixin_id in mixins {
            let mixin = self.mixin(mixin_id)?;
            let mut chain = self.ancestors(&mixin.id);
            chain.reverse();
            for ancestor in &chain {
                if let Some(category) = self.categories.get(ancestor) {
                    schema.extend(category.attributes().clone());
                }
            }
            schema.extend(mixin.attributes.clone());
        }

        Ok(schema)
    }
}
