//! Entity validation against the registry

use crate::category::{AttributeSchema, CategoryId, EntityType, Kind};
use crate::entity::{Entity, Link, Resource, attr};
use crate::error::{CoreError, Result};
use crate::registry::Registry;

/// Validate a resource submitted for creation
///
/// Coerces attribute values to their declared types, fills defaults and
/// puts the resource in its kind's initial state.
pub fn validate_new_resource(registry: &Registry, resource: &mut Resource) -> Result<()> {
    let kind = check_new(registry, resource, EntityType::Resource)?;
    resource.state = kind.state_machine.as_ref().map(|m| m.initial.clone());
    resource.actions = kind
        .state_machine
        .as_ref()
        .map(|m| m.actions_from(&m.initial))
        .unwrap_or_default();
    Ok(())
}

/// Validate a link submitted for creation
pub fn validate_new_link(registry: &Registry, link: &mut Link) -> Result<()> {
    check_new(registry, link, EntityType::Link)?;
    Ok(())
}

/// Merge `changes` into `stored` and validate the result
///
/// Mixins in `changes` are added, attributes overwrite stored ones.
/// Immutable attributes may only be restated with their stored value.
pub fn apply_update(registry: &Registry, stored: &Resource, changes: &Resource) -> Result<Resource> {
    if changes.kind != stored.kind {
        return Err(CoreError::KindMismatch {
            expected: stored.kind.to_string(),
            found: changes.kind.to_string(),
        });
    }

    let mut merged = stored.clone();
    for mixin in &changes.mixins {
        merged.add_mixin(mixin.clone());
    }
    let kind = registry.kind(&merged.kind)?;
    check_mixins(registry, kind, &merged.mixins)?;
    let schema = registry.attribute_schema(&merged.kind, &merged.mixins)?;

    for (name, value) in &changes.attributes {
        if name == attr::ID {
            continue;
        }
        let def = schema
            .get(name)
            .ok_or_else(|| CoreError::AttributeNotDeclared {
                name: name.clone(),
                kind: merged.kind.to_string(),
            })?;
        let value = value
            .coerce(def.attr_type)
            .ok_or_else(|| CoreError::AttributeTypeMismatch {
                name: name.clone(),
                expected: def.attr_type,
            })?;
        if !def.mutable && stored.attributes.get(name) != Some(&value) {
            return Err(CoreError::AttributeImmutable(name.clone()));
        }
        merged.attributes.insert(name.clone(), value);
    }

    check_mandatory(&schema, &merged)?;
    Ok(merged)
}

fn check_new<'r, E: Entity>(
    registry: &'r Registry,
    entity: &mut E,
    expected: EntityType,
) -> Result<&'r Kind> {
    let kind = registry.kind(entity.kind())?;
    if kind.entity_type != expected {
        return Err(CoreError::KindMismatch {
            expected: expected.as_str().to_string(),
            found: kind.id.to_string(),
        });
    }

    check_mixins(registry, kind, entity.mixins())?;
    let schema = registry.attribute_schema(&kind.id, entity.mixins())?;

    if let Some(id) = entity.attributes_mut().remove(attr::ID)
        && entity.id().is_empty()
    {
        entity.set_id(id.to_string());
    }

    let kind_id = kind.id.to_string();
    for (name, value) in entity.attributes_mut().iter_mut() {
        let def = schema
            .get(name)
            .ok_or_else(|| CoreError::AttributeNotDeclared {
                name: name.clone(),
                kind: kind_id.clone(),
            })?;
        *value = value
            .coerce(def.attr_type)
            .ok_or_else(|| CoreError::AttributeTypeMismatch {
                name: name.clone(),
                expected: def.attr_type,
            })?;
    }

    for (name, def) in &schema {
        if let Some(default) = &def.default
            && !entity.attributes().contains_key(name)
        {
            entity.attributes_mut().insert(name.clone(), default.clone());
        }
    }

    check_mandatory(&schema, entity)?;
    Ok(kind)
}

fn check_mandatory<E: Entity>(schema: &AttributeSchema, entity: &E) -> Result<()> {
    for (name, def) in schema {
        if def.mandatory && def.mutable && name != attr::ID && entity.attribute(name).is_none() {
            return Err(CoreError::MandatoryAttributeMissing(name.clone()));
        }
    }
    Ok(())
}

fn check_mixins(registry: &Registry, kind: &Kind, mixins: &[CategoryId]) -> Result<()> {
    for mixin_id in mixins {
        let mixin = registry.mixin(mixin_id)?;

        let mut applies: Vec<&CategoryId> = mixin.applies.iter().collect();
        for ancestor in registry.ancestors(mixin_id) {
            if let Ok(parent) = registry.mixin(&ancestor) {
                applies.extend(parent.applies.iter());
            }
        }
        if !applies.is_empty() && !applies.iter().any(|a| registry.is_related_to(&kind.id, a)) {
            return Err(CoreError::MixinNotApplicable {
                mixin: mixin_id.to_string(),
                kind: kind.id.to_string(),
            });
        }

        for depends in &mixin.depends {
            if !mixins.iter().any(|m| registry.is_related_to(m, depends)) {
                return Err(CoreError::MixinDependencyMissing {
                    mixin: mixin_id.to_string(),
                    depends: depends.to_string(),
                });
            }
        }
    }
    Ok(())
}
