//! Extension schema loader
//!
//! Extension files are KDL documents made of `kind`, `mixin` and `action`
//! nodes:
//!
//! ```kdl
//! action "boot" scheme="http://example.org/occi/vm/action#" {
//!     title "Boot the machine"
//!     attribute "mode" type="string"
//! }
//!
//! kind "vm" scheme="http://example.org/occi#" {
//!     title "Virtual machine"
//!     location "/vm/"
//!     related "http://schemas.ogf.org/occi/core#resource"
//!     attribute "org.example.vm.flavor" type="string" mandatory=#true default="small"
//!     action "http://example.org/occi/vm/action#boot"
//!     state-machine initial="off" {
//!         state "off"
//!         state "on"
//!         transition from="off" action="http://example.org/occi/vm/action#boot" to="on"
//!     }
//! }
//!
//! mixin "gold" scheme="http://example.org/occi/tier#" {
//!     location "/tier/gold/"
//!     applies "http://example.org/occi#vm"
//! }
//! ```

use crate::category::{
    Action, AttributeDef, AttributeType, AttributeValue, Category, CategoryId, EntityType, Kind,
    Mixin,
};
use crate::error::{CoreError, Result};
use crate::state::{StateMachine, Transition};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Parse one extension schema document
pub fn parse_schema(content: &str) -> Result<Vec<Category>> {
    let doc: KdlDocument = content.parse()?;
    let mut categories = Vec::new();

    for node in doc.nodes() {
        let category = match node.name().value() {
            "kind" => Category::Kind(parse_kind(node)?),
            "mixin" => Category::Mixin(parse_mixin(node)?),
            "action" => Category::Action(parse_action(node)?),
            other => {
                return Err(CoreError::InvalidSchema(format!(
                    "unexpected node '{}'",
                    other
                )));
            }
        };
        categories.push(category);
    }

    Ok(categories)
}

/// Load a schema file, or every `*.kdl` file of a directory in name order
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_extensions(path: &Path) -> Result<Vec<Category>> {
    let mut files = Vec::new();
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let file = entry?.path();
            if file.extension().and_then(|e| e.to_str()) == Some("kdl") {
                files.push(file);
            }
        }
        files.sort();
    } else {
        files.push(path.to_path_buf());
    }

    let mut categories = Vec::new();
    for file in &files {
        debug!("Loading schema file {}", file.display());
        let content = std::fs::read_to_string(file)?;
        categories.extend(parse_schema(&content)?);
    }

    info!(
        files = files.len(),
        categories = categories.len(),
        "Extension schema loaded"
    );
    Ok(categories)
}

fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
}

fn required_string<'a>(node: &'a KdlNode, what: &str) -> Result<&'a str> {
    first_string(node).ok_or_else(|| {
        CoreError::InvalidSchema(format!(
            "'{}' node requires a {}",
            node.name().value(),
            what
        ))
    })
}

fn category_id(node: &KdlNode) -> Result<CategoryId> {
    let term = required_string(node, "term")?;
    let scheme = node
        .get("scheme")
        .and_then(|v| v.as_string())
        .ok_or_else(|| CoreError::InvalidSchema(format!("{} requires a scheme", term)))?;
    CategoryId::new(scheme, term)
}

fn reference(node: &KdlNode) -> Result<CategoryId> {
    CategoryId::parse(required_string(node, "category identifier")?)
}

fn kdl_value(value: &KdlValue) -> Option<AttributeValue> {
    if let Some(s) = value.as_string() {
        Some(AttributeValue::String(s.to_string()))
    } else if let Some(b) = value.as_bool() {
        Some(AttributeValue::Boolean(b))
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i).ok().map(AttributeValue::Integer)
    } else {
        value.as_float().map(AttributeValue::Float)
    }
}

fn parse_attribute(node: &KdlNode) -> Result<(String, AttributeDef)> {
    let name = required_string(node, "name")?.to_string();

    let attr_type = match node.get("type").and_then(|v| v.as_string()) {
        Some(t) => AttributeType::parse(t).ok_or_else(|| {
            CoreError::InvalidSchema(format!("attribute {} has unknown type '{}'", name, t))
        })?,
        None => AttributeType::String,
    };

    let mut def = AttributeDef::new(attr_type);
    if let Some(mutable) = node.get("mutable").and_then(|v| v.as_bool()) {
        def.mutable = mutable;
    }
    if let Some(mandatory) = node.get("mandatory").and_then(|v| v.as_bool()) {
        def.mandatory = mandatory;
    }
    if let Some(unique) = node.get("unique").and_then(|v| v.as_bool()) {
        def.unique = unique;
    }
    if let Some(raw) = node.get("default") {
        let value = kdl_value(raw)
            .and_then(|v| v.coerce(attr_type))
            .ok_or_else(|| CoreError::AttributeTypeMismatch {
                name: name.clone(),
                expected: attr_type,
            })?;
        def.default = Some(value);
    }
    if let Some(description) = node.get("description").and_then(|v| v.as_string()) {
        def.description = Some(description.to_string());
    }

    Ok((name, def))
}

fn parse_state_machine(node: &KdlNode) -> Result<StateMachine> {
    let initial = node
        .get("initial")
        .and_then(|v| v.as_string())
        .ok_or_else(|| CoreError::InvalidSchema("state-machine requires initial=".to_string()))?;

    let mut machine = StateMachine::new(initial);
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "state" => {
                    machine = machine.with_state(required_string(child, "state name")?);
                }
                "transition" => {
                    let prop = |key: &str| {
                        child.get(key).and_then(|v| v.as_string()).ok_or_else(|| {
                            CoreError::InvalidSchema(format!("transition requires {}=", key))
                        })
                    };
                    machine.transitions.push(Transition {
                        from: prop("from")?.to_string(),
                        action: CategoryId::parse(prop("action")?)?,
                        to: prop("to")?.to_string(),
                    });
                }
                other => {
                    return Err(CoreError::InvalidSchema(format!(
                        "unexpected node '{}' in state-machine",
                        other
                    )));
                }
            }
        }
    }
    Ok(machine)
}

fn parse_kind(node: &KdlNode) -> Result<Kind> {
    let mut kind = Kind::new(category_id(node)?);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "title" => kind.title = first_string(child).map(|s| s.to_string()),
                "location" => kind.location = first_string(child).map(|s| s.to_string()),
                "related" => kind.related.push(reference(child)?),
                "entity-type" => {
                    let raw = required_string(child, "entity type")?;
                    kind.entity_type = EntityType::parse(raw).ok_or_else(|| {
                        CoreError::InvalidSchema(format!("unknown entity type '{}'", raw))
                    })?;
                }
                "attribute" => {
                    let (name, def) = parse_attribute(child)?;
                    kind.attributes.insert(name, def);
                }
                "action" => kind.actions.push(reference(child)?),
                "state-machine" => kind.state_machine = Some(parse_state_machine(child)?),
                other => {
                    return Err(CoreError::InvalidSchema(format!(
                        "unexpected node '{}' in kind {}",
                        other, kind.id
                    )));
                }
            }
        }
    }

    Ok(kind)
}

fn parse_mixin(node: &KdlNode) -> Result<Mixin> {
    let mut mixin = Mixin::new(category_id(node)?);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "title" => mixin.title = first_string(child).map(|s| s.to_string()),
                "location" => mixin.location = first_string(child).map(|s| s.to_string()),
                "related" => mixin.related.push(reference(child)?),
                "depends" => mixin.depends.push(reference(child)?),
                "applies" => mixin.applies.push(reference(child)?),
                "attribute" => {
                    let (name, def) = parse_attribute(child)?;
                    mixin.attributes.insert(name, def);
                }
                "action" => mixin.actions.push(reference(child)?),
                other => {
                    return Err(CoreError::InvalidSchema(format!(
                        "unexpected node '{}' in mixin {}",
                        other, mixin.id
                    )));
                }
            }
        }
    }

    Ok(mixin)
}

fn parse_action(node: &KdlNode) -> Result<Action> {
    let mut action = Action::new(category_id(node)?);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "title" => action.title = first_string(child).map(|s| s.to_string()),
                "attribute" => {
                    let (name, def) = parse_attribute(child)?;
                    action.attributes.insert(name, def);
                }
                other => {
                    return Err(CoreError::InvalidSchema(format!(
                        "unexpected node '{}' in action {}",
                        other, action.id
                    )));
                }
            }
        }
    }

    Ok(action)
}
