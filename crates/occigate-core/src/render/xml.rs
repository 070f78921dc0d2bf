//! `application/occi+xml` and `application/xml`
//!
//! Documents are built as a small element tree and written with quick-xml.
//! Attribute values carry a `type` so that parsing restores typed values.

use super::RequestBody;
use crate::category::{
    Action, AttributeDef, AttributeSchema, AttributeType, AttributeValue, CategoryId, EntityType,
    Kind, Mixin,
};
use crate::collection::Collection;
use crate::entity::{ActionInstance, Attributes, Link, Resource};
use crate::error::{CoreError, Result};
use crate::state::{StateMachine, Transition};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attrs.push((key.to_string(), value.into()));
        self
    }

    fn opt_attr(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.attr(key, v),
            None => self,
        }
    }

    fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            CoreError::Parse(format!("<{}> requires the '{}' attribute", self.name, key))
        })
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(CoreError::Parse(format!(
                "'{}' is not a boolean for '{}'",
                other, key
            ))),
        }
    }

    fn id(&self, key: &str) -> Result<CategoryId> {
        CategoryId::parse(self.require(key)?).map_err(|e| CoreError::Parse(e.to_string()))
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn render_err(e: impl std::fmt::Display) -> CoreError {
    CoreError::Render(e.to_string())
}

fn parse_err(e: impl std::fmt::Display) -> CoreError {
    CoreError::Parse(e.to_string())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() && element.text.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(render_err)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(render_err)?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(render_err)?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(render_err)?;
    Ok(())
}

fn to_document(root: &Element) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(render_err)?;
    write_element(&mut writer, root)?;
    String::from_utf8(writer.into_inner()).map_err(render_err)
}

fn element_from(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(&String::from_utf8_lossy(start.name().as_ref()));
    for attribute in start.attributes() {
        let attribute = attribute.map_err(parse_err)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(parse_err)?.into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(CoreError::Parse("more than one root element".to_string())),
    }
    Ok(())
}

fn from_document(input: &str) -> Result<Element> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().map_err(parse_err)? {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape().map_err(parse_err)?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| CoreError::Parse("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(CoreError::Parse("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| CoreError::Parse("empty XML document".to_string()))
}

// rendering

fn value_element(tag: &str, name: Option<&str>, value: &AttributeValue) -> Element {
    Element::new(tag)
        .opt_attr("name", name)
        .attr("type", value.value_type().as_str())
        .text(value.to_string())
}

fn id_element(tag: &str, id: &CategoryId) -> Element {
    Element::new(tag).attr("id", id.to_string())
}

fn attribute_defs(mut element: Element, schema: &AttributeSchema) -> Element {
    for (name, def) in schema {
        let mut attr = Element::new("attribute")
            .attr("name", name.as_str())
            .attr("type", def.attr_type.as_str())
            .attr("mutable", def.mutable.to_string())
            .attr("mandatory", def.mandatory.to_string())
            .attr("unique", def.unique.to_string())
            .opt_attr("description", def.description.as_deref());
        if let Some(default) = &def.default {
            attr = attr.child(value_element("default", None, default));
        }
        element = element.child(attr);
    }
    element
}

fn attribute_values(mut element: Element, attributes: &Attributes) -> Element {
    for (name, value) in attributes {
        element = element.child(value_element("attribute", Some(name), value));
    }
    element
}

fn kind_element(kind: &Kind) -> Element {
    let mut element = Element::new("kind")
        .attr("id", kind.id.to_string())
        .opt_attr("title", kind.title.as_deref())
        .opt_attr("location", kind.location.as_deref())
        .attr("entity-type", kind.entity_type.as_str());
    for related in &kind.related {
        element = element.child(id_element("related", related));
    }
    element = attribute_defs(element, &kind.attributes);
    for action in &kind.actions {
        element = element.child(id_element("action", action));
    }
    if let Some(machine) = &kind.state_machine {
        let mut sm = Element::new("state-machine").attr("initial", machine.initial.as_str());
        for state in &machine.states {
            sm = sm.child(Element::new("state").attr("name", state.as_str()));
        }
        for t in &machine.transitions {
            sm = sm.child(
                Element::new("transition")
                    .attr("from", t.from.as_str())
                    .attr("action", t.action.to_string())
                    .attr("to", t.to.as_str()),
            );
        }
        element = element.child(sm);
    }
    element
}

fn mixin_element(mixin: &Mixin) -> Element {
    let mut element = Element::new("mixin")
        .attr("id", mixin.id.to_string())
        .opt_attr("title", mixin.title.as_deref())
        .opt_attr("location", mixin.location.as_deref());
    for related in &mixin.related {
        element = element.child(id_element("related", related));
    }
    for depends in &mixin.depends {
        element = element.child(id_element("depends", depends));
    }
    for applies in &mixin.applies {
        element = element.child(id_element("applies", applies));
    }
    element = attribute_defs(element, &mixin.attributes);
    for action in &mixin.actions {
        element = element.child(id_element("action", action));
    }
    element
}

fn action_element(action: &Action) -> Element {
    let element = Element::new("action")
        .attr("id", action.id.to_string())
        .opt_attr("title", action.title.as_deref());
    attribute_defs(element, &action.attributes)
}

fn resource_element(resource: &Resource) -> Element {
    let mut element = Element::new("resource")
        .attr("id", resource.id.as_str())
        .attr("kind", resource.kind.to_string())
        .opt_attr("state", resource.state.as_deref());
    for mixin in &resource.mixins {
        element = element.child(id_element("mixin", mixin));
    }
    element = attribute_values(element, &resource.attributes);
    for action in &resource.actions {
        element = element.child(id_element("action", action));
    }
    for link in &resource.links {
        element = element.child(Element::new("link").attr("id", link.as_str()));
    }
    element
}

fn link_element(link: &Link) -> Element {
    let mut element = Element::new("link")
        .attr("id", link.id.as_str())
        .attr("kind", link.kind.to_string())
        .attr("source", link.source.as_str())
        .attr("target", link.target.as_str());
    for mixin in &link.mixins {
        element = element.child(id_element("mixin", mixin));
    }
    attribute_values(element, &link.attributes)
}

pub(super) fn render(collection: &Collection) -> Result<String> {
    let mut root = Element::new("collection");
    root.children.extend(collection.kinds.iter().map(kind_element));
    root.children.extend(collection.mixins.iter().map(mixin_element));
    root.children.extend(collection.actions.iter().map(action_element));
    root.children.extend(collection.resources.iter().map(resource_element));
    root.children.extend(collection.links.iter().map(link_element));
    to_document(&root)
}

pub(super) fn render_locations(uris: &[String]) -> Result<String> {
    let mut root = Element::new("locations");
    for uri in uris {
        root = root.child(Element::new("location").text(uri.as_str()));
    }
    to_document(&root)
}

// parsing

fn parse_value(element: &Element) -> Result<AttributeValue> {
    let ty = match element.get("type") {
        Some(t) => AttributeType::parse(t)
            .ok_or_else(|| CoreError::Parse(format!("unknown attribute type '{}'", t)))?,
        None => AttributeType::String,
    };
    AttributeValue::String(element.text.clone())
        .coerce(ty)
        .ok_or_else(|| {
            CoreError::Parse(format!(
                "'{}' is not a valid {} value",
                element.text, ty
            ))
        })
}

fn parse_attribute_values(element: &Element) -> Result<Attributes> {
    let mut attributes = Attributes::new();
    for attr in element.children_named("attribute") {
        attributes.insert(attr.require("name")?.to_string(), parse_value(attr)?);
    }
    Ok(attributes)
}

fn parse_attribute_defs(element: &Element) -> Result<AttributeSchema> {
    let mut schema = AttributeSchema::new();
    for attr in element.children_named("attribute") {
        let ty = AttributeType::parse(attr.require("type")?)
            .ok_or_else(|| CoreError::Parse("unknown attribute type".to_string()))?;
        let mut def = AttributeDef::new(ty);
        def.mutable = attr.flag("mutable", true)?;
        def.mandatory = attr.flag("mandatory", false)?;
        def.unique = attr.flag("unique", true)?;
        def.description = attr.get("description").map(|s| s.to_string());
        if let Some(default) = attr.children_named("default").next() {
            def.default = Some(parse_value(default)?);
        }
        schema.insert(attr.require("name")?.to_string(), def);
    }
    Ok(schema)
}

fn parse_ids(element: &Element, tag: &str) -> Result<Vec<CategoryId>> {
    element.children_named(tag).map(|c| c.id("id")).collect()
}

fn parse_kind(element: &Element) -> Result<Kind> {
    let mut kind = Kind::new(element.id("id")?);
    kind.title = element.get("title").map(|s| s.to_string());
    kind.location = element.get("location").map(|s| s.to_string());
    if let Some(raw) = element.get("entity-type") {
        kind.entity_type = EntityType::parse(raw)
            .ok_or_else(|| CoreError::Parse(format!("unknown entity type '{}'", raw)))?;
    }
    kind.related = parse_ids(element, "related")?;
    kind.attributes = parse_attribute_defs(element)?;
    kind.actions = parse_ids(element, "action")?;
    if let Some(sm) = element.children_named("state-machine").next() {
        let mut machine = StateMachine::new(sm.require("initial")?);
        machine.states = sm
            .children_named("state")
            .map(|s| s.require("name").map(|n| n.to_string()))
            .collect::<Result<_>>()?;
        for t in sm.children_named("transition") {
            machine.transitions.push(Transition {
                from: t.require("from")?.to_string(),
                action: t.id("action")?,
                to: t.require("to")?.to_string(),
            });
        }
        kind.state_machine = Some(machine);
    }
    Ok(kind)
}

fn parse_mixin(element: &Element) -> Result<Mixin> {
    let mut mixin = Mixin::new(element.id("id")?);
    mixin.title = element.get("title").map(|s| s.to_string());
    mixin.location = element.get("location").map(|s| s.to_string());
    mixin.related = parse_ids(element, "related")?;
    mixin.depends = parse_ids(element, "depends")?;
    mixin.applies = parse_ids(element, "applies")?;
    mixin.attributes = parse_attribute_defs(element)?;
    mixin.actions = parse_ids(element, "action")?;
    Ok(mixin)
}

fn parse_action(element: &Element) -> Result<Action> {
    let mut action = Action::new(element.id("id")?);
    action.title = element.get("title").map(|s| s.to_string());
    action.attributes = parse_attribute_defs(element)?;
    Ok(action)
}

fn parse_resource(element: &Element) -> Result<Resource> {
    let mut resource = Resource::new(element.id("kind")?);
    resource.id = element.get("id").unwrap_or_default().to_string();
    resource.state = element.get("state").map(|s| s.to_string());
    resource.mixins = parse_ids(element, "mixin")?;
    resource.attributes = parse_attribute_values(element)?;
    resource.actions = parse_ids(element, "action")?;
    resource.links = element
        .children_named("link")
        .map(|l| l.require("id").map(|id| id.to_string()))
        .collect::<Result<_>>()?;
    Ok(resource)
}

fn parse_link(element: &Element) -> Result<Link> {
    let mut link = Link::new(
        element.id("kind")?,
        element.require("source")?,
        element.require("target")?,
    );
    link.id = element.get("id").unwrap_or_default().to_string();
    link.mixins = parse_ids(element, "mixin")?;
    link.attributes = parse_attribute_values(element)?;
    Ok(link)
}

fn parse_action_instance(element: &Element) -> Result<ActionInstance> {
    Ok(ActionInstance {
        action: element.id("action")?,
        attributes: parse_attribute_values(element)?,
    })
}

fn parse_locations(element: &Element) -> Vec<String> {
    element
        .children_named("location")
        .map(|l| l.text.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

pub(super) fn parse(body: &str) -> Result<RequestBody> {
    let root = from_document(body)?;
    let mut request = RequestBody::default();

    match root.name.as_str() {
        "collection" => {
            for child in &root.children {
                match child.name.as_str() {
                    "kind" => request.collection.kinds.push(parse_kind(child)?),
                    "mixin" => request.collection.mixins.push(parse_mixin(child)?),
                    "action" => request.collection.actions.push(parse_action(child)?),
                    "resource" => request.collection.resources.push(parse_resource(child)?),
                    "link" => request.collection.links.push(parse_link(child)?),
                    "action-instance" => request.action = Some(parse_action_instance(child)?),
                    "locations" => request.locations.extend(parse_locations(child)),
                    other => {
                        return Err(CoreError::Parse(format!("unexpected element <{}>", other)));
                    }
                }
            }
        }
        "action-instance" => request.action = Some(parse_action_instance(&root)?),
        "locations" => request.locations = parse_locations(&root),
        other => {
            return Err(CoreError::Parse(format!(
                "unexpected root element <{}>",
                other
            )));
        }
    }

    Ok(request)
}
