//! Category model: kinds, mixins, actions and their attribute definitions

use crate::error::{CoreError, Result};
use crate::state::StateMachine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Globally unique category identifier (`scheme` + `term`)
///
/// The scheme always ends with `#`, the term never contains one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CategoryId {
    scheme: String,
    term: String,
}

impl CategoryId {
    pub fn new(scheme: impl Into<String>, term: impl Into<String>) -> Result<Self> {
        let scheme = scheme.into();
        let term = term.into();
        if !scheme.ends_with('#') || scheme.len() < 2 {
            return Err(CoreError::InvalidIdentifier(format!(
                "scheme '{}' must end with '#'",
                scheme
            )));
        }
        if term.is_empty() || term.contains('#') || term.contains(char::is_whitespace) {
            return Err(CoreError::InvalidIdentifier(format!(
                "invalid term '{}'",
                term
            )));
        }
        Ok(Self { scheme, term })
    }

    /// Identifier built from parts known to be well formed
    pub(crate) fn known(scheme: &str, term: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            term: term.to_string(),
        }
    }

    /// Parse a full identifier, splitting at the last `#`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.rfind('#') {
            Some(idx) => Self::new(&s[..=idx], &s[idx + 1..]),
            None => Err(CoreError::InvalidIdentifier(s.to_string())),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn term(&self) -> &str {
        &self.term
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.scheme, self.term)
    }
}

impl FromStr for CategoryId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CategoryId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CategoryId> for String {
    fn from(id: CategoryId) -> Self {
        id.to_string()
    }
}

/// Value type of an attribute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
}

impl AttributeType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "string" => Some(Self::String),
            "integer" | "int" => Some(Self::Integer),
            "float" | "number" => Some(Self::Float),
            "boolean" | "bool" => Some(Self::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    pub fn value_type(&self) -> AttributeType {
        match self {
            Self::Boolean(_) => AttributeType::Boolean,
            Self::Integer(_) => AttributeType::Integer,
            Self::Float(_) => AttributeType::Float,
            Self::String(_) => AttributeType::String,
        }
    }

    /// Convert the value to `ty`
    ///
    /// Text is parsed into the target type and integers widen to floats.
    /// Returns `None` when no lossless conversion exists.
    pub fn coerce(&self, ty: AttributeType) -> Option<AttributeValue> {
        match (self, ty) {
            (v, t) if v.value_type() == t => Some(v.clone()),
            (Self::Integer(i), AttributeType::Float) => Some(Self::Float(*i as f64)),
            (Self::String(s), AttributeType::Integer) => s.trim().parse().ok().map(Self::Integer),
            (Self::String(s), AttributeType::Float) => s.trim().parse().ok().map(Self::Float),
            (Self::String(s), AttributeType::Boolean) => match s.trim() {
                "true" => Some(Self::Boolean(true)),
                "false" => Some(Self::Boolean(false)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

fn is_true(b: &bool) -> bool {
    *b
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn default_true() -> bool {
    true
}

/// Attribute definition attached to a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    #[serde(rename = "type", default)]
    pub attr_type: AttributeType,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub mutable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub mandatory: bool,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AttributeDef {
    pub fn new(attr_type: AttributeType) -> Self {
        Self {
            attr_type,
            mutable: true,
            mandatory: false,
            unique: true,
            default: None,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::new(AttributeType::String)
    }

    pub fn integer() -> Self {
        Self::new(AttributeType::Integer)
    }

    pub fn float() -> Self {
        Self::new(AttributeType::Float)
    }

    pub fn boolean() -> Self {
        Self::new(AttributeType::Boolean)
    }

    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<AttributeValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Attribute name to definition
pub type AttributeSchema = BTreeMap<String, AttributeDef>;

/// Whether instances of a kind are resources or links
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    #[default]
    Resource,
    Link,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Link => "link",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "resource" => Some(Self::Resource),
            "link" => Some(Self::Link),
            _ => None,
        }
    }
}

/// Discriminates the three category flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryClass {
    Kind,
    Mixin,
    Action,
}

impl CategoryClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kind => "kind",
            Self::Mixin => "mixin",
            Self::Action => "action",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kind" => Some(Self::Kind),
            "mixin" => Some(Self::Mixin),
            "action" => Some(Self::Action),
            _ => None,
        }
    }
}

/// Type of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kind {
    pub id: CategoryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: AttributeSchema,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_machine: Option<StateMachine>,
}

impl Kind {
    pub fn new(id: CategoryId) -> Self {
        Self {
            id,
            title: None,
            attributes: AttributeSchema::new(),
            related: Vec::new(),
            location: None,
            entity_type: EntityType::Resource,
            actions: Vec::new(),
            state_machine: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_related(mut self, related: CategoryId) -> Self {
        self.related.push(related);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, def: AttributeDef) -> Self {
        self.attributes.insert(name.into(), def);
        self
    }

    pub fn with_action(mut self, action: CategoryId) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = entity_type;
        self
    }

    pub fn with_state_machine(mut self, machine: StateMachine) -> Self {
        self.state_machine = Some(machine);
        self
    }
}

/// Capability that can be attached to an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mixin {
    pub id: CategoryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: AttributeSchema,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<CategoryId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applies: Vec<CategoryId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<CategoryId>,
}

impl Mixin {
    pub fn new(id: CategoryId) -> Self {
        Self {
            id,
            title: None,
            attributes: AttributeSchema::new(),
            related: Vec::new(),
            location: None,
            depends: Vec::new(),
            applies: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_related(mut self, related: CategoryId) -> Self {
        self.related.push(related);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, def: AttributeDef) -> Self {
        self.attributes.insert(name.into(), def);
        self
    }

    pub fn with_depends(mut self, depends: CategoryId) -> Self {
        self.depends.push(depends);
        self
    }

    pub fn with_applies(mut self, kind: CategoryId) -> Self {
        self.applies.push(kind);
        self
    }
}

/// Operation that can be invoked on an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: CategoryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: AttributeSchema,
}

impl Action {
    pub fn new(id: CategoryId) -> Self {
        Self {
            id,
            title: None,
            attributes: AttributeSchema::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, def: AttributeDef) -> Self {
        self.attributes.insert(name.into(), def);
        self
    }
}

/// Any registered category
#[derive(Debug, Clone, PartialEq)]
pub enum Category {
    Kind(Kind),
    Mixin(Mixin),
    Action(Action),
}

impl Category {
    pub fn id(&self) -> &CategoryId {
        match self {
            Self::Kind(k) => &k.id,
            Self::Mixin(m) => &m.id,
            Self::Action(a) => &a.id,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Kind(k) => k.title.as_deref(),
            Self::Mixin(m) => m.title.as_deref(),
            Self::Action(a) => a.title.as_deref(),
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Kind(k) => k.location.as_deref(),
            Self::Mixin(m) => m.location.as_deref(),
            Self::Action(_) => None,
        }
    }

    pub fn related(&self) -> &[CategoryId] {
        match self {
            Self::Kind(k) => &k.related,
            Self::Mixin(m) => &m.related,
            Self::Action(_) => &[],
        }
    }

    pub fn attributes(&self) -> &AttributeSchema {
        match self {
            Self::Kind(k) => &k.attributes,
            Self::Mixin(m) => &m.attributes,
            Self::Action(a) => &a.attributes,
        }
    }

    pub fn class(&self) -> CategoryClass {
        match self {
            Self::Kind(_) => CategoryClass::Kind,
            Self::Mixin(_) => CategoryClass::Mixin,
            Self::Action(_) => CategoryClass::Action,
        }
    }
}

impl From<Kind> for Category {
    fn from(kind: Kind) -> Self {
        Self::Kind(kind)
    }
}

impl From<Mixin> for Category {
    fn from(mixin: Mixin) -> Self {
        Self::Mixin(mixin)
    }
}

impl From<Action> for Category {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_id_parse() {
        let id = CategoryId::parse("http://schemas.ogf.org/occi/infrastructure#compute").unwrap();
        assert_eq!(id.scheme(), "http://schemas.ogf.org/occi/infrastructure#");
        assert_eq!(id.term(), "compute");
        assert_eq!(
            id.to_string(),
            "http://schemas.ogf.org/occi/infrastructure#compute"
        );
    }

    #[test]
    fn test_category_id_rejects_missing_hash() {
        assert!(CategoryId::parse("http://example.org/compute").is_err());
        assert!(CategoryId::parse("http://example.org/x#").is_err());
        assert!(CategoryId::new("http://example.org/", "x").is_err());
    }

    #[test]
    fn test_category_id_serde() {
        let id = CategoryId::parse("http://example.org/occi#thing").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"http://example.org/occi#thing\"");
        let back: CategoryId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<CategoryId>("\"nohash\"").is_err());
    }

    #[test]
    fn test_attribute_value_coerce() {
        let v = AttributeValue::from("4");
        assert_eq!(
            v.coerce(AttributeType::Integer),
            Some(AttributeValue::Integer(4))
        );
        assert_eq!(
            v.coerce(AttributeType::Float),
            Some(AttributeValue::Float(4.0))
        );
        assert_eq!(v.coerce(AttributeType::Boolean), None);
        assert_eq!(
            AttributeValue::Integer(2).coerce(AttributeType::Float),
            Some(AttributeValue::Float(2.0))
        );
        assert_eq!(AttributeValue::Float(2.5).coerce(AttributeType::Integer), None);
        assert_eq!(
            AttributeValue::from("true").coerce(AttributeType::Boolean),
            Some(AttributeValue::Boolean(true))
        );
    }

    #[test]
    fn test_attribute_value_json_types() {
        let values: Vec<AttributeValue> = serde_json::from_str(r#"[true, 3, 1.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                AttributeValue::Boolean(true),
                AttributeValue::Integer(3),
                AttributeValue::Float(1.5),
                AttributeValue::String("x".into()),
            ]
        );
    }

    #[test]
    fn test_attribute_def_defaults_on_deserialize() {
        let def: AttributeDef = serde_json::from_str(r#"{"type": "integer"}"#).unwrap();
        assert_eq!(def, AttributeDef::integer());
        assert!(def.mutable);
        assert!(!def.mandatory);
    }
}
