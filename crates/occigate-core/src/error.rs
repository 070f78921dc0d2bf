//! Core error types

use crate::category::AttributeType;
use thiserror::Error;

/// Errors raised by the category registry, the entity model and the
/// renderers
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Category missing: {0}")]
    CategoryMissing(String),

    #[error("Category {0} is already registered with a different definition")]
    DuplicateCategory(String),

    #[error("Location {location} is already used by {owner}")]
    LocationInUse { location: String, owner: String },

    #[error("Category {0} belongs to the startup schema and cannot be removed")]
    ProtectedCategory(String),

    #[error("Invalid category identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid state machine for {kind}: {message}")]
    InvalidStateMachine { kind: String, message: String },

    #[error("Action {action} is not allowed in state {state}")]
    InvalidStateTransition { state: String, action: String },

    #[error("Attribute {name} is not declared by {kind} or its mixins")]
    AttributeNotDeclared { name: String, kind: String },

    #[error("Attribute {0} is immutable")]
    AttributeImmutable(String),

    #[error("Attribute {name} expects a {expected} value")]
    AttributeTypeMismatch {
        name: String,
        expected: AttributeType,
    },

    #[error("Mandatory attribute {0} is missing")]
    MandatoryAttributeMissing(String),

    #[error("Mixin {mixin} cannot be applied to {kind}")]
    MixinNotApplicable { mixin: String, kind: String },

    #[error("Mixin {mixin} requires {depends} to be present")]
    MixinDependencyMissing { mixin: String, depends: String },

    #[error("Entity of kind {found} does not belong to {expected}")]
    KindMismatch { expected: String, found: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("None of the accepted media types is supported: {0}")]
    NotAcceptable(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid schema definition: {0}")]
    InvalidSchema(String),

    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
