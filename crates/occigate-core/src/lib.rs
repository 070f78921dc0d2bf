//! occigate core
//!
//! Category model, registry, entities, state machines and the wire formats
//! of the OCCI gateway.

pub mod category;
pub mod collection;
pub mod entity;
pub mod error;
pub mod registry;
pub mod render;
pub mod schema;
pub mod state;
pub mod template;
pub mod validate;

pub use category::{
    Action, AttributeDef, AttributeSchema, AttributeType, AttributeValue, Category, CategoryClass,
    CategoryId, EntityType, Kind, Mixin,
};
pub use collection::Collection;
pub use entity::{ActionInstance, Attributes, Entity, Link, Resource};
pub use error::{CoreError, Result};
pub use registry::Registry;
pub use render::{MediaType, Renderer, RequestBody, negotiate};
pub use state::{StateMachine, Transition};
