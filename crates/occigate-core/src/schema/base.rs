//! OCCI core categories: entity, resource, link

use crate::category::{AttributeDef, Category, CategoryId, EntityType, Kind};
use crate::entity::attr;

pub const SCHEME: &str = "http://schemas.ogf.org/occi/core#";

pub fn entity() -> CategoryId {
    CategoryId::known(SCHEME, "entity")
}

pub fn resource() -> CategoryId {
    CategoryId::known(SCHEME, "resource")
}

pub fn link() -> CategoryId {
    CategoryId::known(SCHEME, "link")
}

pub fn categories() -> Vec<Category> {
    vec![
        Kind::new(entity())
            .with_title("Entity")
            .with_attribute(
                attr::ID,
                AttributeDef::string()
                    .immutable()
                    .with_description("Unique identifier of the entity"),
            )
            .with_attribute(attr::TITLE, AttributeDef::string())
            .into(),
        Kind::new(resource())
            .with_title("Resource")
            .with_related(entity())
            .with_attribute(attr::SUMMARY, AttributeDef::string())
            .into(),
        Kind::new(link())
            .with_title("Link")
            .with_related(entity())
            .with_entity_type(EntityType::Link)
            .with_attribute(attr::SOURCE, AttributeDef::string().immutable())
            .with_attribute(attr::TARGET, AttributeDef::string().immutable())
            .into(),
    ]
}
