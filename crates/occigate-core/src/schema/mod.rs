//! Built-in OCCI schema and the extension schema loader

pub mod base;
pub mod infrastructure;
mod loader;

pub use loader::{load_extensions, parse_schema};

use crate::category::Category;

/// Core and infrastructure categories loaded at startup
pub fn builtin() -> Vec<Category> {
    let mut categories = base::categories();
    categories.extend(infrastructure::categories());
    categories
}
