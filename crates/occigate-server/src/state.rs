//! Shared application state

use occigate_backend::Manager;
use occigate_core::Registry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// State shared across handlers
///
/// The registry is read-mostly; only the query interface takes the write
/// lock, to add or remove user mixins.
pub struct AppState {
    pub registry: RwLock<Registry>,
    pub manager: Manager,
    pub base_url: String,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(registry: Registry, manager: Manager, base_url: impl Into<String>) -> SharedState {
        Arc::new(Self {
            registry: RwLock::new(registry),
            manager,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Path part of a location that may be an absolute URI on this server
    pub fn to_path<'a>(&self, location: &'a str) -> &'a str {
        location
            .strip_prefix(self.base_url.as_str())
            .unwrap_or(location)
    }
}
