//! Startup wiring shared by the commands

use anyhow::{Context, bail};
use occigate_backend::{Backend, Manager};
use occigate_backend_opennebula::{Credentials, OpenNebulaConfig, opennebula_backend};
use occigate_config::{BackendConfig, Config};
use occigate_core::Registry;
use occigate_core::schema::load_extensions;
use tracing::{debug, info};

/// Construct the configured adapter
pub fn build_backend(config: &BackendConfig) -> anyhow::Result<Backend> {
    match config.name.as_str() {
        occigate_backend_dummy::NAME => Ok(occigate_backend_dummy::dummy_backend()),
        occigate_backend_opennebula::NAME => {
            let mut one = OpenNebulaConfig {
                credentials: Credentials {
                    endpoint: config.endpoint.clone(),
                    user: config.user.clone(),
                    password: config.password.clone(),
                },
                ..Default::default()
            };
            if let Some(datastore) = &config.datastore {
                one.datastore = datastore.clone();
            }
            if let Some(bridge) = &config.bridge {
                one.bridge = bridge.clone();
            }
            Ok(opennebula_backend(one))
        }
        other => bail!(
            "unknown backend '{}' (expected {} or {})",
            other,
            occigate_backend_dummy::NAME,
            occigate_backend_opennebula::NAME
        ),
    }
}

/// Built-in categories, extension schemas and backend templates, sealed
pub async fn build_registry(config: &Config, manager: &Manager) -> anyhow::Result<Registry> {
    let mut registry = Registry::with_builtin()?;

    for path in &config.schema.extensions {
        let categories = load_extensions(path)
            .with_context(|| format!("failed to load extension schema {}", path.display()))?;
        info!("Loaded {} categories from {}", categories.len(), path.display());
        for category in categories {
            registry.register(category)?;
        }
    }

    let templates = manager
        .templates()
        .await
        .context("failed to fetch backend templates")?;
    debug!("Registering {} backend templates", templates.len());
    for template in templates {
        registry.register(template)?;
    }

    registry.seal();
    Ok(registry)
}

pub fn build_manager(config: &BackendConfig) -> anyhow::Result<Manager> {
    let backend = build_backend(config)?;
    Ok(Manager::new(backend)
        .with_timeout(config.timeout)
        .serialize_writes(config.serialize_writes))
}
