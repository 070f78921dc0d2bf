use crate::app;
use anyhow::anyhow;
use occigate_config::Config;
use occigate_core::{MediaType, Renderer};

pub async fn handle(config: &Config, format: &str) -> anyhow::Result<()> {
    let media = MediaType::parse(format).ok_or_else(|| {
        anyhow!(
            "unsupported format '{}' (expected one of {})",
            format,
            MediaType::supported_list()
        )
    })?;

    let manager = app::build_manager(&config.backend)?;
    let registry = app::build_registry(config, &manager).await?;
    let base_url = config.server.base_url();
    let rendered = Renderer::new(&base_url, &registry).render(&registry.get(None), media)?;
    print!("{}", rendered);
    Ok(())
}
