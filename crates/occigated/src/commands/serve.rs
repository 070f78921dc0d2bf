use crate::app;
use colored::Colorize;
use occigate_config::Config;
use occigate_server::{AppState, create_router};
use tracing::info;

pub async fn handle(mut config: Config, listen: Option<String>) -> anyhow::Result<()> {
    let base_url = config.server.base_url();
    if let Some(listen) = listen {
        config.server.listen = listen;
    }

    let manager = app::build_manager(&config.backend)?;
    let registry = app::build_registry(&config, &manager).await?;
    info!(
        backend = manager.backend_name(),
        categories = registry.len(),
        "Registry loaded"
    );

    let state = AppState::new(registry, manager, base_url.clone());
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    println!(
        "{} {} ({})",
        "occigate listening on".green(),
        config.server.listen.cyan(),
        base_url
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
