use crate::app;
use colored::Colorize;
use occigate_config::Config;
use occigate_core::schema::infrastructure;

pub async fn handle(config: &Config) -> anyhow::Result<()> {
    println!("{}", "Checking configuration...".blue());
    match &config.source {
        Some(path) => println!("Config file: {}", path.display().to_string().cyan()),
        None => println!("Config file: {}", "(none, using defaults)".yellow()),
    }
    println!("Listen:   {}", config.server.listen);
    println!("Base URL: {}", config.server.base_url());
    println!(
        "Backend:  {} (timeout {}s)",
        config.backend.name.cyan(),
        config.backend.timeout.as_secs_f64()
    );

    let manager = app::build_manager(&config.backend)?;
    match app::build_registry(config, &manager).await {
        Ok(registry) => {
            println!("{}", "✓ Schema loaded".green().bold());
            println!("  kinds:  {}", registry.kinds().count());
            println!("  mixins: {}", registry.mixins().count());
            println!(
                "    os templates:       {}",
                registry.mixins_related_to(&infrastructure::os_tpl()).len()
            );
            println!(
                "    resource templates: {}",
                registry.mixins_related_to(&infrastructure::resource_tpl()).len()
            );
            for path in &config.schema.extensions {
                println!("    - {}", path.display().to_string().cyan());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Schema error".red().bold());
            eprintln!("  {:#}", e);
            std::process::exit(1);
        }
    }
}
