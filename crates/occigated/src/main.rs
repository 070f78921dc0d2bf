mod app;
mod commands;

use clap::{Parser, Subcommand};
use occigate_config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "occigated")]
#[command(about = "OCCI gateway for IaaS backends", version, long_about = None)]
struct Cli {
    /// Config file (skips discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Listen address, overrides the config file
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Validate the configuration and the category schema
    Check,
    /// Print the category schema
    Schema {
        /// Media type to render with
        #[arg(short, long, default_value = "text/plain")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => occigate_config::load_config(path)?,
        None => Config::discover()?,
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve { listen } => commands::serve::handle(config, listen).await,
        Commands::Check => commands::check::handle(&config).await,
        Commands::Schema { format } => commands::schema::handle(&config, &format).await,
    }
}
