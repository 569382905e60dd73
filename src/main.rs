use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod cli;
mod config;
mod core;
mod gateway;
mod http_client;
mod orchestrator;

use cli::{Cli, Commands};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    // Load or create config
    let mut config = Config::load_or_create()?;

    match cli.command {
        Commands::Serve(args) => {
            cli::commands::serve::run(args, &config).await?;
        }
        Commands::Generate(args) => {
            cli::commands::generate::run(args, &config).await?;
        }
        Commands::Session(args) => {
            cli::commands::session::run(args, &config).await?;
        }
        Commands::Ping(args) => {
            cli::commands::ping::run(args, &config).await?;
        }
        Commands::Config(args) => {
            cli::commands::config::run(args, &mut config)?;
        }
    }

    Ok(())
}
