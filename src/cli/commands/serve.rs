use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::config::{Config, API_KEY_ENV};
use crate::gateway;

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind (overrides gateway.listen)
    #[arg(short, long)]
    pub listen: Option<String>,
}

pub async fn run(args: ServeArgs, config: &Config) -> Result<()> {
    let mut settings = config.gateway.clone();
    if let Some(listen) = args.listen {
        settings.listen = listen;
    }

    let api_key = Config::api_key();

    println!("{}", gateway::SERVICE_NAME.cyan().bold());
    println!("  {}: {}", "Listening".bold(), settings.listen);
    println!("  {}: {}", "Upstream".bold(), settings.submit_url);
    if api_key.is_none() {
        eprintln!(
            "{}: {} is not set; /generate, /status and /result will answer 500",
            "Warning".yellow().bold(),
            API_KEY_ENV
        );
    }
    println!("{}", "Press Ctrl-C to stop".dimmed());

    gateway::serve(&settings, api_key)
        .await
        .with_context(|| format!("Gateway on {} stopped with an error", settings.listen))
}
