use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::time::Instant;

use crate::api::GatewayClient;
use crate::config::{Config, GATEWAY_URL_ENV};

#[derive(Args)]
pub struct PingArgs {
    /// Gateway base URL (overrides client.gateway_url)
    #[arg(short, long)]
    pub gateway: Option<String>,

    /// Output format (text, json, quiet)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub async fn run(args: PingArgs, config: &Config) -> Result<()> {
    let Some(url) = args.gateway.as_deref().or_else(|| config.gateway_url()) else {
        anyhow::bail!(
            "Gateway URL not configured. Run `magic config set client.gateway_url <url>` or set {}.",
            GATEWAY_URL_ENV
        );
    };

    let client = GatewayClient::new(url);
    let started = Instant::now();
    let health = client.health().await?;
    let elapsed = started.elapsed();

    match args.format.as_str() {
        "json" => {
            let out = serde_json::json!({
                "gateway": client.base_url(),
                "status": health.status,
                "service": health.service,
                "latency_ms": elapsed.as_millis() as u64,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        "quiet" => println!("{}", health.status),
        _ => {
            println!(
                "{} {} answered {} in {}ms",
                "✓".green(),
                health.service.cyan(),
                health.status.green(),
                elapsed.as_millis()
            );
            println!("  {}", client.base_url().dimmed());
        }
    }

    Ok(())
}
