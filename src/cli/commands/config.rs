use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use crate::config::{Config, API_KEY_ENV, GATEWAY_URL_ENV};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: Option<ConfigCommand>,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show all configuration values
    Show,

    /// Get a specific configuration value
    Get {
        /// Config key (e.g., client.gateway_url, output.directory)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Config key (e.g., client.gateway_url, output.directory)
        key: String,
        /// Value to set
        value: String,
    },

    /// Show the config file path
    Path,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs, config: &mut Config) -> Result<()> {
    match args.command {
        Some(ConfigCommand::Show) | None => show_config(config),
        Some(ConfigCommand::Get { key }) => get_config(&key, config),
        Some(ConfigCommand::Set { key, value }) => set_config(&key, &value, config),
        Some(ConfigCommand::Path) => show_path(config),
        Some(ConfigCommand::Reset { force }) => reset_config(force, config),
    }
}

fn not_set() -> String {
    "(not set)".dimmed().to_string()
}

fn show_config(config: &Config) -> Result<()> {
    println!("{}", "Configuration".cyan().bold());
    println!("{}", "=".repeat(50));
    println!();

    println!("[{}]", "gateway".yellow());
    println!("  {} = {}", "listen".bold(), config.gateway.listen);
    println!("  {} = {}", "submit_url".bold(), config.gateway.submit_url);
    println!("  {} = {}", "requests_url".bold(), config.gateway.requests_url);
    println!("  {} = {}", "max_body_bytes".bold(), config.gateway.max_body_bytes);
    println!();

    println!("[{}]", "client".yellow());
    println!(
        "  {} = {}",
        "gateway_url".bold(),
        config.gateway_url().map(str::to_string).unwrap_or_else(not_set)
    );
    println!("  {} = {}", "max_attempts".bold(), config.client.max_attempts);
    println!("  {} = {}", "poll_interval_ms".bold(), config.client.poll_interval_ms);
    println!("  {} = {}", "poll_backoff_ms".bold(), config.client.poll_backoff_ms);
    println!("  {} = {}", "max_upload_bytes".bold(), config.client.max_upload_bytes);
    println!("  {} = {}", "output_format".bold(), config.client.output_format);
    println!();

    println!("[{}]", "output".yellow());
    println!("  {} = {}", "directory".bold(), config.output.directory);
    println!("  {} = {}", "auto_download".bold(), config.output.auto_download);
    println!("  {} = {}", "display".bold(), config.output.display.as_str());
    println!();

    let key_state = if Config::api_key().is_some() {
        "set".green().to_string()
    } else {
        not_set()
    };
    println!("{} {}", format!("{}:", API_KEY_ENV).bold(), key_state);
    if std::env::var(GATEWAY_URL_ENV).is_ok() {
        println!(
            "{}",
            format!("client.gateway_url is overridden by {}", GATEWAY_URL_ENV).dimmed()
        );
    }
    println!("{}", format!("Config file: {}", config.config_path.display()).dimmed());

    Ok(())
}

fn get_config(key: &str, config: &Config) -> Result<()> {
    match config.get(key) {
        Some(value) => println!("{}", value),
        None => {
            eprintln!("{}: Unknown config key '{}'", "Error".red().bold(), key);
            eprintln!();
            eprintln!("Available keys:");
            for k in Config::keys() {
                eprintln!("  {}", k);
            }
        }
    }
    Ok(())
}

fn set_config(key: &str, value: &str, config: &mut Config) -> Result<()> {
    config.set(key, value)?;
    config.save()?;

    println!("{} Set {} = {}", "✓".green(), key.cyan(), value);
    Ok(())
}

fn show_path(config: &Config) -> Result<()> {
    println!("{}", config.config_path.display());
    Ok(())
}

fn reset_config(force: bool, config: &mut Config) -> Result<()> {
    if !force {
        eprintln!(
            "{}: This will reset all configuration to defaults. Use --force to confirm.",
            "Warning".yellow().bold()
        );
        return Ok(());
    }

    let path = config.config_path.clone();
    *config = Config::default();
    config.config_path = path;
    config.save()?;

    println!("{} Configuration reset to defaults", "✓".green());
    Ok(())
}
