pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "magic",
    version,
    about = "AI Picture Magic - edit images with a text prompt",
    long_about = r#"AI Picture Magic - edit images with a text prompt

Two halves in one binary: a small gateway that holds the fal.ai key and
proxies the image-edit queue API, and a client that uploads an image,
waits for the edit and saves the result.

SETUP:
  On the gateway host:
    export FAL_KEY=your-fal-key
    magic serve

  On the client:
    magic config set client.gateway_url http://127.0.0.1:8787
    # or: export MAGIC_GATEWAY_URL=http://127.0.0.1:8787

EXAMPLES:
  Edit an image:
    magic generate photo.jpg "turn it into a watercolor painting"
    magic g cat.png "add a party hat" --copy-link

  Work interactively:
    magic session

  Check the gateway:
    magic ping

  Manage configuration:
    magic config show
    magic config set client.poll_interval_ms 1500

OUTPUT FORMATS:
  --format text   Human-readable output (default)
  --format json   Machine-readable JSON
  --format quiet  Minimal output, just the file path or URL"#,
    after_help = r#"CONFIGURATION:
  Config file: ~/.config/picture-magic/config.toml (Linux)
  The fal.ai key is read from FAL_KEY only and never stored on disk.

  Upload limit: 10MB by default (client.max_upload_bytes)
  Output formats: png (default), jpeg, webp"#
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway
    ///
    /// Serves /generate, /status/{id} and /result/{id}, forwarding each to
    /// the fal.ai queue API with the key from FAL_KEY.
    #[command(
        alias = "s",
        after_help = r#"EXAMPLES:
  Listen on the configured address:
    FAL_KEY=... magic serve

  Listen on all interfaces:
    magic serve --listen 0.0.0.0:8787"#
    )]
    Serve(commands::serve::ServeArgs),

    /// Edit an image with a text prompt
    ///
    /// Uploads the image through the gateway, waits for the edit to finish
    /// and saves the result to the output directory.
    #[command(
        alias = "g",
        after_help = r#"EXAMPLES:
  Basic edit:
    magic generate photo.png "make the sky pink"

  Keep only the link:
    magic generate photo.png "pixel art style" --no-download --copy-link

  JSON output:
    magic generate photo.png "add snow" --format json

  Custom output directory and format:
    magic generate photo.png "oil painting" --output ./art --output-format webp"#
    )]
    Generate(commands::generate::GenerateArgs),

    /// Interactive session: pick an image, set a prompt, generate, repeat
    ///
    /// Reads one command per line; type `help` inside for the list.
    #[command(
        alias = "i",
        after_help = r#"EXAMPLE SESSION:
  magic> image ./cat.png
  magic> prompt give the cat a tiny crown
  magic> generate
  magic> download
  magic> again
  magic> quit"#
    )]
    Session(commands::session::SessionArgs),

    /// Check that the gateway is reachable
    #[command(alias = "p")]
    Ping(commands::ping::PingArgs),

    /// View or modify configuration
    ///
    /// Changes are saved to the config file immediately.
    #[command(
        alias = "c",
        after_help = r#"EXAMPLES:
  Show all settings:
    magic config show

  Get a specific value:
    magic config get client.gateway_url

  Set values:
    magic config set client.gateway_url https://magic.example.workers.dev
    magic config set client.max_attempts 90
    magic config set output.display none

  Reset to defaults:
    magic config reset --force

AVAILABLE SETTINGS:
  gateway.listen           - Address the gateway binds to
  gateway.submit_url       - Upstream submission endpoint
  gateway.requests_url     - Upstream status/result base
  gateway.max_body_bytes   - Largest accepted /generate body
  client.gateway_url       - Gateway base URL (MAGIC_GATEWAY_URL overrides)
  client.max_attempts      - Status polls before giving up
  client.poll_interval_ms  - Wait between status polls
  client.poll_backoff_ms   - Extra wait added after each poll (0 = fixed)
  client.max_upload_bytes  - Largest image accepted for upload
  client.output_format     - png, jpeg or webp
  output.directory         - Where to save results
  output.auto_download     - Save results automatically (true/false)
  output.display           - Show results in the terminal (terminal/none)"#
    )]
    Config(commands::config::ConfigArgs),
}
