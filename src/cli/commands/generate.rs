use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::api::{GatewayApi, GatewayClient};
use crate::config::{Config, DisplayMode};
use crate::core::{MagicError, NoProgress, OutputFormat, ProgressSink};
use crate::orchestrator::{Command, DownloadOutcome, Orchestrator, Outcome};

#[derive(Args)]
pub struct GenerateArgs {
    /// Path to the image to edit
    #[arg(required = true)]
    pub image: PathBuf,

    /// The edit instruction (e.g., "make the sky blue", "add a hat")
    #[arg(required = true)]
    pub prompt: String,

    /// Gateway base URL (overrides client.gateway_url)
    #[arg(short, long)]
    pub gateway: Option<String>,

    /// Output directory for the result
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Don't download the result
    #[arg(long)]
    pub no_download: bool,

    /// Copy the result link to the clipboard
    #[arg(long)]
    pub copy_link: bool,

    /// Number of images to request (1-4)
    #[arg(short, long, default_value_t = 1)]
    pub num_images: u8,

    /// Image format to request (png, jpeg, webp)
    #[arg(long)]
    pub output_format: Option<String>,

    /// Output format (text, json, quiet)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub async fn run(args: GenerateArgs, config: &Config) -> Result<()> {
    let output_format = match args.output_format.as_deref() {
        Some(f) => OutputFormat::parse(f).with_context(|| {
            format!("Invalid output format. Valid values: {}", OutputFormat::variants().join(", "))
        })?,
        None => config.client.output_format,
    };

    let gateway = args
        .gateway
        .as_deref()
        .or_else(|| config.gateway_url())
        .map(|url| Arc::new(GatewayClient::new(url)) as Arc<dyn GatewayApi>);

    let mut orch = Orchestrator::new(gateway)
        .with_policy(config.retry_policy())
        .with_max_upload_bytes(config.client.max_upload_bytes)
        .with_output_format(output_format)
        .with_num_images(args.num_images);

    let text = args.format == "text";
    let mut silent = NoProgress;

    orch.dispatch(Command::SelectImage(args.image.clone()), &mut silent)
        .await
        .map_err(|e| fail(e, &args.format, None))?;
    orch.dispatch(Command::SetPrompt(args.prompt.clone()), &mut silent)
        .await
        .map_err(|e| fail(e, &args.format, None))?;

    if text {
        println!("{}: {}", "Image".cyan().bold(), args.image.display());
        println!(
            "{}: {} {}",
            "Prompt".cyan().bold(),
            orch.session().prompt.trim(),
            format!("({})", orch.session().prompt_counter()).dimmed()
        );
        if !orch.can_generate() {
            if let Some(warning) = orch.visible_notice() {
                eprintln!("{}: {}", "Warning".yellow().bold(), warning);
                eprintln!("  Run `magic config set client.gateway_url <url>` to fix this.");
            }
        }
        println!(
            "{}",
            format!("Waiting up to {}s for the result", orch.max_wait().as_secs()).dimmed()
        );
        println!();
    }

    let pb = if text {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.magenta} [{bar:30.magenta/blue}] {pos:>3}% {msg}")?
                .progress_chars("=> "),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let mut sink: Box<dyn ProgressSink> = match &pb {
        Some(pb) => Box::new(pb.clone()),
        None => Box::new(NoProgress),
    };

    let result = match orch.dispatch(Command::Generate, sink.as_mut()).await {
        Ok(Outcome::Generated(result)) => result,
        Ok(other) => anyhow::bail!("Unexpected outcome from generate: {:?}", other),
        Err(e) => return Err(fail(e, &args.format, pb.as_ref())),
    };

    if let Some(pb) = &pb {
        pb.finish_with_message(format!("{} Generation complete", "✓".green()));
    }

    let url = result.display_url().unwrap_or_default().to_string();

    let mut saved: Option<PathBuf> = None;
    let mut opened_in_viewer = false;
    if !args.no_download && config.output.auto_download {
        let dir = args
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.output.directory));
        match orch.dispatch(Command::Download(dir), &mut silent).await {
            Ok(Outcome::Downloaded(DownloadOutcome::Saved(path))) => saved = Some(path),
            Ok(Outcome::Downloaded(DownloadOutcome::OpenedInViewer(_))) => opened_in_viewer = true,
            Ok(_) => {}
            Err(e) => return Err(fail(e, &args.format, None)),
        }
    }

    let mut link_copied = false;
    if args.copy_link {
        match orch.dispatch(Command::CopyLink, &mut silent).await {
            Ok(_) => link_copied = true,
            Err(e) if text => eprintln!("{}: {}", "Warning".yellow().bold(), e),
            Err(e) => tracing::warn!("{}", e),
        }
    }

    match args.format.as_str() {
        "json" => {
            let out = serde_json::json!({
                "image": args.image,
                "prompt": orch.session().prompt.trim(),
                "url": url,
                "images": result.images,
                "saved_to": saved,
                "opened_in_viewer": opened_in_viewer,
                "link_copied": link_copied,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        "quiet" => match &saved {
            Some(path) => println!("{}", path.display()),
            None => println!("{}", url),
        },
        _ => {
            println!();
            println!("{}: {}", "Original".cyan().bold(), args.image.display());
            println!("{}: {}", "Result URL".cyan().bold(), url);
            if let Some(path) = &saved {
                println!("{}: {}", "Saved to".cyan().bold(), path.display());
            }
            if opened_in_viewer {
                println!(
                    "{}",
                    "Download failed; opened the result in your browser instead".yellow()
                );
            }
            if link_copied {
                println!("{} Link copied to clipboard", "✓".green());
            }

            if config.output.display == DisplayMode::Terminal {
                if let Some(path) = &saved {
                    println!();
                    display_image_terminal(path);
                }
            }
        }
    }

    Ok(())
}

/// Finish the progress bar and render the error for machine-readable output.
fn fail(err: MagicError, format: &str, pb: Option<&ProgressBar>) -> anyhow::Error {
    if let Some(pb) = pb {
        pb.finish_with_message(format!("{} Generation failed", "✗".red()));
    }
    if format == "json" {
        let out = serde_json::json!({ "error": err.to_string(), "kind": err.kind() });
        println!("{}", out);
    }
    err.into()
}

/// Display an image in the terminal using viuer
fn display_image_terminal(path: &Path) {
    let conf = viuer::Config {
        width: Some(80),
        height: Some(30),
        absolute_offset: false,
        ..Default::default()
    };

    if let Err(e) = viuer::print_from_file(path, &conf) {
        tracing::debug!("Failed to display image in terminal: {}", e);
    }
}
