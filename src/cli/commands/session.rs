use anyhow::Result;
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::api::{GatewayApi, GatewayClient};
use crate::config::Config;
use crate::core::NoProgress;
use crate::orchestrator::{Command, DownloadOutcome, Orchestrator, Outcome, Phase};

const HELP: &str = r#"Commands:
  image <path>       Pick the image to edit
  remove             Drop the current image
  prompt <text>      Set the edit instruction
  generate           Run the edit
  download [dir]     Save the result (defaults to output.directory)
  copy               Copy the result link to the clipboard
  again              Clear the prompt and result, keep the image
  dismiss            Hide the current error
  status             Show the session state
  help               Show this help
  quit               Leave"#;

#[derive(Args)]
pub struct SessionArgs {
    /// Gateway base URL (overrides client.gateway_url)
    #[arg(short, long)]
    pub gateway: Option<String>,

    /// Default directory for `download`
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug)]
enum Input {
    Action(Command),
    Status,
    Help,
    Quit,
}

fn parse_line(line: &str, output_dir: &Path) -> Result<Option<Input>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "image" | "open" if rest.is_empty() => return Err("usage: image <path>".to_string()),
        "image" | "open" => Input::Action(Command::SelectImage(PathBuf::from(rest))),
        "remove" => Input::Action(Command::RemoveImage),
        "prompt" => Input::Action(Command::SetPrompt(rest.to_string())),
        "generate" | "go" => Input::Action(Command::Generate),
        "download" | "save" => {
            let dir = if rest.is_empty() {
                output_dir.to_path_buf()
            } else {
                PathBuf::from(rest)
            };
            Input::Action(Command::Download(dir))
        }
        "copy" => Input::Action(Command::CopyLink),
        "again" | "retry" => Input::Action(Command::TryAgain),
        "dismiss" => Input::Action(Command::DismissError),
        "status" => Input::Status,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => return Err(format!("unknown command '{}', try `help`", other)),
    };
    Ok(Some(input))
}

pub async fn run(args: SessionArgs, config: &Config) -> Result<()> {
    let gateway = args
        .gateway
        .as_deref()
        .or_else(|| config.gateway_url())
        .map(|url| Arc::new(GatewayClient::new(url)) as Arc<dyn GatewayApi>);

    let mut orch = Orchestrator::new(gateway)
        .with_policy(config.retry_policy())
        .with_max_upload_bytes(config.client.max_upload_bytes)
        .with_output_format(config.client.output_format);

    let output_dir = args
        .output
        .unwrap_or_else(|| PathBuf::from(&config.output.directory));

    println!("{}", "AI Picture Magic".magenta().bold());
    println!("{}", "Type `help` for commands.".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", "magic>".magenta());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let input = match parse_line(&line, &output_dir) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("{}", msg.yellow());
                continue;
            }
        };

        match input {
            Input::Quit => break,
            Input::Help => println!("{}", HELP),
            Input::Status => print_status(&orch),
            Input::Action(command) => run_action(&mut orch, command).await?,
        }
    }

    Ok(())
}

async fn run_action(orch: &mut Orchestrator, command: Command) -> Result<()> {
    let pb = if matches!(command, Command::Generate) {
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

    let outcome = match &pb {
        Some(pb) => orch.dispatch(command, &mut pb.clone()).await,
        None => orch.dispatch(command, &mut NoProgress).await,
    };

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    match outcome {
        Ok(Outcome::Generated(result)) => {
            println!("{} Generation complete!", "✓".green());
            if let Some(url) = result.display_url() {
                println!("  {}", url.cyan());
            }
        }
        Ok(Outcome::Downloaded(DownloadOutcome::Saved(path))) => {
            println!("{} Saved to {}", "✓".green(), path.display());
        }
        Ok(Outcome::Downloaded(DownloadOutcome::OpenedInViewer(url))) => {
            println!("{} Download failed, opened {} instead", "!".yellow(), url);
        }
        Ok(Outcome::LinkCopied(_)) => println!("{} Link copied to clipboard!", "✓".green()),
        Ok(Outcome::Updated) => print_status(orch),
        Err(_) => {}
    }

    if let Some(notice) = orch.visible_notice() {
        eprintln!("{}: {}", "Error".red().bold(), notice);
    }

    Ok(())
}

fn print_status(orch: &Orchestrator) {
    let session = orch.session();
    let phase = match orch.phase() {
        Phase::Idle => "idle".dimmed(),
        Phase::Preview => "ready".cyan(),
        Phase::Loading => "working".yellow(),
        Phase::Result => "done".green(),
    };

    let image = session
        .upload
        .as_ref()
        .map(|u| format!("{} ({} KB)", u.file_name(), u.size() / 1024))
        .unwrap_or_else(|| "none".to_string());

    println!(
        "  [{}] image: {}  prompt: {}{}",
        phase,
        image,
        session.prompt_counter(),
        if orch.can_generate() { "  (ready to generate)".green().to_string() } else { String::new() }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<Input> {
        parse_line(line, Path::new("out")).unwrap()
    }

    #[test]
    fn parses_actions_with_arguments() {
        assert!(matches!(
            parse("image  ./cat photo.png"),
            Some(Input::Action(Command::SelectImage(p))) if p == Path::new("./cat photo.png")
        ));
        assert!(matches!(
            parse("prompt   make it   sparkle "),
            Some(Input::Action(Command::SetPrompt(t))) if t == "make it   sparkle"
        ));
        assert!(matches!(
            parse("download"),
            Some(Input::Action(Command::Download(p))) if p == Path::new("out")
        ));
        assert!(matches!(
            parse("SAVE /tmp/x"),
            Some(Input::Action(Command::Download(p))) if p == Path::new("/tmp/x")
        ));
    }

    #[test]
    fn parses_bare_words() {
        assert!(matches!(parse("go"), Some(Input::Action(Command::Generate))));
        assert!(matches!(parse("copy"), Some(Input::Action(Command::CopyLink))));
        assert!(matches!(parse("again"), Some(Input::Action(Command::TryAgain))));
        assert!(matches!(parse("dismiss"), Some(Input::Action(Command::DismissError))));
        assert!(matches!(parse("remove"), Some(Input::Action(Command::RemoveImage))));
        assert!(matches!(parse("status"), Some(Input::Status)));
        assert!(matches!(parse("q"), Some(Input::Quit)));
        assert!(parse("   ").is_none());
    }

    #[test]
    fn rejects_unknown_and_incomplete_input() {
        assert!(parse_line("image", Path::new("out")).is_err());
        assert!(parse_line("paint it", Path::new("out")).unwrap_err().contains("paint"));
    }
}
