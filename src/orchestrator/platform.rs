//! Seams to the host: time, clipboard and an external image viewer.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::core::MagicError;

/// Source of time for polling waits and notice expiry
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by tokio timers
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Best-effort desktop integration
#[async_trait]
pub trait Desktop: Send + Sync {
    async fn copy_text(&self, text: &str) -> Result<(), MagicError>;

    /// Open a URL in whatever viewer the platform provides
    async fn open_url(&self, url: &str) -> Result<(), MagicError>;
}

/// Shells out to the platform's clipboard and opener tools
pub struct SystemDesktop;

fn clipboard_tools() -> &'static [(&'static str, &'static [&'static str])] {
    if cfg!(target_os = "macos") {
        &[("pbcopy", &[])]
    } else if cfg!(target_os = "windows") {
        &[("clip", &[])]
    } else {
        &[
            ("wl-copy", &[]),
            ("xclip", &["-selection", "clipboard"]),
            ("xsel", &["--clipboard", "--input"]),
        ]
    }
}

fn opener() -> (&'static str, &'static [&'static str]) {
    if cfg!(target_os = "macos") {
        ("open", &[])
    } else if cfg!(target_os = "windows") {
        ("explorer", &[])
    } else {
        ("xdg-open", &[])
    }
}

async fn pipe_to(program: &str, args: &[&str], input: &str) -> std::io::Result<bool> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).await?;
    }

    Ok(child.wait().await?.success())
}

#[async_trait]
impl Desktop for SystemDesktop {
    async fn copy_text(&self, text: &str) -> Result<(), MagicError> {
        for (program, args) in clipboard_tools() {
            match pipe_to(program, args, text).await {
                Ok(true) => return Ok(()),
                Ok(false) => tracing::debug!("{} exited unsuccessfully", program),
                Err(e) => tracing::debug!("{} unavailable: {}", program, e),
            }
        }
        Err(MagicError::Clipboard("no usable clipboard tool found".to_string()))
    }

    async fn open_url(&self, url: &str) -> Result<(), MagicError> {
        let (program, args) = opener();
        let status = Command::new(program)
            .args(args)
            .arg(url)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| MagicError::Download(format!("could not launch {}: {}", program, e)))?;

        // explorer.exe reports failure even when it opened the URL
        if status.success() || cfg!(target_os = "windows") {
            Ok(())
        } else {
            Err(MagicError::Download(format!("{} exited with {}", program, status)))
        }
    }
}
