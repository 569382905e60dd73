use std::time::{Duration, Instant};

use crate::core::{GenerationResult, UploadedImage};

/// How long an error stays visible
pub const NOTICE_TTL: Duration = Duration::from_secs(10);

/// What the front-end should be showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing uploaded yet
    Idle,
    /// Image uploaded, waiting for a generate
    Preview,
    /// Generation in flight
    Loading,
    /// A result is available
    Result,
}

/// The single user-visible error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub raised_at: Instant,
}

/// Everything the orchestrator remembers between user actions
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub upload: Option<UploadedImage>,
    pub prompt: String,
    pub result: Option<GenerationResult>,
    pub generating: bool,
    pub notice: Option<Notice>,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        if self.generating {
            Phase::Loading
        } else if self.result.is_some() {
            Phase::Result
        } else if self.upload.is_some() {
            Phase::Preview
        } else {
            Phase::Idle
        }
    }

    pub fn has_prompt(&self) -> bool {
        !self.prompt.trim().is_empty()
    }

    pub fn result_url(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.display_url())
    }

    /// Character counter shown under the prompt box
    pub fn prompt_counter(&self) -> String {
        let count = self.prompt.chars().count();
        format!("{} character{}", count, if count == 1 { "" } else { "s" })
    }

    /// Replace whatever error is showing
    pub fn raise(&mut self, message: impl Into<String>, now: Instant) {
        self.notice = Some(Notice {
            message: message.into(),
            raised_at: now,
        });
    }

    pub fn dismiss(&mut self) {
        self.notice = None;
    }

    /// The current error, unless it has auto-dismissed
    pub fn visible_notice(&self, now: Instant) -> Option<&str> {
        self.notice
            .as_ref()
            .filter(|n| now.saturating_duration_since(n.raised_at) < NOTICE_TTL)
            .map(|n| n.message.as_str())
    }
}
