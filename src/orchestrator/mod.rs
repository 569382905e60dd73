//! Client-side session: upload, prompt, generate, and what to do with the
//! result. Every user action goes through [`Orchestrator::dispatch`].

mod platform;
mod session;
mod workflow;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use platform::{Clock, Desktop, SystemClock, SystemDesktop};
pub use session::{Phase, SessionState};
use workflow::run_generation;

use crate::api::GatewayApi;
use crate::core::{
    GenerationRequest, GenerationResult, MagicError, OutputFormat, ProgressSink, RetryPolicy,
    UploadedImage, MAX_UPLOAD_BYTES,
};

pub const GATEWAY_MISSING: &str =
    "Gateway URL not configured. Set client.gateway_url or MAGIC_GATEWAY_URL.";

const MISSING_INPUT: &str = "Please upload an image and enter a prompt.";

/// A user action
#[derive(Debug, Clone)]
pub enum Command {
    SelectImage(PathBuf),
    SelectImageBytes {
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
    RemoveImage,
    SetPrompt(String),
    Generate,
    /// Save the result into this directory
    Download(PathBuf),
    CopyLink,
    TryAgain,
    DismissError,
}

/// What a successful command produced
#[derive(Debug, Clone)]
pub enum Outcome {
    Updated,
    Generated(GenerationResult),
    Downloaded(DownloadOutcome),
    LinkCopied(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved(PathBuf),
    /// Fetching failed; the URL was handed to the platform viewer instead
    OpenedInViewer(String),
}

pub struct Orchestrator {
    gateway: Option<Arc<dyn GatewayApi>>,
    clock: Arc<dyn Clock>,
    desktop: Arc<dyn Desktop>,
    policy: RetryPolicy,
    max_upload_bytes: u64,
    output_format: OutputFormat,
    num_images: u8,
    session: SessionState,
}

impl Orchestrator {
    /// `gateway` is `None` when no gateway URL is configured; generating is
    /// then refused with a visible warning.
    pub fn new(gateway: Option<Arc<dyn GatewayApi>>) -> Self {
        Self {
            gateway,
            clock: Arc::new(SystemClock),
            desktop: Arc::new(SystemDesktop),
            policy: RetryPolicy::default(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            output_format: OutputFormat::default(),
            num_images: 1,
            session: SessionState::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_desktop(mut self, desktop: Arc<dyn Desktop>) -> Self {
        self.desktop = desktop;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_num_images(mut self, num: u8) -> Self {
        self.num_images = num;
        self
    }

    /// Longest a generate can spend waiting between status polls
    pub fn max_wait(&self) -> std::time::Duration {
        self.policy.worst_case_wait()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// The error currently on screen, if it has not expired
    pub fn visible_notice(&self) -> Option<&str> {
        self.session.visible_notice(self.clock.now())
    }

    pub fn can_generate(&self) -> bool {
        self.gateway.is_some()
            && self.session.upload.is_some()
            && self.session.has_prompt()
            && !self.session.generating
    }

    /// Run a command. Failures are also kept as the visible notice, and
    /// the session is left ready for the next action.
    pub async fn dispatch(
        &mut self,
        command: Command,
        progress: &mut dyn ProgressSink,
    ) -> Result<Outcome, MagicError> {
        let outcome = match command {
            Command::SelectImage(path) => self
                .select_image_file(&path)
                .await
                .map(|_| Outcome::Updated),
            Command::SelectImageBytes {
                file_name,
                mime_type,
                bytes,
            } => self
                .select_image(file_name, mime_type, bytes)
                .map(|_| Outcome::Updated),
            Command::RemoveImage => {
                self.remove_image();
                Ok(Outcome::Updated)
            }
            Command::SetPrompt(text) => {
                self.set_prompt(text);
                Ok(Outcome::Updated)
            }
            Command::Generate => self.submit_generation(progress).await.map(Outcome::Generated),
            Command::Download(dir) => self.download_result(&dir).await.map(Outcome::Downloaded),
            Command::CopyLink => self.copy_result_link().await.map(Outcome::LinkCopied),
            Command::TryAgain => {
                self.try_again();
                Ok(Outcome::Updated)
            }
            Command::DismissError => {
                self.session.dismiss();
                Ok(Outcome::Updated)
            }
        };

        if let Err(e) = &outcome {
            tracing::warn!(kind = e.kind(), "Command failed: {}", e);
            self.session.generating = false;
            self.session.raise(e.to_string(), self.clock.now());
        }

        outcome
    }

    /// Validate and hold an in-memory image. On failure the previous upload
    /// stays in place.
    pub fn select_image(
        &mut self,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<(), MagicError> {
        let image = UploadedImage::from_bytes(file_name, mime_type, bytes, self.max_upload_bytes)?;
        self.accept_upload(image);
        Ok(())
    }

    pub async fn select_image_file(&mut self, path: &Path) -> Result<(), MagicError> {
        let image = UploadedImage::from_path(path, self.max_upload_bytes).await?;
        self.accept_upload(image);
        Ok(())
    }

    fn accept_upload(&mut self, image: UploadedImage) {
        tracing::debug!(
            file = image.file_name(),
            mime = image.mime_type(),
            size = image.size(),
            "Image selected"
        );
        self.session.upload = Some(image);
        self.warn_if_unconfigured();
    }

    pub fn remove_image(&mut self) {
        self.session.upload = None;
    }

    pub fn set_prompt(&mut self, text: impl Into<String>) {
        self.session.prompt = text.into();
        self.warn_if_unconfigured();
    }

    fn warn_if_unconfigured(&mut self) {
        if self.gateway.is_none() && self.session.upload.is_some() && self.session.has_prompt() {
            self.session.raise(GATEWAY_MISSING, self.clock.now());
        }
    }

    /// Submit the current upload and prompt and wait for the result.
    pub async fn submit_generation(
        &mut self,
        progress: &mut dyn ProgressSink,
    ) -> Result<GenerationResult, MagicError> {
        let Some(upload) = self.session.upload.as_ref() else {
            return Err(MagicError::Precondition(MISSING_INPUT.to_string()));
        };
        if !self.session.has_prompt() {
            return Err(MagicError::Precondition(MISSING_INPUT.to_string()));
        }
        let Some(gateway) = self.gateway.clone() else {
            return Err(MagicError::Precondition(GATEWAY_MISSING.to_string()));
        };

        let request = GenerationRequest::new(&self.session.prompt, upload)?
            .with_num_images(self.num_images)
            .with_output_format(self.output_format);

        self.session.dismiss();
        self.session.result = None;
        self.session.generating = true;

        let outcome = run_generation(
            gateway.as_ref(),
            self.clock.as_ref(),
            &self.policy,
            &request,
            progress,
        )
        .await;

        self.session.generating = false;
        let result = outcome?;
        self.session.result = Some(result.clone());
        Ok(result)
    }

    /// Save the result image into `dir`, or hand its URL to the platform
    /// viewer when it cannot be fetched.
    pub async fn download_result(&mut self, dir: &Path) -> Result<DownloadOutcome, MagicError> {
        let url = self.result_url()?;
        let gateway = self
            .gateway
            .clone()
            .ok_or_else(|| MagicError::Precondition(GATEWAY_MISSING.to_string()))?;

        let fetch_err = match gateway.fetch_image(&url).await {
            Ok(bytes) => return self.save_image(dir, &bytes).await.map(DownloadOutcome::Saved),
            Err(e) => e,
        };

        tracing::warn!("Could not fetch result image, opening in viewer: {}", fetch_err);
        self.desktop.open_url(&url).await.map_err(|open_err| {
            MagicError::Download(format!("{}; opening the link failed too: {}", fetch_err, open_err))
        })?;
        Ok(DownloadOutcome::OpenedInViewer(url))
    }

    async fn save_image(&self, dir: &Path, bytes: &[u8]) -> Result<PathBuf, MagicError> {
        let ext = image::guess_format(bytes)
            .ok()
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or_else(|| self.output_format.extension());
        let file_name = format!("picture-magic-{}.{}", chrono::Utc::now().timestamp_millis(), ext);

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;

        tracing::info!(path = %path.display(), "Result saved");
        Ok(path)
    }

    pub async fn copy_result_link(&mut self) -> Result<String, MagicError> {
        let url = self.result_url()?;
        self.desktop.copy_text(&url).await?;
        Ok(url)
    }

    /// Hide the result and clear the prompt; the upload is kept.
    pub fn try_again(&mut self) {
        self.session.result = None;
        self.session.prompt.clear();
    }

    fn result_url(&self) -> Result<String, MagicError> {
        self.session
            .result_url()
            .map(str::to_string)
            .ok_or_else(|| MagicError::Precondition("There is no generated image yet.".to_string()))
    }
}
