use serde::{Deserialize, Serialize};

use super::error::MagicError;
use super::upload::UploadedImage;

/// Encoding the upstream should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            "webp" => Some(OutputFormat::Webp),
            _ => None,
        }
    }

    /// File extension for saved results
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["png", "jpeg", "webp"]
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body posted to the gateway's `/generate` endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// Edit instruction, already trimmed
    pub prompt: String,

    /// Source images as data URIs
    pub image_urls: Vec<String>,

    #[serde(default = "default_num_images")]
    pub num_images: u8,

    #[serde(default)]
    pub output_format: OutputFormat,
}

fn default_num_images() -> u8 {
    1
}

impl GenerationRequest {
    /// Build a request for a single source image.
    ///
    /// The prompt is trimmed; a blank prompt is a precondition failure since
    /// nothing has been sent yet.
    pub fn new(prompt: &str, image: &UploadedImage) -> Result<Self, MagicError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(MagicError::Precondition(
                "Please upload an image and enter a prompt.".to_string(),
            ));
        }

        Ok(Self {
            prompt: prompt.to_string(),
            image_urls: vec![image.data_uri().to_string()],
            num_images: default_num_images(),
            output_format: OutputFormat::default(),
        })
    }

    pub fn with_num_images(mut self, num: u8) -> Self {
        self.num_images = num.clamp(1, 4);
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }
}
