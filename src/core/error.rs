use thiserror::Error;

#[derive(Error, Debug)]
pub enum MagicError {
    /// Bad local input: oversized or non-image file, blank fields
    #[error("{0}")]
    Validation(String),

    /// Missing configuration or user input, raised before any network call
    #[error("{0}")]
    Precondition(String),

    /// Gateway answered 2xx but left out a required field
    #[error("{0}")]
    Protocol(String),

    /// Non-2xx from the gateway; message taken from its error body when present
    #[error("{message}")]
    UpstreamHttp {
        status: u16,
        message: String,
    },

    #[error("Image generation failed on the server")]
    UpstreamGeneration,

    #[error("Generation timed out. Please try again.")]
    Timeout,

    #[error("No image was generated")]
    EmptyResult,

    #[error("Failed to copy link to clipboard: {0}")]
    Clipboard(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Network error: {message}")]
    Http {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for MagicError {
    fn from(err: reqwest::Error) -> Self {
        MagicError::Http {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl MagicError {
    /// Short machine-friendly name, used for JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            MagicError::Validation(_) => "validation",
            MagicError::Precondition(_) => "precondition",
            MagicError::Protocol(_) => "protocol",
            MagicError::UpstreamHttp { .. } => "upstream_http",
            MagicError::UpstreamGeneration => "upstream_generation",
            MagicError::Timeout => "timeout",
            MagicError::EmptyResult => "empty_result",
            MagicError::Clipboard(_) => "clipboard",
            MagicError::Download(_) => "download",
            MagicError::Http { .. } => "http",
            MagicError::Io(_) => "io",
        }
    }
}
