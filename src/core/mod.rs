pub mod error;
pub mod job;
pub mod params;
pub mod poll;
pub mod upload;

pub use error::MagicError;
pub use job::{is_valid_request_id, GeneratedImage, GenerationResult, GenerationStatus, RequestHandle};
pub use params::{GenerationRequest, OutputFormat};
pub use poll::{phase_message, Backoff, NoProgress, Progress, ProgressSink, RetryPolicy};
pub use upload::{UploadedImage, MAX_UPLOAD_BYTES};
