use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::path::Path;
use tokio::fs;

use super::error::MagicError;

/// Default upload ceiling (10 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// An image the user picked, held in memory as a data URI ready for transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    file_name: String,
    mime_type: String,
    size: u64,
    data_uri: String,
}

impl UploadedImage {
    /// Validate and encode raw bytes.
    pub fn from_bytes(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
        max_bytes: u64,
    ) -> Result<Self, MagicError> {
        let mime_type = mime_type.into();
        let size = bytes.len() as u64;

        check_mime(&mime_type)?;
        check_size(size, max_bytes)?;

        let data_uri = format!("data:{};base64,{}", mime_type, BASE64.encode(&bytes));

        Ok(Self {
            file_name: file_name.into(),
            mime_type,
            size,
            data_uri,
        })
    }

    /// Load a file from disk.
    ///
    /// The size is checked against file metadata before reading, so an
    /// oversized file is never pulled into memory. The MIME type is sniffed
    /// from the content, falling back to the extension.
    pub async fn from_path(path: &Path, max_bytes: u64) -> Result<Self, MagicError> {
        let meta = fs::metadata(path).await?;
        check_size(meta.len(), max_bytes)?;

        let bytes = fs::read(path).await?;
        let mime_type = sniff_mime(&bytes, path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        Self::from_bytes(file_name, mime_type, bytes, max_bytes)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }
}

fn check_mime(mime_type: &str) -> Result<(), MagicError> {
    if mime_type.starts_with("image/") {
        Ok(())
    } else {
        Err(MagicError::Validation(format!(
            "Please choose an image file (got {}).",
            mime_type
        )))
    }
}

fn check_size(size: u64, max_bytes: u64) -> Result<(), MagicError> {
    if size > max_bytes {
        Err(MagicError::Validation(format!(
            "Image is too large. Please use an image under {}MB.",
            max_bytes / (1024 * 1024)
        )))
    } else {
        Ok(())
    }
}

fn sniff_mime(bytes: &[u8], path: &Path) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }

    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    };
    mime.to_string()
}
