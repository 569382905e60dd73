use serde::{Deserialize, Deserializer, Serialize};

use super::error::MagicError;

/// Longest request id accepted before URL interpolation
pub const MAX_REQUEST_ID_LEN: usize = 128;

/// Check an upstream-issued id against the allow-listed character set.
///
/// Ids end up inside URL paths, so anything outside `[A-Za-z0-9_-]` is
/// refused rather than escaped.
pub fn is_valid_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Correlation key issued by the upstream on submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RequestHandle(String);

impl RequestHandle {
    pub fn parse(id: impl Into<String>) -> Result<Self, MagicError> {
        let id = id.into();
        if is_valid_request_id(&id) {
            Ok(Self(id))
        } else {
            Err(MagicError::Protocol(format!(
                "Received a malformed request ID: {:?}",
                id
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Queue state reported by the upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GenerationStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Other(String),
}

impl From<String> for GenerationStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "IN_QUEUE" | "QUEUED" => GenerationStatus::Queued,
            "IN_PROGRESS" => GenerationStatus::InProgress,
            "COMPLETED" => GenerationStatus::Completed,
            "FAILED" => GenerationStatus::Failed,
            _ => GenerationStatus::Other(s),
        }
    }
}

impl From<GenerationStatus> for String {
    fn from(status: GenerationStatus) -> Self {
        status.to_string()
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationStatus::Queued => write!(f, "IN_QUEUE"),
            GenerationStatus::InProgress => write!(f, "IN_PROGRESS"),
            GenerationStatus::Completed => write!(f, "COMPLETED"),
            GenerationStatus::Failed => write!(f, "FAILED"),
            GenerationStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A single generated image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Anything else the upstream attached (file_name, width, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Terminal output of a generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(default, deserialize_with = "usable_images")]
    pub images: Vec<GeneratedImage>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `null` reads as no images, and entries without a URL are dropped, so a
/// useless result surfaces as an empty list rather than a decode error.
fn usable_images<'de, D>(deserializer: D) -> Result<Vec<GeneratedImage>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<GeneratedImage>(entry) {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::warn!("Skipping unusable image entry: {}", e);
                None
            }
        })
        .collect())
}

impl GenerationResult {
    pub fn first_image(&self) -> Option<&GeneratedImage> {
        self.images.first()
    }

    /// URL of the image shown to the user
    pub fn display_url(&self) -> Option<&str> {
        self.first_image().map(|img| img.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_id_allow_list() {
        assert!(is_valid_request_id("764cabcf-b745-4b3e-ae38-1200304cf45b"));
        assert!(is_valid_request_id("abc_DEF-123"));
        assert!(!is_valid_request_id(""));
        assert!(!is_valid_request_id("../secrets"));
        assert!(!is_valid_request_id("abc/status"));
        assert!(!is_valid_request_id("abc?x=1"));
        assert!(!is_valid_request_id("abc%2F"));
        assert!(!is_valid_request_id(&"a".repeat(MAX_REQUEST_ID_LEN + 1)));
    }

    #[test]
    fn handle_parse_rejects_traversal() {
        let err = RequestHandle::parse("../../etc").unwrap_err();
        assert!(matches!(err, MagicError::Protocol(_)));
        assert_eq!(RequestHandle::parse("abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn status_from_wire_strings() {
        let parsed: Vec<GenerationStatus> =
            serde_json::from_value(json!(["IN_QUEUE", "IN_PROGRESS", "COMPLETED", "FAILED", "PAUSED"]))
                .unwrap();
        assert_eq!(
            parsed,
            vec![
                GenerationStatus::Queued,
                GenerationStatus::InProgress,
                GenerationStatus::Completed,
                GenerationStatus::Failed,
                GenerationStatus::Other("PAUSED".to_string()),
            ]
        );
    }

    #[test]
    fn result_preserves_unknown_image_fields() {
        let raw = json!({
            "images": [{
                "url": "https://cdn.example/a.png",
                "content_type": "image/png",
                "file_name": "a.png",
                "width": 1024
            }],
            "description": ""
        });
        let result: GenerationResult = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(result.display_url(), Some("https://cdn.example/a.png"));
        assert_eq!(serde_json::to_value(&result.images).unwrap(), raw["images"]);
    }

    #[test]
    fn result_without_images_deserializes_empty() {
        let result: GenerationResult = serde_json::from_value(json!({})).unwrap();
        assert!(result.images.is_empty());
        assert_eq!(result.display_url(), None);
    }

    #[test]
    fn null_images_and_url_less_entries_read_as_empty() {
        let result: GenerationResult = serde_json::from_value(json!({"images": null})).unwrap();
        assert!(result.images.is_empty());

        let result: GenerationResult =
            serde_json::from_value(json!({"images": [{"file_name": "a.png"}]})).unwrap();
        assert!(result.images.is_empty());

        let result: GenerationResult = serde_json::from_value(json!({
            "images": [{"file_name": "a.png"}, {"url": "https://cdn.example/b.png"}]
        }))
        .unwrap();
        assert_eq!(result.display_url(), Some("https://cdn.example/b.png"));
    }
}
