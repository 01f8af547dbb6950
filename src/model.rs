use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Largest image the client will upload (10 MiB).
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Transcript label used when the user asks without a question.
pub const AUTO_DESCRIPTION_LABEL: &str = "Automatic description";

/// Store key holding the current VQA session id.
pub const SESSION_KEY: &str = "session_id";

/// OCR languages the backend is known to accept, as (code, display name).
pub const KNOWN_LANGUAGES: &[(&str, &str)] = &[("en", "English"), ("ru", "Russian")];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub user_agent: String,
    pub language: String,
    pub output_dir: PathBuf,
    pub state_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MimeType {
    Jpeg,
    Png,
    Webp,
}

impl MimeType {
    /// Map a declared media type onto an accepted format.
    pub fn from_declared(declared: &str) -> Option<Self> {
        match declared.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" => Some(MimeType::Jpeg),
            "image/png" => Some(MimeType::Png),
            "image/webp" => Some(MimeType::Webp),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MimeType::Jpeg => "image/jpeg",
            MimeType::Png => "image/png",
            MimeType::Webp => "image/webp",
        }
    }
}

/// Transport-ready form of an accepted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: MimeType,
    pub size_bytes: u64,
    /// Base64 body only, no `data:` prefix.
    pub encoded_data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    #[serde(default)]
    pub at_utc: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
        }
    }
}

/// Result of the most recent successful recognition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrTask {
    pub task_id: String,
    pub result_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VqaRequest {
    pub image: String,
    pub question: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VqaResponse {
    pub session_id: String,
    pub answer: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrRequest {
    pub image: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResponse {
    pub task_id: String,
    pub text: String,
    #[serde(default)]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
    pub device: String,
}

impl HealthStatus {
    pub fn to_message(&self) -> String {
        format!(
            "Backend {} (model {}, device {})",
            self.status,
            if self.model_loaded { "loaded" } else { "not loaded" },
            self.device
        )
    }
}

/// Display name for a language code, falling back to the code itself.
pub fn language_name(code: &str) -> &str {
    KNOWN_LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_types_are_case_insensitive() {
        assert_eq!(MimeType::from_declared("IMAGE/PNG"), Some(MimeType::Png));
        assert_eq!(MimeType::from_declared(" image/webp "), Some(MimeType::Webp));
        assert_eq!(MimeType::from_declared("image/gif"), None);
        assert_eq!(MimeType::from_declared(""), None);
    }

    #[test]
    fn vqa_request_sends_nulls_for_absent_fields() {
        let req = VqaRequest {
            image: "AAAA".into(),
            question: None,
            session_id: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v["question"].is_null());
        assert!(v["session_id"].is_null());
        assert_eq!(v["image"], "AAAA");
    }

    #[test]
    fn responses_tolerate_missing_extras() {
        let r: VqaResponse =
            serde_json::from_str(r#"{"session_id":"s","answer":"a"}"#).unwrap();
        assert!(r.timestamp.is_none());
        let o: OcrResponse = serde_json::from_str(
            r#"{"task_id":"t","text":"x","download_url":"/api/download/ocr/t"}"#,
        )
        .unwrap();
        assert_eq!(o.download_url.as_deref(), Some("/api/download/ocr/t"));
    }

    #[test]
    fn language_names() {
        assert_eq!(language_name("ru"), "Russian");
        assert_eq!(language_name("de"), "de");
    }
}
