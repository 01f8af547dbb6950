//! Error taxonomy shared by intake and both controllers.

use serde_json::Value;
use thiserror::Error;

pub const VQA_FALLBACK: &str = "Error processing the request";
pub const OCR_FALLBACK: &str = "Error recognizing text";
pub const DOWNLOAD_FAILED: &str = "Error downloading the file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Precondition,
    Backend,
    Transport,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Unsupported file format ({declared}). Use JPEG, PNG or WebP.")]
    UnsupportedFormat { declared: String },
    #[error("File size exceeds 10MB.")]
    TooLarge { size: u64 },
    #[error("Could not read file: {0}")]
    Unreadable(String),
    #[error("Please upload an image")]
    NoImage,
    #[error("No result to download")]
    NoTask,
    #[error("{message}")]
    Backend { status: u16, message: String },
    #[error("{0}")]
    Transport(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::UnsupportedFormat { .. }
            | ClientError::TooLarge { .. }
            | ClientError::Unreadable(_) => ErrorKind::Validation,
            ClientError::NoImage | ClientError::NoTask => ErrorKind::Precondition,
            ClientError::Backend { .. } => ErrorKind::Backend,
            ClientError::Transport(_) => ErrorKind::Transport,
        }
    }
}

/// Pull the human-readable message out of a non-2xx body.
///
/// Prefers `detail.message`, then a plain string `detail`, then `fallback`.
pub fn extract_detail(body: &str, fallback: &str) -> String {
    let Ok(v) = serde_json::from_str::<Value>(body) else {
        return fallback.to_string();
    };
    match v.get("detail") {
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_message_wins() {
        let body = r#"{"detail":{"error":"X","message":"bad image","code":"C"}}"#;
        assert_eq!(extract_detail(body, VQA_FALLBACK), "bad image");
    }

    #[test]
    fn plain_detail_string() {
        assert_eq!(extract_detail(r#"{"detail":"nope"}"#, VQA_FALLBACK), "nope");
    }

    #[test]
    fn falls_back_when_detail_missing_or_unusable() {
        assert_eq!(extract_detail(r#"{}"#, OCR_FALLBACK), OCR_FALLBACK);
        assert_eq!(extract_detail(r#"{"detail":{"code":1}}"#, OCR_FALLBACK), OCR_FALLBACK);
        assert_eq!(extract_detail(r#"{"detail":[1,2]}"#, OCR_FALLBACK), OCR_FALLBACK);
        assert_eq!(extract_detail("<html>502</html>", OCR_FALLBACK), OCR_FALLBACK);
    }

    #[test]
    fn kinds() {
        assert_eq!(ClientError::TooLarge { size: 1 }.kind(), ErrorKind::Validation);
        assert_eq!(ClientError::NoTask.kind(), ErrorKind::Precondition);
        assert_eq!(
            ClientError::Backend {
                status: 422,
                message: "m".into()
            }
            .to_string(),
            "m"
        );
    }
}
