//! Image intake: validate a user-supplied file and encode it for upload.
//!
//! The path prompt and a dropped (pasted) path both end up in [`load_path`],
//! so there is exactly one set of acceptance rules.

use crate::error::ClientError;
use crate::model::{ImagePayload, MimeType, MAX_IMAGE_BYTES};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::{Path, PathBuf};

/// How the file reached the client. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeSource {
    Picker,
    Drop,
}

/// An accepted image: the payload to send and a preview rendition.
#[derive(Debug, Clone)]
pub struct Intake {
    pub payload: ImagePayload,
    /// `data:<mime>;base64,<body>`; keeps the prefix, unlike the payload.
    pub preview: String,
    pub file_name: String,
}

/// Media type a file declares through its extension.
pub fn declared_type_for(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "heic" => "image/heic",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Cheap pre-read check on declared metadata.
///
/// Size is checked before type: an oversized file is `TooLarge` whatever it claims to be.
pub fn check_declared(declared: &str, size: u64) -> Result<MimeType, ClientError> {
    if size > MAX_IMAGE_BYTES {
        return Err(ClientError::TooLarge { size });
    }
    MimeType::from_declared(declared).ok_or_else(|| ClientError::UnsupportedFormat {
        declared: if declared.is_empty() {
            "unknown".into()
        } else {
            declared.to_string()
        },
    })
}

/// Validate already-read bytes and build the payload plus preview.
pub fn validate_and_encode(
    declared: &str,
    bytes: &[u8],
    file_name: &str,
) -> Result<Intake, ClientError> {
    let mime_type = check_declared(declared, bytes.len() as u64)?;
    let encoded_data = STANDARD.encode(bytes);
    let preview = format!("data:{};base64,{}", mime_type.as_str(), encoded_data);
    Ok(Intake {
        payload: ImagePayload {
            mime_type,
            size_bytes: bytes.len() as u64,
            encoded_data,
        },
        preview,
        file_name: file_name.to_string(),
    })
}

/// Validate and read a file from disk.
pub async fn load_path(path: &Path, source: IntakeSource) -> Result<Intake, ClientError> {
    let declared = declared_type_for(path);
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ClientError::Unreadable(format!("{}: {e}", path.display())))?;
    if !meta.is_file() {
        return Err(ClientError::Unreadable(format!(
            "{}: not a regular file",
            path.display()
        )));
    }
    check_declared(&declared, meta.len())?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ClientError::Unreadable(format!("{}: {e}", path.display())))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let intake = validate_and_encode(&declared, &bytes, &file_name)?;
    tracing::debug!(
        ?source,
        file = %file_name,
        size = intake.payload.size_bytes,
        "image accepted"
    );
    Ok(intake)
}

/// Turn a terminal drop (a pasted path) into a filesystem path.
///
/// Terminals paste dropped files quoted, as `file://` URIs, or with
/// backslash-escaped spaces depending on platform.
pub fn normalize_dropped_path(raw: &str) -> PathBuf {
    let mut s = raw.trim().trim_end_matches(['\r', '\n']);
    // Several files dropped at once: take the first line.
    if let Some((first, _)) = s.split_once('\n') {
        s = first.trim();
    }
    for q in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            s = &s[1..s.len() - 1];
        }
    }
    let s = s.strip_prefix("file://").unwrap_or(s);
    PathBuf::from(s.replace("\\ ", " ").replace("%20", " "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_unaccepted_types_without_payload() {
        for declared in ["image/gif", "image/bmp", "text/plain", "", "application/pdf"] {
            let err = validate_and_encode(declared, b"GIF89a", "x").unwrap_err();
            assert!(matches!(err, ClientError::UnsupportedFormat { .. }), "{declared}");
        }
    }

    #[test]
    fn oversized_is_too_large_regardless_of_type() {
        let big = MAX_IMAGE_BYTES + 1;
        assert_eq!(
            check_declared("image/png", big),
            Err(ClientError::TooLarge { size: big })
        );
        assert_eq!(
            check_declared("image/gif", big),
            Err(ClientError::TooLarge { size: big })
        );
        assert_eq!(check_declared("image/webp", MAX_IMAGE_BYTES), Ok(MimeType::Webp));
    }

    #[test]
    fn encoded_data_round_trips_and_preview_keeps_prefix() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(4099).collect();
        let intake = validate_and_encode("image/jpeg", &bytes, "cat.jpg").unwrap();
        assert!(!intake.payload.encoded_data.starts_with("data:"));
        assert_eq!(STANDARD.decode(&intake.payload.encoded_data).unwrap(), bytes);
        assert_eq!(intake.payload.size_bytes, 4099);
        assert!(intake.preview.starts_with("data:image/jpeg;base64,"));
        assert!(intake.preview.ends_with(&intake.payload.encoded_data));
    }

    #[test]
    fn declared_type_follows_extension() {
        assert_eq!(declared_type_for(Path::new("a/B.JPG")), "image/jpeg");
        assert_eq!(declared_type_for(Path::new("shot.webp")), "image/webp");
        assert_eq!(declared_type_for(Path::new("anim.gif")), "image/gif");
        assert_eq!(declared_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn dropped_paths_are_normalized() {
        assert_eq!(normalize_dropped_path("'/tmp/a b.png'\n"), PathBuf::from("/tmp/a b.png"));
        assert_eq!(normalize_dropped_path("file:///tmp/a%20b.png"), PathBuf::from("/tmp/a b.png"));
        assert_eq!(normalize_dropped_path("/tmp/a\\ b.png"), PathBuf::from("/tmp/a b.png"));
        assert_eq!(normalize_dropped_path("\"/x.png\"\n/y.png"), PathBuf::from("/x.png"));
    }

    #[tokio::test]
    async fn picker_and_drop_share_validation() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("img.png");
        std::fs::File::create(&png)
            .unwrap()
            .write_all(b"\x89PNG\r\n\x1a\nrest")
            .unwrap();
        let gif = dir.path().join("img.gif");
        std::fs::write(&gif, b"GIF89a").unwrap();

        for source in [IntakeSource::Picker, IntakeSource::Drop] {
            let ok = load_path(&png, source).await.unwrap();
            assert_eq!(ok.payload.mime_type, MimeType::Png);
            assert_eq!(ok.file_name, "img.png");
            let err = load_path(&gif, source).await.unwrap_err();
            assert!(matches!(err, ClientError::UnsupportedFormat { .. }));
        }
    }

    #[tokio::test]
    async fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_path(&dir.path().join("nope.png"), IntakeSource::Picker)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Unreadable(_)));
        let err = load_path(dir.path(), IntakeSource::Picker).await.unwrap_err();
        assert!(matches!(err, ClientError::Unreadable(_)));
    }

    #[tokio::test]
    async fn oversized_file_rejected_before_read() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("huge.png");
        let f = std::fs::File::create(&p).unwrap();
        f.set_len(MAX_IMAGE_BYTES + 1).unwrap();
        let err = load_path(&p, IntakeSource::Drop).await.unwrap_err();
        assert_eq!(err, ClientError::TooLarge { size: MAX_IMAGE_BYTES + 1 });
    }
}
