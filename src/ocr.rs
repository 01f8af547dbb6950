//! OCR task controller.
//!
//! Holds the OCR image, the last successful task and what the result area
//! shows. Download availability follows the task alone, so a failed
//! re-recognition leaves an earlier result downloadable.

use crate::backend::Backend;
use crate::error::ClientError;
use crate::intake::Intake;
use crate::model::{OcrRequest, OcrResponse, OcrTask};
use crate::notify::Notifications;
use bytes::Bytes;
use std::path::{Path, PathBuf};

pub const EMPTY_RESULT_HINT: &str = "Upload an image and press \"Recognize text\"";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResultView {
    #[default]
    Empty,
    Pending,
    Text(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct PendingRecognition {
    pub epoch: u64,
    pub request: OcrRequest,
}

#[derive(Debug, Default)]
pub struct OcrWorkspace {
    image: Option<Intake>,
    task: Option<OcrTask>,
    view: ResultView,
    pub language: String,
    epoch: u64,
    recognizing: usize,
    downloading: usize,
}

/// File name the artifact for `task_id` is delivered under.
pub fn artifact_file_name(task_id: &str) -> String {
    let safe: String = task_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("ocr_result_{safe}.txt")
}

impl OcrWorkspace {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            ..Default::default()
        }
    }

    pub fn image(&self) -> Option<&Intake> {
        self.image.as_ref()
    }

    pub fn task(&self) -> Option<&OcrTask> {
        self.task.as_ref()
    }

    pub fn view(&self) -> &ResultView {
        &self.view
    }

    pub fn download_enabled(&self) -> bool {
        self.task.is_some()
    }

    pub fn is_recognizing(&self) -> bool {
        self.recognizing > 0
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading > 0
    }

    /// Replace the image. An earlier task stays downloadable; recognitions
    /// still running for the old image are dropped when they land.
    pub fn accept_image(&mut self, intake: Intake) {
        self.image = Some(intake);
        self.epoch += 1;
        if self.view == ResultView::Pending {
            self.view = match self.task.as_ref() {
                Some(task) => ResultView::Text(task.result_text.clone()),
                None => ResultView::Empty,
            };
        }
    }

    pub fn begin_recognize(&mut self, notes: &mut Notifications) -> Option<PendingRecognition> {
        let Some(image) = self.image.as_ref() else {
            notes.error(&ClientError::NoImage.to_string());
            return None;
        };
        self.recognizing += 1;
        self.view = ResultView::Pending;
        tracing::info!(language = %self.language, "recognizing");
        Some(PendingRecognition {
            epoch: self.epoch,
            request: OcrRequest {
                image: image.payload.encoded_data.clone(),
                language: self.language.clone(),
            },
        })
    }

    /// Apply a recognition outcome. Returns false if it was stale and dropped.
    pub fn finish_recognize(
        &mut self,
        epoch: u64,
        outcome: Result<OcrResponse, ClientError>,
        notes: &mut Notifications,
    ) -> bool {
        self.recognizing = self.recognizing.saturating_sub(1);
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, "dropping stale OCR response");
            return false;
        }
        match outcome {
            Ok(resp) => {
                tracing::info!(task_id = %resp.task_id, chars = resp.text.len(), "text recognized");
                self.view = ResultView::Text(resp.text.clone());
                self.task = Some(OcrTask {
                    task_id: resp.task_id,
                    result_text: resp.text,
                });
                notes.success("Text recognized successfully");
            }
            Err(e) => {
                let msg = e.to_string();
                notes.error(&msg);
                self.view = ResultView::Failed(msg);
            }
        }
        true
    }

    /// Precondition for a download: the task id to fetch.
    pub fn begin_download(&mut self, notes: &mut Notifications) -> Option<String> {
        match self.task.as_ref() {
            Some(task) => {
                self.downloading += 1;
                Some(task.task_id.clone())
            }
            None => {
                notes.error(&ClientError::NoTask.to_string());
                None
            }
        }
    }

    /// Deliver a fetched artifact into `output_dir`.
    pub fn finish_download(
        &mut self,
        task_id: &str,
        outcome: Result<Bytes, ClientError>,
        output_dir: &Path,
        notes: &mut Notifications,
    ) -> Option<PathBuf> {
        self.downloading = self.downloading.saturating_sub(1);
        let body = match outcome {
            Ok(body) => body,
            Err(e) => {
                notes.error(&e.to_string());
                return None;
            }
        };
        let path = output_dir.join(artifact_file_name(task_id));
        let written = std::fs::create_dir_all(output_dir).and_then(|_| std::fs::write(&path, &body));
        match written {
            Ok(()) => {
                tracing::info!(path = %path.display(), bytes = body.len(), "artifact saved");
                notes.success("File downloaded successfully");
                Some(path)
            }
            Err(e) => {
                tracing::error!("failed to write {}: {e}", path.display());
                notes.error(&format!("Could not save {}: {e}", path.display()));
                None
            }
        }
    }

    /// Drop image and task; the result area goes back to its hint.
    pub fn clear_image(&mut self) {
        self.image = None;
        self.task = None;
        self.view = ResultView::Empty;
        self.epoch += 1;
    }
}

/// Recognize the current image end to end.
pub async fn recognize(ws: &mut OcrWorkspace, backend: &dyn Backend, notes: &mut Notifications) -> bool {
    let Some(pending) = ws.begin_recognize(notes) else {
        return false;
    };
    let outcome = backend.recognize(&pending.request).await;
    let ok = outcome.is_ok();
    ws.finish_recognize(pending.epoch, outcome, notes);
    ok
}

/// Fetch and deliver the artifact of the current task.
pub async fn download(
    ws: &mut OcrWorkspace,
    backend: &dyn Backend,
    output_dir: &Path,
    notes: &mut Notifications,
) -> Option<PathBuf> {
    let task_id = ws.begin_download(notes)?;
    let outcome = backend.download_ocr(&task_id).await;
    ws.finish_download(&task_id, outcome, output_dir, notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{Call, FakeBackend};
    use crate::error::DOWNLOAD_FAILED;
    use crate::intake::validate_and_encode;
    use crate::notify::NoticeKind;

    fn loaded() -> OcrWorkspace {
        let mut ws = OcrWorkspace::new("eng");
        ws.accept_image(validate_and_encode("image/webp", b"RIFF....WEBP", "scan.webp").unwrap());
        ws
    }

    #[tokio::test]
    async fn scenario_c_recognize_then_download() {
        let dir = tempfile::tempdir().unwrap();
        let mut notes = Notifications::default();
        let mut ws = loaded();
        let backend = FakeBackend::default().recognized("t-1", "Hello").serves(b"Hello");

        assert!(!ws.download_enabled());
        assert!(recognize(&mut ws, &backend, &mut notes).await);
        assert_eq!(ws.view(), &ResultView::Text("Hello".into()));
        assert!(ws.download_enabled());
        assert_eq!(notes.active().last().unwrap().kind, NoticeKind::Success);

        let path = download(&mut ws, &backend, dir.path(), &mut notes).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "ocr_result_t-1.txt");
        assert_eq!(std::fs::read(&path).unwrap(), b"Hello");

        let calls = backend.calls();
        match (&calls[0], &calls[1]) {
            (Call::Recognize(req), Call::Download(id)) => {
                assert_eq!(req.language, "eng");
                assert_eq!(req.image, ws.image().unwrap().payload.encoded_data);
                assert_eq!(id, "t-1");
            }
            other => panic!("unexpected calls {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_image_is_local() {
        let mut notes = Notifications::default();
        let mut ws = OcrWorkspace::new("en");
        let backend = FakeBackend::default();
        assert!(!recognize(&mut ws, &backend, &mut notes).await);
        assert!(backend.calls().is_empty());
        assert_eq!(notes.active()[0].message, ClientError::NoImage.to_string());
        assert_eq!(ws.view(), &ResultView::Empty);
    }

    #[tokio::test]
    async fn download_without_task_is_local() {
        let dir = tempfile::tempdir().unwrap();
        let mut notes = Notifications::default();
        let mut ws = loaded();
        let backend = FakeBackend::default();
        assert!(download(&mut ws, &backend, dir.path(), &mut notes).await.is_none());
        assert!(backend.calls().is_empty());
        assert_eq!(notes.active()[0].message, ClientError::NoTask.to_string());
    }

    #[tokio::test]
    async fn failed_rerecognition_keeps_previous_download() {
        let mut notes = Notifications::default();
        let mut ws = loaded();
        let backend = FakeBackend::default()
            .recognized("t-1", "Hello")
            .recognize_fails(ClientError::Backend {
                status: 500,
                message: "OCR failed".into(),
            });
        recognize(&mut ws, &backend, &mut notes).await;
        assert!(!recognize(&mut ws, &backend, &mut notes).await);

        assert_eq!(ws.view(), &ResultView::Failed("OCR failed".into()));
        assert_eq!(ws.task().unwrap().task_id, "t-1");
        assert!(ws.download_enabled());
        assert!(!ws.is_recognizing());
        assert_eq!(notes.active().last().unwrap().kind, NoticeKind::Error);
    }

    #[tokio::test]
    async fn failed_first_recognition_leaves_download_disabled() {
        let mut notes = Notifications::default();
        let mut ws = loaded();
        let backend = FakeBackend::default()
            .recognize_fails(ClientError::Transport("Could not connect to server".into()));
        recognize(&mut ws, &backend, &mut notes).await;
        assert!(ws.task().is_none());
        assert!(!ws.download_enabled());
    }

    #[tokio::test]
    async fn failed_download_delivers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut notes = Notifications::default();
        let mut ws = loaded();
        let backend = FakeBackend::default()
            .recognized("t-2", "x")
            .download_fails(ClientError::Backend {
                status: 404,
                message: DOWNLOAD_FAILED.into(),
            });
        recognize(&mut ws, &backend, &mut notes).await;
        assert!(download(&mut ws, &backend, dir.path(), &mut notes).await.is_none());
        assert!(!dir.path().join("ocr_result_t-2.txt").exists());
        assert_eq!(notes.active().last().unwrap().message, DOWNLOAD_FAILED);
        assert!(!ws.is_downloading());
    }

    #[tokio::test]
    async fn repeated_download_refetches() {
        let dir = tempfile::tempdir().unwrap();
        let mut notes = Notifications::default();
        let mut ws = loaded();
        let backend = FakeBackend::default()
            .recognized("t-3", "v1")
            .serves(b"v1")
            .serves(b"v1 again");
        recognize(&mut ws, &backend, &mut notes).await;
        download(&mut ws, &backend, dir.path(), &mut notes).await.unwrap();
        let p = download(&mut ws, &backend, dir.path(), &mut notes).await.unwrap();
        assert_eq!(std::fs::read(p).unwrap(), b"v1 again");
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn clear_image_resets_everything_idempotently() {
        let mut notes = Notifications::default();
        let mut ws = loaded();
        let backend = FakeBackend::default().recognized("t-1", "Hello");
        recognize(&mut ws, &backend, &mut notes).await;

        ws.clear_image();
        ws.clear_image();
        assert!(ws.image().is_none());
        assert!(ws.task().is_none());
        assert!(!ws.download_enabled());
        assert_eq!(ws.view(), &ResultView::Empty);
    }

    #[test]
    fn late_result_after_clear_is_dropped() {
        let mut notes = Notifications::default();
        let mut ws = loaded();
        let pending = ws.begin_recognize(&mut notes).unwrap();
        assert_eq!(ws.view(), &ResultView::Pending);
        ws.clear_image();
        let applied = ws.finish_recognize(
            pending.epoch,
            Ok(OcrResponse {
                task_id: "late".into(),
                text: "late".into(),
                download_url: None,
            }),
            &mut notes,
        );
        assert!(!applied);
        assert!(ws.task().is_none());
        assert!(!ws.is_recognizing());
    }

    #[test]
    fn late_result_after_replace_is_dropped() {
        let mut notes = Notifications::default();
        let mut ws = loaded();
        let first = ws.begin_recognize(&mut notes).unwrap();
        ws.finish_recognize(
            first.epoch,
            Ok(OcrResponse {
                task_id: "t-a".into(),
                text: "text of A".into(),
                download_url: None,
            }),
            &mut notes,
        );
        let pending = ws.begin_recognize(&mut notes).unwrap();
        ws.accept_image(validate_and_encode("image/png", b"\x89PNGdata", "b.png").unwrap());
        assert_eq!(ws.view(), &ResultView::Text("text of A".into()));

        let applied = ws.finish_recognize(
            pending.epoch,
            Ok(OcrResponse {
                task_id: "t-late".into(),
                text: "late text of A".into(),
                download_url: None,
            }),
            &mut notes,
        );
        assert!(!applied);
        assert_eq!(ws.image().unwrap().file_name, "b.png");
        assert_eq!(ws.task().unwrap().task_id, "t-a");
        assert_eq!(ws.view(), &ResultView::Text("text of A".into()));
        assert!(ws.download_enabled());
        assert!(!ws.is_recognizing());
    }

    #[test]
    fn artifact_names_are_path_safe() {
        assert_eq!(artifact_file_name("t-1"), "ocr_result_t-1.txt");
        assert_eq!(artifact_file_name("../etc/x"), "ocr_result____etc_x.txt");
        assert_eq!(
            artifact_file_name("3f2b_ab-12"),
            "ocr_result_3f2b_ab-12.txt"
        );
    }
}
