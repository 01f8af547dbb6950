//! Action dispatch table.
//!
//! Every user action maps to one transition on [`AppState`] and returns the
//! commands the controller must run. Completions come back through
//! [`apply_event`]. Neither function touches the terminal or the network.

use super::controller::{AppEvent, UiCommand};
use crate::intake::{normalize_dropped_path, IntakeSource};
use crate::model::KNOWN_LANGUAGES;
use crate::notify::Notifications;
use crate::ocr::OcrWorkspace;
use crate::store::KeyValueStore;
use crate::vqa::VqaSession;
use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pipeline {
    Vqa,
    Ocr,
}

#[derive(Debug, Clone)]
pub(crate) enum Action {
    /// Path typed into the file prompt.
    PickImage(Pipeline, PathBuf),
    /// Raw text a terminal pasted for a dropped file.
    DropImage(Pipeline, String),
    Ask,
    ClearVqaImage,
    ClearSession,
    ExportTranscript,
    Recognize,
    CycleLanguage,
    ClearOcrImage,
    Download,
    DismissNotification,
    CheckHealth,
}

/// Image reads in flight, per pipeline.
#[derive(Debug, Default)]
pub(crate) struct Loading {
    vqa: usize,
    ocr: usize,
}

impl Loading {
    fn slot(&mut self, target: Pipeline) -> &mut usize {
        match target {
            Pipeline::Vqa => &mut self.vqa,
            Pipeline::Ocr => &mut self.ocr,
        }
    }

    fn start(&mut self, target: Pipeline) {
        *self.slot(target) += 1;
    }

    fn finish(&mut self, target: Pipeline) {
        let n = self.slot(target);
        *n = n.saturating_sub(1);
    }

    pub fn is_loading(&self, target: Pipeline) -> bool {
        match target {
            Pipeline::Vqa => self.vqa > 0,
            Pipeline::Ocr => self.ocr > 0,
        }
    }
}

pub(crate) struct AppState {
    pub vqa: VqaSession,
    pub ocr: OcrWorkspace,
    pub notes: Notifications,
    pub store: Box<dyn KeyValueStore>,
    pub output_dir: PathBuf,
    pub health: Option<String>,
    pub loading: Loading,
}

impl AppState {
    pub fn new(store: Box<dyn KeyValueStore>, language: &str, output_dir: PathBuf) -> Self {
        let vqa = VqaSession::restore(store.as_ref());
        Self {
            vqa,
            ocr: OcrWorkspace::new(language),
            notes: Notifications::default(),
            store,
            output_dir,
            health: None,
            loading: Loading::default(),
        }
    }

    fn export_transcript(&self) -> Result<PathBuf> {
        let stamp = time::OffsetDateTime::now_utc()
            .format(&time::macros::format_description!(
                "[year][month][day]-[hour][minute][second]"
            ))
            .unwrap_or_else(|_| "now".into());
        let path = self.output_dir.join(format!("vqa_transcript_{stamp}.json"));
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("create {}", self.output_dir.display()))?;
        let data = serde_json::to_vec_pretty(&self.vqa.export())?;
        std::fs::write(&path, data).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// Apply one user action. Returns the commands the controller must execute.
pub(crate) fn dispatch(state: &mut AppState, action: Action) -> Vec<UiCommand> {
    let mut out = Vec::new();
    match action {
        Action::PickImage(target, path) => {
            state.loading.start(target);
            out.push(UiCommand::LoadImage {
                target,
                path,
                source: IntakeSource::Picker,
            });
        }
        Action::DropImage(target, raw) => {
            state.loading.start(target);
            out.push(UiCommand::LoadImage {
                target,
                path: normalize_dropped_path(&raw),
                source: IntakeSource::Drop,
            });
        }
        Action::Ask => {
            // The ask control is disabled while a request is outstanding.
            if state.vqa.is_busy() {
                return out;
            }
            let question = state.vqa.question.clone();
            if let Some(pending) = state.vqa.begin_ask(&question, &mut state.notes) {
                out.push(UiCommand::Ask(pending));
            }
        }
        Action::ClearVqaImage => {
            state.vqa.clear_image(state.store.as_mut(), &mut state.notes);
        }
        Action::ClearSession => {
            state.vqa.clear_session(state.store.as_mut(), &mut state.notes);
        }
        Action::ExportTranscript => match state.export_transcript() {
            Ok(path) => {
                state
                    .notes
                    .success(&format!("Transcript saved: {}", path.display()));
            }
            Err(e) => {
                state.notes.error(&format!("Transcript export failed: {e:#}"));
            }
        },
        Action::Recognize => {
            if state.ocr.is_recognizing() {
                return out;
            }
            if let Some(pending) = state.ocr.begin_recognize(&mut state.notes) {
                out.push(UiCommand::Recognize(pending));
            }
        }
        Action::CycleLanguage => {
            let idx = KNOWN_LANGUAGES
                .iter()
                .position(|(code, _)| *code == state.ocr.language)
                .map(|i| (i + 1) % KNOWN_LANGUAGES.len())
                .unwrap_or(0);
            state.ocr.language = KNOWN_LANGUAGES[idx].0.to_string();
        }
        Action::ClearOcrImage => state.ocr.clear_image(),
        Action::Download => {
            if state.ocr.is_downloading() {
                return out;
            }
            if let Some(task_id) = state.ocr.begin_download(&mut state.notes) {
                out.push(UiCommand::Download { task_id });
            }
        }
        Action::DismissNotification => {
            state.notes.dismiss_latest();
        }
        Action::CheckHealth => out.push(UiCommand::Health),
    }
    out
}

/// Fold a controller completion back into the state.
pub(crate) fn apply_event(state: &mut AppState, ev: AppEvent) {
    match ev {
        AppEvent::ImageLoaded { target, result } => {
            state.loading.finish(target);
            match result {
                Ok(intake) => match target {
                    Pipeline::Vqa => {
                        state
                            .vqa
                            .accept_image(intake, state.store.as_mut(), &mut state.notes)
                    }
                    Pipeline::Ocr => state.ocr.accept_image(intake),
                },
                // Validation failures leave the pipeline exactly as it was.
                Err(e) => {
                    state.notes.error(&e.to_string());
                }
            }
        }
        AppEvent::AskFinished { epoch, outcome } => {
            state
                .vqa
                .finish_ask(epoch, outcome, state.store.as_mut(), &mut state.notes);
        }
        AppEvent::RecognizeFinished { epoch, outcome } => {
            state.ocr.finish_recognize(epoch, outcome, &mut state.notes);
        }
        AppEvent::DownloadFinished { task_id, outcome } => {
            let dir = state.output_dir.clone();
            if let Some(path) = state
                .ocr
                .finish_download(&task_id, outcome, &dir, &mut state.notes)
            {
                tracing::debug!(path = %path.display(), "download delivered");
            }
        }
        AppEvent::Health(res) => match res {
            Ok(h) => state.health = Some(h.to_message()),
            Err(e) => {
                state.health = Some(format!("Backend unavailable: {e}"));
                state.notes.error(&e.to_string());
            }
        },
    }
}
