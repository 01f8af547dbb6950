//! Request executor.
//!
//! Runs backend calls and file reads off the UI thread. Requests are not
//! serialized: each runs to completion and reports back, so when two overlap
//! whichever finishes last is what the state ends up showing.

use super::dispatch::Pipeline;
use crate::backend::Backend;
use crate::error::ClientError;
use crate::intake::{self, Intake, IntakeSource};
use crate::model::{HealthStatus, OcrResponse, VqaResponse};
use crate::ocr::PendingRecognition;
use crate::vqa::PendingAsk;
use anyhow::Result;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;

/// Work requested by the UI layer.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    LoadImage {
        target: Pipeline,
        path: PathBuf,
        source: IntakeSource,
    },
    Ask(PendingAsk),
    Recognize(PendingRecognition),
    Download {
        task_id: String,
    },
    Health,
    Quit,
}

impl UiCommand {
    /// Short name for logs; requests carry whole encoded images.
    pub(crate) fn label(&self) -> &'static str {
        match self {
            UiCommand::LoadImage { .. } => "load_image",
            UiCommand::Ask(_) => "ask",
            UiCommand::Recognize(_) => "recognize",
            UiCommand::Download { .. } => "download",
            UiCommand::Health => "health",
            UiCommand::Quit => "quit",
        }
    }
}

/// Completions delivered back to the UI layer.
#[derive(Debug)]
pub(crate) enum AppEvent {
    ImageLoaded {
        target: Pipeline,
        result: Result<Intake, ClientError>,
    },
    AskFinished {
        epoch: u64,
        outcome: Result<VqaResponse, ClientError>,
    },
    RecognizeFinished {
        epoch: u64,
        outcome: Result<OcrResponse, ClientError>,
    },
    DownloadFinished {
        task_id: String,
        outcome: Result<Bytes, ClientError>,
    },
    Health(Result<HealthStatus, ClientError>),
}

const REQUEST_ABORTED: &str = "Request failed unexpectedly";

/// Completion reported when the task running `cmd` dies before finishing, so
/// the UI still releases whatever control the command was holding.
fn aborted(cmd: &UiCommand) -> Option<AppEvent> {
    let err = ClientError::Transport(REQUEST_ABORTED.into());
    let ev = match cmd {
        UiCommand::LoadImage { target, .. } => AppEvent::ImageLoaded {
            target: *target,
            result: Err(ClientError::Unreadable(REQUEST_ABORTED.into())),
        },
        UiCommand::Ask(pending) => AppEvent::AskFinished {
            epoch: pending.epoch,
            outcome: Err(err),
        },
        UiCommand::Recognize(pending) => AppEvent::RecognizeFinished {
            epoch: pending.epoch,
            outcome: Err(err),
        },
        UiCommand::Download { task_id } => AppEvent::DownloadFinished {
            task_id: task_id.clone(),
            outcome: Err(err),
        },
        UiCommand::Health => AppEvent::Health(Err(err)),
        UiCommand::Quit => return None,
    };
    Some(ev)
}

/// Run `cmd` in its own task; a panic there becomes an `aborted` completion.
async fn supervise(backend: Arc<dyn Backend>, cmd: UiCommand) -> Option<AppEvent> {
    let fallback = aborted(&cmd);
    let label = cmd.label();
    match tokio::spawn(execute(backend, cmd)).await {
        Ok(ev) => ev,
        Err(e) => {
            tracing::error!(cmd = label, "request task failed: {e}");
            fallback
        }
    }
}

async fn execute(backend: Arc<dyn Backend>, cmd: UiCommand) -> Option<AppEvent> {
    let ev = match cmd {
        UiCommand::LoadImage {
            target,
            path,
            source,
        } => AppEvent::ImageLoaded {
            target,
            result: intake::load_path(&path, source).await,
        },
        UiCommand::Ask(pending) => AppEvent::AskFinished {
            epoch: pending.epoch,
            outcome: backend.ask(&pending.request).await,
        },
        UiCommand::Recognize(pending) => AppEvent::RecognizeFinished {
            epoch: pending.epoch,
            outcome: backend.recognize(&pending.request).await,
        },
        UiCommand::Download { task_id } => {
            let outcome = backend.download_ocr(&task_id).await;
            AppEvent::DownloadFinished { task_id, outcome }
        }
        UiCommand::Health => AppEvent::Health(backend.health().await),
        UiCommand::Quit => return None,
    };
    Some(ev)
}

/// Execute UI commands until `Quit` (or the command channel closes).
pub(crate) async fn run_controller(
    backend: Arc<dyn Backend>,
    event_tx: UnboundedSender<AppEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut tasks: JoinSet<Option<AppEvent>> = JoinSet::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Quit) | None => break,
                    Some(cmd) => {
                        tracing::debug!(cmd = cmd.label(), "executing");
                        tasks.spawn(supervise(backend.clone(), cmd));
                    }
                }
            }
            // Parked while idle so the select only wakes on commands.
            done = async {
                if tasks.is_empty() {
                    futures::future::pending().await
                } else {
                    tasks.join_next().await
                }
            } => {
                match done {
                    Some(Ok(Some(ev))) => {
                        let _ = event_tx.send(ev);
                    }
                    Some(Ok(None)) | None => {}
                    Some(Err(e)) => {
                        tracing::error!("request task failed: {e}");
                    }
                }
            }
        }
    }

    // Nothing is cancellable mid-flight from the UI; on quit we just stop listening.
    tasks.abort_all();
    Ok(())
}
