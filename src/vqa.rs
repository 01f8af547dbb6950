//! VQA session controller.
//!
//! Owns the uploaded image, the backend session id and the chat transcript.
//! An ask is split in two: [`VqaSession::begin_ask`] appends the user turn and
//! builds the request; [`VqaSession::finish_ask`] applies the outcome. The
//! user turn is never retracted.

use crate::backend::Backend;
use crate::error::ClientError;
use crate::intake::Intake;
use crate::model::{ChatMessage, ChatRole, VqaRequest, AUTO_DESCRIPTION_LABEL, SESSION_KEY};
use crate::notify::Notifications;
use crate::store::KeyValueStore;
use serde::Serialize;

/// A request issued by `begin_ask`, tagged with the epoch it belongs to.
#[derive(Debug, Clone)]
pub struct PendingAsk {
    pub epoch: u64,
    pub request: VqaRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptExport {
    pub session_id: Option<String>,
    pub image: Option<String>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Default)]
pub struct VqaSession {
    image: Option<Intake>,
    session_id: Option<String>,
    // Persisted id found at startup, adopted by the first accepted image.
    restored: Option<String>,
    transcript: Vec<ChatMessage>,
    /// Question input buffer; cleared after a successful answer.
    pub question: String,
    epoch: u64,
    in_flight: usize,
}

fn persist(store: &mut dyn KeyValueStore, value: Option<&str>, notes: &mut Notifications) {
    let res = match value {
        Some(v) => store.set(SESSION_KEY, v),
        None => store.remove(SESSION_KEY),
    };
    if let Err(e) = res {
        tracing::error!("failed to persist session: {e:#}");
        notes.error(&format!("Could not save session: {e}"));
    }
}

impl VqaSession {
    pub fn restore(store: &dyn KeyValueStore) -> Self {
        let restored = store.get(SESSION_KEY).filter(|s| !s.is_empty());
        if let Some(id) = restored.as_deref() {
            tracing::debug!(session_id = id, "found persisted session");
        }
        Self {
            restored,
            ..Default::default()
        }
    }

    pub fn image(&self) -> Option<&Intake> {
        self.image.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn restored_session(&self) -> Option<&str> {
        self.restored.as_deref()
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    /// Install a newly accepted image, replacing any previous one wholesale.
    ///
    /// A session belongs to the image that started it, so replacing the image
    /// ends the session. The very first image after startup picks up a
    /// restored session id instead.
    pub fn accept_image(
        &mut self,
        intake: Intake,
        store: &mut dyn KeyValueStore,
        notes: &mut Notifications,
    ) {
        if self.image.is_some() {
            self.reset_session(store, notes);
        } else if let Some(id) = self.restored.take() {
            tracing::info!(session_id = %id, "resuming persisted session");
            self.session_id = Some(id);
        }
        self.image = Some(intake);
    }

    /// Phase one: validate preconditions, append the user turn, build the request.
    pub fn begin_ask(&mut self, question: &str, notes: &mut Notifications) -> Option<PendingAsk> {
        let Some(image) = self.image.as_ref() else {
            notes.error(&ClientError::NoImage.to_string());
            return None;
        };
        let question = question.trim();
        let label = if question.is_empty() {
            AUTO_DESCRIPTION_LABEL
        } else {
            question
        };
        self.transcript.push(ChatMessage::new(ChatRole::User, label));
        self.in_flight += 1;

        let request = VqaRequest {
            image: image.payload.encoded_data.clone(),
            question: (!question.is_empty()).then(|| question.to_string()),
            session_id: self.session_id.clone(),
        };
        tracing::info!(
            session_id = request.session_id.as_deref().unwrap_or("-"),
            "asking"
        );
        Some(PendingAsk {
            epoch: self.epoch,
            request,
        })
    }

    /// Phase two: apply the backend outcome. Returns false if it was stale and dropped.
    pub fn finish_ask(
        &mut self,
        epoch: u64,
        outcome: Result<crate::model::VqaResponse, ClientError>,
        store: &mut dyn KeyValueStore,
        notes: &mut Notifications,
    ) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, "dropping stale VQA response");
            return false;
        }
        match outcome {
            Ok(resp) => {
                tracing::info!(session_id = %resp.session_id, "answer received");
                persist(store, Some(&resp.session_id), notes);
                self.session_id = Some(resp.session_id);
                self.transcript
                    .push(ChatMessage::new(ChatRole::Assistant, resp.answer));
                self.question.clear();
            }
            Err(e) => {
                let msg = e.to_string();
                notes.error(&msg);
                self.transcript.push(ChatMessage::new(ChatRole::Error, msg));
            }
        }
        debug_assert!(self.session_id.is_none() || self.image.is_some());
        true
    }

    /// Drop the image together with its session and transcript.
    pub fn clear_image(&mut self, store: &mut dyn KeyValueStore, notes: &mut Notifications) {
        self.image = None;
        self.question.clear();
        self.reset_session(store, notes);
    }

    /// Start a fresh conversation over the same image.
    pub fn clear_session(&mut self, store: &mut dyn KeyValueStore, notes: &mut Notifications) {
        self.reset_session(store, notes);
        notes.success("Session cleared");
    }

    fn reset_session(&mut self, store: &mut dyn KeyValueStore, notes: &mut Notifications) {
        self.session_id = None;
        self.restored = None;
        self.transcript.clear();
        self.epoch += 1;
        persist(store, None, notes);
    }

    pub fn export(&self) -> TranscriptExport {
        TranscriptExport {
            session_id: self.session_id.clone(),
            image: self.image.as_ref().map(|i| i.file_name.clone()),
            messages: self.transcript.clone(),
        }
    }
}

/// Run both phases of an ask back to back against `backend`.
pub async fn ask(
    session: &mut VqaSession,
    backend: &dyn Backend,
    store: &mut dyn KeyValueStore,
    notes: &mut Notifications,
    question: &str,
) -> bool {
    let Some(pending) = session.begin_ask(question, notes) else {
        return false;
    };
    let outcome = backend.ask(&pending.request).await;
    let ok = outcome.is_ok();
    session.finish_ask(pending.epoch, outcome, store, notes);
    ok
}
