pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod editor;
pub mod service;
pub mod transform;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use retouch_contracts::events::{artifact_fields, EventWriter};
use retouch_contracts::{HistoryEntry, HistoryLog, ImageArtifact, TransformationRequest};
use serde_json::{json, Value};
use uuid::Uuid;

pub use config::{ResolvedModels, StudioConfig};
pub use conversation::{ChatStatus, CompletedReply, ConversationSession, PendingReply};
pub use dispatch::{Completion, Dispatcher};
pub use editor::{CompletedTransform, EditFailure, EditStatus, EditingSession, PendingTransform};
pub use service::{GeminiService, GenerativeService};
pub use transform::{ChatClient, TransformClient, TransformError, TransformOutput};

/// Identifies one operation issued by one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    session: Uuid,
    seq: u64,
}

impl Ticket {
    pub(crate) fn new(session: Uuid, seq: u64) -> Self {
        Self { session, seq }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// How a session handled an action or a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The result was applied to the session.
    Committed,
    /// The operation failed, or its input was invalid, and the failure was
    /// recorded on the session.
    Failed,
    /// The session was busy; nothing was issued or recorded.
    Rejected,
    /// The completion did not belong to the session's in-flight operation.
    Ignored,
}

/// Composition root: shared clients, the history log and the optional
/// event journal. Sessions are owned by the caller.
pub struct Studio {
    id: String,
    config: StudioConfig,
    models: ResolvedModels,
    transforms: Arc<TransformClient>,
    chat: Arc<ChatClient>,
    history: HistoryLog,
    events: Option<EventWriter>,
}

impl Studio {
    pub fn new(config: StudioConfig, service: Arc<dyn GenerativeService>) -> Self {
        let models = config.resolve_models();
        tracing::debug!(
            service = service.name(),
            image_model = %models.image,
            text_model = %models.text,
            "studio configured"
        );
        let transforms = Arc::new(TransformClient::new(
            Arc::clone(&service),
            models.image.clone(),
            models.text.clone(),
        ));
        let chat = Arc::new(ChatClient::new(service, models.text.clone()));
        Self {
            id: format!("studio-{}", Uuid::new_v4().simple()),
            config,
            models,
            transforms,
            chat,
            history: HistoryLog::new(),
            events: None,
        }
    }

    pub fn from_env() -> Self {
        let config = StudioConfig::from_env();
        let service: Arc<dyn GenerativeService> = Arc::new(GeminiService::new(&config));
        Self::new(config, service)
    }

    /// Starts journaling events to `path` as JSONL.
    pub fn with_events(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        let writer = EventWriter::new(path, self.id.clone());
        writer.emit(
            "studio_started",
            json!({
                "image_model": self.models.image,
                "text_model": self.models.text,
            }),
        )?;
        self.events = Some(writer);
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn models(&self) -> &ResolvedModels {
        &self.models
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn transform_client(&self) -> Arc<TransformClient> {
        Arc::clone(&self.transforms)
    }

    pub fn chat_client(&self) -> Arc<ChatClient> {
        Arc::clone(&self.chat)
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.transform_client(), self.chat_client())
    }

    pub fn open_editor(&self, initial: ImageArtifact) -> EditingSession {
        let session = EditingSession::new(initial);
        self.emit(
            "editor_opened",
            json!({
                "session_id": session.id().to_string(),
                "artifact": artifact_fields(session.current()),
            }),
        );
        session
    }

    pub fn open_conversation(&self) -> ConversationSession {
        let session = ConversationSession::new(Some(self.config.system_instruction.clone()));
        match self.config.greeting.as_deref() {
            Some(greeting) => session.with_greeting(greeting),
            None => session,
        }
    }

    /// Claims `session` for `request`, journaling the start or the
    /// validation failure.
    pub fn begin_transform(
        &self,
        session: &mut EditingSession,
        request: TransformationRequest,
    ) -> Result<PendingTransform, Settled> {
        let kind = request.kind();
        let started = session.try_start(request);
        match &started {
            Ok(pending) => self.emit(
                "transform_started",
                json!({
                    "session_id": session.id().to_string(),
                    "op_seq": pending.ticket().seq(),
                    "kind": kind.as_str(),
                    "aspect_ratio": pending.request().aspect_ratio().map(|ratio| ratio.as_str()),
                    "source_digest": pending.source().digest(),
                }),
            ),
            Err(Settled::Failed) => {
                if let Some(failure) = session.failure() {
                    self.emit_transform_failed(session, failure);
                }
            }
            Err(_) => {}
        }
        started
    }

    pub fn finish_transform(
        &self,
        session: &mut EditingSession,
        completed: CompletedTransform,
    ) -> Settled {
        let kind = completed.kind;
        let seq = completed.ticket.seq();
        let settled = session.complete(completed);
        match settled {
            Settled::Committed if kind.produces_image() => self.emit(
                "transform_committed",
                json!({
                    "session_id": session.id().to_string(),
                    "op_seq": seq,
                    "kind": kind.as_str(),
                    "artifact": artifact_fields(session.current()),
                }),
            ),
            Settled::Committed => self.emit(
                "analysis_ready",
                json!({
                    "session_id": session.id().to_string(),
                    "op_seq": seq,
                    "chars": session.last_analysis().map(|text| text.chars().count()),
                }),
            ),
            Settled::Failed => {
                if let Some(failure) = session.failure() {
                    self.emit_transform_failed(session, failure);
                }
            }
            Settled::Rejected | Settled::Ignored => {}
        }
        settled
    }

    /// Runs one transformation synchronously.
    pub fn apply(&self, session: &mut EditingSession, request: TransformationRequest) -> Settled {
        match self.begin_transform(session, request) {
            Ok(pending) => {
                let completed = pending.execute(&self.transforms);
                self.finish_transform(session, completed)
            }
            Err(settled) => settled,
        }
    }

    pub fn save(&mut self, session: &EditingSession) -> Option<HistoryEntry> {
        let entry = session.save(&mut self.history)?;
        tracing::info!(entry = %entry.id, total = self.history.len(), "saved to history");
        self.emit(
            "history_saved",
            json!({
                "session_id": session.id().to_string(),
                "entry_id": entry.id,
                "artifact": artifact_fields(&entry.thumbnail),
                "created_at": entry.created_at.to_rfc3339(),
            }),
        );
        Some(entry)
    }

    pub fn begin_chat(
        &self,
        session: &mut ConversationSession,
        text: &str,
    ) -> Result<PendingReply, Settled> {
        let pending = session.try_send(text)?;
        self.emit(
            "chat_sent",
            json!({
                "session_id": session.id().to_string(),
                "op_seq": pending.ticket().seq(),
                "chars": pending.message().chars().count(),
                "history_turns": pending.history().len(),
            }),
        );
        Ok(pending)
    }

    pub fn finish_chat(&self, session: &mut ConversationSession, completed: CompletedReply) -> Settled {
        let seq = completed.ticket.seq();
        let error = completed.outcome.as_ref().err().map(ToString::to_string);
        let settled = session.complete(completed);
        match settled {
            Settled::Committed => self.emit(
                "chat_replied",
                json!({
                    "session_id": session.id().to_string(),
                    "op_seq": seq,
                    "chars": session.messages().last().map(|message| message.text.chars().count()),
                    "fallback": error.is_some(),
                }),
            ),
            Settled::Failed => self.emit(
                "chat_failed",
                json!({
                    "session_id": session.id().to_string(),
                    "op_seq": seq,
                    "error": error,
                }),
            ),
            Settled::Rejected | Settled::Ignored => {}
        }
        settled
    }

    /// Sends `text` and waits for the reply.
    pub fn send(&self, session: &mut ConversationSession, text: &str) -> Settled {
        match self.begin_chat(session, text) {
            Ok(pending) => {
                let completed = pending.execute(&self.chat);
                self.finish_chat(session, completed)
            }
            Err(settled) => settled,
        }
    }

    fn emit_transform_failed(&self, session: &EditingSession, failure: &EditFailure) {
        self.emit(
            "transform_failed",
            json!({
                "session_id": session.id().to_string(),
                "kind": failure.kind.as_str(),
                "message": failure.message(),
                "error": failure.error.to_string(),
            }),
        );
    }

    fn emit(&self, event_type: &str, value: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.emit(event_type, value) {
            tracing::warn!(event = event_type, "failed to journal event: {err:#}");
        }
    }
}
