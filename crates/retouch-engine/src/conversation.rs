//! Conversation session: an append-only transcript with one reply in flight.

use retouch_contracts::{Message, ProviderTurn, Role, Transcript};
use uuid::Uuid;

use crate::transform::{ChatClient, TransformError};
use crate::{Settled, Ticket};

/// Assistant text used when the service answered without any text.
pub const EMPTY_REPLY_FALLBACK: &str = "I didn't catch that.";
/// Transient notice shown when the service could not be reached.
pub const CONNECTION_FALLBACK: &str = "Sorry, I'm having trouble connecting to the server.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    Idle,
    Awaiting,
}

/// Everything one chat call needs, detached from the session.
#[derive(Debug, Clone)]
pub struct PendingReply {
    ticket: Ticket,
    system_instruction: Option<String>,
    history: Vec<ProviderTurn>,
    message: String,
}

impl PendingReply {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Transcript as it stood before the user message was appended.
    pub fn history(&self) -> &[ProviderTurn] {
        &self.history
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn execute(self, client: &ChatClient) -> CompletedReply {
        let outcome = client.reply(
            self.system_instruction.as_deref(),
            &self.history,
            &self.message,
        );
        CompletedReply {
            ticket: self.ticket,
            outcome,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletedReply {
    pub ticket: Ticket,
    pub outcome: Result<String, TransformError>,
}

#[derive(Debug)]
pub struct ConversationSession {
    id: Uuid,
    system_instruction: Option<String>,
    transcript: Transcript,
    status: ChatStatus,
    notice: Option<String>,
    in_flight: Option<Ticket>,
    issued: u64,
}

impl ConversationSession {
    pub fn new(system_instruction: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            system_instruction: system_instruction.filter(|text| !text.trim().is_empty()),
            transcript: Transcript::new(),
            status: ChatStatus::Idle,
            notice: None,
            in_flight: None,
            issued: 0,
        }
    }

    /// Seeds the transcript with an assistant greeting.
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        if !greeting.trim().is_empty() {
            self.transcript.push(Role::Assistant, greeting);
        }
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction.as_deref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_notice(&mut self) -> bool {
        self.notice.take().is_some()
    }

    /// Appends `text` as a user message and claims the session for the
    /// reply. The message stays in the transcript whatever the outcome.
    pub fn send(&mut self, text: &str) -> Option<PendingReply> {
        self.try_send(text).ok()
    }

    /// Like [`send`](Self::send), but says why nothing was issued:
    /// `Settled::Rejected` while a reply is pending, `Settled::Failed` for
    /// blank input, which sets the notice.
    pub fn try_send(&mut self, text: &str) -> Result<PendingReply, Settled> {
        if self.status == ChatStatus::Awaiting {
            tracing::debug!(session = %self.id, "reply already pending");
            return Err(Settled::Rejected);
        }
        let text = text.trim();
        if text.is_empty() {
            let err = TransformError::InvalidInput("message is empty".to_string());
            self.notice = Some(err.to_string());
            return Err(Settled::Failed);
        }

        let history = self.transcript.to_provider_turns();
        self.transcript.push(Role::User, text);
        self.notice = None;
        self.issued += 1;
        let ticket = Ticket::new(self.id, self.issued);
        self.in_flight = Some(ticket);
        self.status = ChatStatus::Awaiting;
        tracing::info!(session = %self.id, seq = ticket.seq(), turns = history.len(), "chat sent");
        Ok(PendingReply {
            ticket,
            system_instruction: self.system_instruction.clone(),
            history,
            message: text.to_string(),
        })
    }

    pub fn complete(&mut self, completed: CompletedReply) -> Settled {
        if self.in_flight != Some(completed.ticket) || self.status != ChatStatus::Awaiting {
            tracing::debug!(session = %self.id, ticket = ?completed.ticket, "dropping stale reply");
            return Settled::Ignored;
        }
        self.in_flight = None;
        self.status = ChatStatus::Idle;

        match completed.outcome {
            Ok(text) => {
                self.transcript.push(Role::Assistant, text);
                Settled::Committed
            }
            Err(TransformError::NoContent(detail)) => {
                tracing::warn!(session = %self.id, "empty chat reply: {detail}");
                self.transcript.push(Role::Assistant, EMPTY_REPLY_FALLBACK);
                Settled::Committed
            }
            Err(TransformError::ServiceUnavailable(detail)) => {
                tracing::warn!(session = %self.id, "chat failed: {detail}");
                self.notice = Some(CONNECTION_FALLBACK.to_string());
                Settled::Failed
            }
            Err(err @ TransformError::InvalidInput(_)) => {
                self.notice = Some(err.to_string());
                Settled::Failed
            }
        }
    }
}

/// Sends `text` and waits for the reply.
pub fn send(session: &mut ConversationSession, client: &ChatClient, text: &str) -> Settled {
    match session.try_send(text) {
        Ok(pending) => {
            let completed = pending.execute(client);
            session.complete(completed)
        }
        Err(settled) => settled,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::service::ContentReply;
    use crate::testing::ScriptedService;

    fn chat(service: &Arc<ScriptedService>) -> ChatClient {
        ChatClient::new(service.clone(), "chat-model")
    }

    fn texts(session: &ConversationSession) -> Vec<(Role, &str)> {
        session
            .messages()
            .iter()
            .map(|message| (message.role, message.text.as_str()))
            .collect()
    }

    #[test]
    fn reply_is_appended_after_user_message() {
        let service = ScriptedService::new();
        service.push_chat(Ok(ContentReply::from_text("Try white.")));
        let mut session = ConversationSession::new(Some("Be brief.".to_string()));

        assert_eq!(send(&mut session, &chat(&service), " which color? "), Settled::Committed);
        assert_eq!(
            texts(&session),
            vec![(Role::User, "which color?"), (Role::Assistant, "Try white.")]
        );
        assert_eq!(session.status(), ChatStatus::Idle);
        let calls = service.chat_calls();
        assert_eq!(calls[0].system_instruction.as_deref(), Some("Be brief."));
        assert!(calls[0].history.is_empty());
    }

    #[test]
    fn history_carries_greeting_and_prior_turns() {
        let service = ScriptedService::new();
        service.push_chat(Ok(ContentReply::from_text("Blue works.")));
        service.push_chat(Ok(ContentReply::from_text("Sure.")));
        let client = chat(&service);
        let mut session = ConversationSession::new(None).with_greeting("Hello!");

        send(&mut session, &client, "suggest a color");
        send(&mut session, &client, "thanks");

        let calls = service.chat_calls();
        assert_eq!(calls[0].history, vec![ProviderTurn::new(Role::Assistant, "Hello!")]);
        assert_eq!(
            calls[1].history,
            vec![
                ProviderTurn::new(Role::Assistant, "Hello!"),
                ProviderTurn::new(Role::User, "suggest a color"),
                ProviderTurn::new(Role::Assistant, "Blue works."),
            ]
        );
        assert_eq!(calls[1].history[0].role, "model");
        assert_eq!(calls[1].message, "thanks");
    }

    #[test]
    fn user_message_is_visible_while_awaiting() {
        let mut session = ConversationSession::new(None);
        let pending = session.send("hi").expect("send accepted");
        assert_eq!(session.status(), ChatStatus::Awaiting);
        assert_eq!(texts(&session), vec![(Role::User, "hi")]);
        assert!(pending.history().is_empty());
        assert_eq!(pending.message(), "hi");
    }

    #[test]
    fn send_while_awaiting_is_rejected() {
        let service = ScriptedService::new();
        let mut session = ConversationSession::new(None);
        let _pending = session.send("first");

        assert_eq!(send(&mut session, &chat(&service), "second"), Settled::Rejected);
        assert_eq!(texts(&session), vec![(Role::User, "first")]);
        assert!(service.chat_calls().is_empty());
    }

    #[test]
    fn service_failure_keeps_user_message_and_sets_notice() {
        let service = ScriptedService::new();
        service.push_chat(Err(anyhow::anyhow!("dns failure")));
        let mut session = ConversationSession::new(None);

        assert_eq!(send(&mut session, &chat(&service), "hello"), Settled::Failed);
        assert_eq!(texts(&session), vec![(Role::User, "hello")]);
        assert_eq!(session.status(), ChatStatus::Idle);
        assert_eq!(session.notice(), Some(CONNECTION_FALLBACK));
        assert!(session.dismiss_notice());
        assert_eq!(session.notice(), None);
    }

    #[test]
    fn empty_reply_degrades_to_fallback_text() {
        let service = ScriptedService::new();
        service.push_chat(Ok(ContentReply::default()));
        let mut session = ConversationSession::new(None);

        assert_eq!(send(&mut session, &chat(&service), "hello"), Settled::Committed);
        assert_eq!(
            texts(&session),
            vec![(Role::User, "hello"), (Role::Assistant, EMPTY_REPLY_FALLBACK)]
        );
    }

    #[test]
    fn blank_input_sets_notice_without_request() {
        let service = ScriptedService::new();
        let mut session = ConversationSession::new(None);

        assert_eq!(send(&mut session, &chat(&service), "   "), Settled::Failed);
        assert!(session.messages().is_empty());
        assert!(session.notice().is_some_and(|notice| notice.contains("invalid input")));
        assert!(service.chat_calls().is_empty());
    }

    #[test]
    fn reply_for_replaced_session_is_dropped() {
        let service = ScriptedService::new();
        service.push_chat(Ok(ContentReply::from_text("late")));
        let client = chat(&service);

        let mut old = ConversationSession::new(None);
        let pending = old.send("hello").expect("send accepted");
        let mut fresh = ConversationSession::new(None);

        assert_eq!(fresh.complete(pending.execute(&client)), Settled::Ignored);
        assert!(fresh.messages().is_empty());
        assert_eq!(fresh.status(), ChatStatus::Idle);
    }
}
