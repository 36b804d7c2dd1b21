//! Editing session: one current image, at most one transformation in flight.
//!
//! A transformation is two-phase. [`EditingSession::start`] claims the
//! session and hands back a [`PendingTransform`] that owns everything the
//! network call needs; the caller runs it wherever it likes and feeds the
//! [`CompletedTransform`] back through [`EditingSession::complete`]. The
//! session only accepts the completion matching its in-flight ticket, so a
//! late reply addressed to a discarded session is dropped.

use std::fmt;

use retouch_contracts::{HistoryEntry, HistoryLog, ImageArtifact, TransformKind, TransformationRequest};
use uuid::Uuid;

use crate::transform::{TransformClient, TransformError, TransformOutput};
use crate::{Settled, Ticket};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditFailure {
    pub kind: TransformKind,
    pub error: TransformError,
}

impl EditFailure {
    /// Operation-specific text shown to the user.
    pub fn message(&self) -> &'static str {
        self.kind.failure_message()
    }
}

impl fmt::Display for EditFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditStatus {
    Idle,
    Processing(TransformKind),
    Failed(EditFailure),
}

#[derive(Debug, Clone)]
pub struct PendingTransform {
    ticket: Ticket,
    request: TransformationRequest,
    source: ImageArtifact,
}

impl PendingTransform {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn request(&self) -> &TransformationRequest {
        &self.request
    }

    pub fn source(&self) -> &ImageArtifact {
        &self.source
    }

    /// Issues the single service call for this transformation.
    pub fn execute(self, client: &TransformClient) -> CompletedTransform {
        let outcome = client.execute(&self.request, &self.source);
        CompletedTransform {
            ticket: self.ticket,
            kind: self.request.kind(),
            outcome,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletedTransform {
    pub ticket: Ticket,
    pub kind: TransformKind,
    pub outcome: Result<TransformOutput, TransformError>,
}

#[derive(Debug)]
pub struct EditingSession {
    id: Uuid,
    current: ImageArtifact,
    status: EditStatus,
    last_analysis: Option<String>,
    in_flight: Option<Ticket>,
    issued: u64,
}

impl EditingSession {
    pub fn new(initial: ImageArtifact) -> Self {
        Self {
            id: Uuid::new_v4(),
            current: initial,
            status: EditStatus::Idle,
            last_analysis: None,
            in_flight: None,
            issued: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn current(&self) -> &ImageArtifact {
        &self.current
    }

    pub fn status(&self) -> &EditStatus {
        &self.status
    }

    pub fn last_analysis(&self) -> Option<&str> {
        self.last_analysis.as_deref()
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.status, EditStatus::Processing(_))
    }

    pub fn failure(&self) -> Option<&EditFailure> {
        match &self.status {
            EditStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Claims the session for `request`. Returns `None` without touching the
    /// in-flight operation while one is outstanding, or after recording an
    /// `InvalidInput` failure for a request that must not be sent.
    pub fn start(&mut self, request: TransformationRequest) -> Option<PendingTransform> {
        self.try_start(request).ok()
    }

    /// Like [`start`](Self::start), but says why nothing was issued:
    /// `Settled::Rejected` while busy, `Settled::Failed` when validation
    /// failed and the failure is now the session status.
    pub fn try_start(&mut self, request: TransformationRequest) -> Result<PendingTransform, Settled> {
        let kind = request.kind();
        if let EditStatus::Processing(active) = self.status {
            tracing::debug!(session = %self.id, %active, rejected = %kind, "transformation already in flight");
            return Err(Settled::Rejected);
        }
        if let Err(detail) = request.validate() {
            tracing::warn!(session = %self.id, %kind, "rejected invalid request: {detail}");
            self.status = EditStatus::Failed(EditFailure {
                kind,
                error: TransformError::InvalidInput(detail),
            });
            return Err(Settled::Failed);
        }

        self.issued += 1;
        let ticket = Ticket::new(self.id, self.issued);
        self.in_flight = Some(ticket);
        self.status = EditStatus::Processing(kind);
        tracing::info!(session = %self.id, %kind, seq = ticket.seq(), "transformation started");
        Ok(PendingTransform {
            ticket,
            request,
            source: self.current.clone(),
        })
    }

    pub fn complete(&mut self, completed: CompletedTransform) -> Settled {
        if self.in_flight != Some(completed.ticket) {
            tracing::debug!(session = %self.id, ticket = ?completed.ticket, "dropping stale completion");
            return Settled::Ignored;
        }
        let EditStatus::Processing(kind) = self.status else {
            return Settled::Ignored;
        };
        self.in_flight = None;

        let error = match completed.outcome {
            Ok(TransformOutput::Image(image)) if kind.produces_image() => {
                tracing::info!(session = %self.id, %kind, digest = %image.digest(), "transformation committed");
                self.current = image;
                self.status = EditStatus::Idle;
                return Settled::Committed;
            }
            Ok(TransformOutput::Analysis(text)) if !kind.produces_image() => {
                tracing::info!(session = %self.id, chars = text.chars().count(), "analysis ready");
                self.last_analysis = Some(text);
                self.status = EditStatus::Idle;
                return Settled::Committed;
            }
            Ok(_) => TransformError::NoContent(format!("reply did not match {kind} request")),
            Err(error) => error,
        };
        tracing::warn!(session = %self.id, %kind, "transformation failed: {error}");
        self.status = EditStatus::Failed(EditFailure { kind, error });
        Settled::Failed
    }

    /// Clears a recorded failure. Returns whether there was one.
    pub fn dismiss_error(&mut self) -> bool {
        if matches!(self.status, EditStatus::Failed(_)) {
            self.status = EditStatus::Idle;
            return true;
        }
        false
    }

    /// Appends the current image to `history`. Refused while a
    /// transformation is in flight; every accepted call adds a new entry.
    pub fn save(&self, history: &mut HistoryLog) -> Option<HistoryEntry> {
        if self.is_processing() {
            tracing::debug!(session = %self.id, "save refused while processing");
            return None;
        }
        Some(history.append(self.current.clone()))
    }
}

/// Runs one transformation to completion against `session`.
pub fn apply(
    session: &mut EditingSession,
    client: &TransformClient,
    request: TransformationRequest,
) -> Settled {
    match session.try_start(request) {
        Ok(pending) => {
            let completed = pending.execute(client);
            session.complete(completed)
        }
        Err(settled) => settled,
    }
}
