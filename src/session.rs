//! Chat session state machine
//!
//! The session owns the transcript and the active [`SessionConfig`]. It never
//! performs I/O itself: every transcript-extending action hands back a
//! [`CompletionRequest`] for the caller to dispatch, and the caller reports the
//! outcome through [`Session::on_completion_success`] or
//! [`Session::on_completion_failure`].
//!
//! At most one request is in flight at a time. Actions taken while a request
//! is outstanding still extend the transcript immediately; a single follow-up
//! request carrying the newer transcript is issued once the outstanding one
//! resolves, so replies always land in request order.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::completion::CompletionReply;
use crate::error::ChatError;
use crate::state::{
    ChatMessage, ChatRole, Persona, ResponseLength, SessionConfig, TranscriptEntry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    AwaitingCompletion,
}

/// A snapshot of the transcript ready to be sent to the completion endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub ticket: u64,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug)]
pub struct Session {
    transcript: Vec<TranscriptEntry>,
    config: SessionConfig,
    in_flight: Option<u64>,
    follow_up_due: bool,
    next_ticket: u64,
    last_id: u64,
    last_error: Option<String>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            transcript: Vec::new(),
            config,
            in_flight: None,
            follow_up_due: false,
            next_ticket: 1,
            last_id: 0,
            last_error: None,
        }
    }

    /// Emit the directive for the starting configuration
    pub fn start(&mut self) -> Option<CompletionRequest> {
        let SessionConfig { persona, response_length } = self.config;
        self.apply_configuration(persona, response_length)
    }

    pub fn submit_user_message(&mut self, text: impl Into<String>) -> Option<CompletionRequest> {
        self.append(ChatRole::User, text.into());
        self.request_or_defer()
    }

    /// Record a persona/length change as one system directive and ask for a reply
    pub fn apply_configuration(
        &mut self,
        persona: Persona,
        response_length: ResponseLength,
    ) -> Option<CompletionRequest> {
        self.config = SessionConfig { persona, response_length };
        info!(%persona, %response_length, "applying session configuration");
        self.append(ChatRole::System, persona.directive());
        self.request_or_defer()
    }

    pub fn on_completion_success(
        &mut self,
        ticket: u64,
        reply: CompletionReply,
    ) -> Option<CompletionRequest> {
        if !self.settle(ticket) {
            return None;
        }
        if reply.role != ChatRole::Assistant {
            debug!(
                role = reply.role.as_str(),
                "completion reply with unexpected role recorded as assistant"
            );
        }
        self.append(ChatRole::Assistant, reply.content);
        self.last_error = None;
        self.take_follow_up()
    }

    pub fn on_completion_failure(
        &mut self,
        ticket: u64,
        err: &ChatError,
    ) -> Option<CompletionRequest> {
        if !self.settle(ticket) {
            return None;
        }
        error!(ticket, error = %err, "completion request failed");
        self.last_error = Some(err.to_string());
        self.take_follow_up()
    }

    /// Route a finished request to the success or failure transition
    pub fn finish(
        &mut self,
        ticket: u64,
        result: Result<CompletionReply, ChatError>,
    ) -> Option<CompletionRequest> {
        match result {
            Ok(reply) => self.on_completion_success(ticket, reply),
            Err(e) => self.on_completion_failure(ticket, &e),
        }
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn status(&self) -> SessionStatus {
        if self.in_flight.is_some() {
            SessionStatus::AwaitingCompletion
        } else {
            SessionStatus::Idle
        }
    }

    pub fn is_composing(&self) -> bool {
        self.status() == SessionStatus::AwaitingCompletion
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn append(&mut self, role: ChatRole, content: String) {
        let id = self.next_id();
        self.transcript.push(TranscriptEntry { id, role, content });
    }

    fn next_id(&mut self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        self.last_id = now.max(self.last_id + 1);
        self.last_id
    }

    fn request_or_defer(&mut self) -> Option<CompletionRequest> {
        if self.in_flight.is_some() {
            debug!("completion already in flight, deferring request");
            self.follow_up_due = true;
            None
        } else {
            Some(self.dispatch())
        }
    }

    fn dispatch(&mut self) -> CompletionRequest {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(ticket);

        let request = CompletionRequest {
            ticket,
            messages: self.transcript.iter().map(ChatMessage::from).collect(),
            max_tokens: self.config.response_length.max_tokens(),
        };
        debug!(
            ticket,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "issuing completion request"
        );
        request
    }

    /// Clear the in-flight slot if `ticket` owns it
    fn settle(&mut self, ticket: u64) -> bool {
        if self.in_flight != Some(ticket) {
            warn!(
                ticket,
                in_flight = ?self.in_flight,
                "ignoring result for a request that is not in flight"
            );
            return false;
        }
        self.in_flight = None;
        true
    }

    fn take_follow_up(&mut self) -> Option<CompletionRequest> {
        if std::mem::take(&mut self.follow_up_due) {
            Some(self.dispatch())
        } else {
            None
        }
    }
}
