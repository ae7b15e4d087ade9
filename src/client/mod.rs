pub mod terminal;
pub mod transport;
pub mod turn;
pub mod view;

use crate::models::chat::{ ChatMessage, Role, SendMessageRequest };
use chrono::Utc;
use thiserror::Error;

/// Shown in place of a reply when a turn could not complete.
pub const APOLOGY: &str =
    "Apologies, traveler. The threads of time have become tangled. Please try your question again.";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("relay request failed: {0}")] Http(#[from] reqwest::Error),
    #[error("relay returned {status}: {body}")] Status {
        status: u16,
        body: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingResponse,
    Streaming,
}

/// Conversation state owned by one chat view. Only one turn may be in
/// flight; every mutation goes through the methods below.
#[derive(Debug, Clone)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    pending_input: String,
    phase: TurnPhase,
    last_id: i64,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            pending_input: String::new(),
            phase: TurnPhase::Idle,
            last_id: 0,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.pending_input = text.into();
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn is_in_flight(&self) -> bool {
        self.phase != TurnPhase::Idle
    }

    /// Whether the send control should accept input right now.
    pub fn can_send(&self) -> bool {
        !self.is_in_flight() && !self.pending_input.trim().is_empty()
    }

    /// Submits whatever is in the compose box.
    pub fn submit_pending(&mut self) -> Option<SendMessageRequest> {
        let text = std::mem::take(&mut self.pending_input);
        let request = self.submit(&text);
        if request.is_none() {
            self.pending_input = text;
        }
        request
    }

    /// Starts a turn. Returns `None` for blank text or while another turn is
    /// in flight. The returned history is the conversation as it stood before
    /// the new user message.
    pub fn submit(&mut self, text: &str) -> Option<SendMessageRequest> {
        let trimmed = text.trim();
        if trimmed.is_empty() || self.is_in_flight() {
            return None;
        }

        let history = self.messages.clone();
        let message = self.next_message(Role::User, trimmed);
        self.messages.push(message);
        self.pending_input.clear();
        self.phase = TurnPhase::AwaitingResponse;

        Some(SendMessageRequest::new(trimmed, history))
    }

    /// Appends the empty assistant message that streamed text will fill.
    pub fn begin_reply(&mut self) {
        let placeholder = self.next_message(Role::Assistant, "");
        self.messages.push(placeholder);
        self.phase = TurnPhase::Streaming;
    }

    /// Appends `fragment` to the in-progress reply. Ignored unless the last
    /// message is the assistant's.
    pub fn append_fragment(&mut self, fragment: &str) -> bool {
        if self.phase != TurnPhase::Streaming {
            return false;
        }
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                *last = last.with_appended(fragment);
                true
            }
            _ => false,
        }
    }

    pub fn finish_turn(&mut self) {
        self.phase = TurnPhase::Idle;
    }

    /// Ends the current turn as failed. Text that already streamed stays as it
    /// is; a turn with nothing to show gets the apology instead.
    pub fn fail_turn(&mut self) {
        match self.phase {
            TurnPhase::Idle => {
                return;
            }
            TurnPhase::AwaitingResponse => {
                let apology = self.next_message(Role::Assistant, APOLOGY);
                self.messages.push(apology);
            }
            TurnPhase::Streaming => {
                if let Some(last) = self.messages.last_mut() {
                    if last.role == Role::Assistant && last.content.is_empty() {
                        *last = last.with_appended(APOLOGY);
                    }
                }
            }
        }
        self.phase = TurnPhase::Idle;
    }

    /// The typing cursor belongs to the last message only, and only while its
    /// reply is still streaming.
    pub fn shows_cursor(&self, index: usize) -> bool {
        self.phase == TurnPhase::Streaming &&
            index + 1 == self.messages.len() &&
            self.messages[index].role == Role::Assistant
    }

    fn next_message(&mut self, role: Role, content: &str) -> ChatMessage {
        let now = Utc::now().timestamp_millis();
        let id = now.max(self.last_id + 1);
        self.last_id = id;
        ChatMessage::new(id.to_string(), role, content, now)
    }
}
