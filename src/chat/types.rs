//! Conversation model and chat errors.

use crate::gateway::{ChatAnswer, GatewayError, QUOTA_GUIDANCE};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking.
    User,
    /// The backend's generated answer.
    Assistant,
}

/// One entry of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// `user-<uuid>` or `assistant-<uuid>`.
    pub id: String,
    /// Author.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// When the message was appended.
    pub timestamp: OffsetDateTime,
    /// Chunk ids the answer was grounded on.
    pub chunks_used: Option<Vec<String>>,
    /// Backend confidence in `[0, 1]`.
    pub confidence: Option<f32>,
}

impl Message {
    pub(crate) fn user(content: &str, timestamp: OffsetDateTime) -> Self {
        Self {
            id: format!("user-{}", Uuid::new_v4()),
            role: Role::User,
            content: content.to_string(),
            timestamp,
            chunks_used: None,
            confidence: None,
        }
    }

    pub(crate) fn assistant(answer: ChatAnswer, timestamp: OffsetDateTime) -> Self {
        Self {
            id: format!("assistant-{}", Uuid::new_v4()),
            role: Role::Assistant,
            content: answer.answer,
            timestamp,
            chunks_used: Some(answer.sources),
            confidence: Some(answer.confidence),
        }
    }
}

/// Conversation state owned by the chat orchestrator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    /// Messages in order of appearance.
    pub messages: Vec<Message>,
    /// A send is waiting on the backend.
    pub is_streaming: bool,
    /// Input should not accept a new message.
    pub input_disabled: bool,
    /// Text of the question in flight.
    pub current_query: Option<String>,
    /// Error from the last failed send.
    pub error: Option<String>,
    /// Chunk ids used by the last answer.
    pub last_sources: Vec<String>,
    /// Confidence of the last answer.
    pub last_confidence: Option<f32>,
}

/// Why a send was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No session, or it expired.
    NoActiveSession,
    /// Nothing left after trimming.
    EmptyContent,
    /// Another send has not finished.
    SendInFlight,
}

/// Result of a send that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Nothing was appended and no request was made.
    Skipped(SkipReason),
    /// The assistant's reply, already appended.
    Answered(Message),
    /// The conversation was cleared or reset before the answer arrived; nothing was appended.
    Discarded,
}

/// Errors from a chat turn. The optimistic user message has been removed when one is returned.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The backend call failed.
    #[error("Failed to send message: {0}")]
    Gateway(#[from] GatewayError),
    /// The session ended before the answer arrived.
    #[error("Session expired while waiting for the answer. Start a new session to keep chatting.")]
    SessionLost,
}

impl ChatError {
    /// Text stored in [`ChatState::error`].
    pub fn user_message(&self) -> String {
        match self {
            Self::Gateway(error) if error.is_quota() => QUOTA_GUIDANCE.to_string(),
            Self::Gateway(error) => error.user_message(),
            Self::SessionLost => self.to_string(),
        }
    }
}
