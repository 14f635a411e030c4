//! Conversation orchestration against the active session.

use crate::chat::types::{ChatError, ChatState, Message, SendOutcome, SkipReason};
use crate::clock::Clock;
use crate::gateway::{ChatQuery, RemoteGateway};
use crate::metrics::UsageMetrics;
use crate::session::SessionController;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Append-only conversation with optimistic user messages.
///
/// At most one send is in flight. A failed send removes its own user message and nothing else,
/// so the sequence is exactly what it was before the call.
pub struct ChatOrchestrator {
    gateway: Arc<dyn RemoteGateway>,
    sessions: Arc<SessionController>,
    clock: Arc<dyn Clock>,
    metrics: Arc<UsageMetrics>,
    default_top_k: usize,
    in_flight: AtomicBool,
    state: Mutex<ChatState>,
}

impl ChatOrchestrator {
    /// Assemble the orchestrator; `default_top_k` is used by [`Self::send_message`].
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        sessions: Arc<SessionController>,
        clock: Arc<dyn Clock>,
        metrics: Arc<UsageMetrics>,
        default_top_k: usize,
    ) -> Self {
        Self {
            gateway,
            sessions,
            clock,
            metrics,
            default_top_k,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(ChatState::default()),
        }
    }

    /// Ask a question with the configured retrieval breadth.
    pub async fn send_message(&self, content: &str) -> Result<SendOutcome, ChatError> {
        self.send_message_with_top_k(content, self.default_top_k)
            .await
    }

    /// Ask a question retrieving `top_k` chunks.
    pub async fn send_message_with_top_k(
        &self,
        content: &str,
        top_k: usize,
    ) -> Result<SendOutcome, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(SendOutcome::Skipped(SkipReason::EmptyContent));
        }
        let Some(session_id) = self.sessions.current_id() else {
            tracing::debug!("Ignoring chat message without an active session");
            return Ok(SendOutcome::Skipped(SkipReason::NoActiveSession));
        };
        let Some(mut guard) = SendGuard::acquire(self) else {
            tracing::debug!("Ignoring chat message while another is in flight");
            return Ok(SendOutcome::Skipped(SkipReason::SendInFlight));
        };

        let user = Message::user(content, self.clock.now());
        {
            let mut state = self.state();
            state.is_streaming = true;
            state.input_disabled = true;
            state.error = None;
            state.current_query = Some(content.to_string());
            state.messages.push(user.clone());
        }
        guard.pending = Some(user.id.clone());

        let query = ChatQuery {
            session_id: session_id.clone(),
            query: content.to_string(),
            top_k,
        };
        let result = match self.gateway.chat(query).await {
            Ok(_) if !self.sessions.is_current(&session_id) => Err(ChatError::SessionLost),
            Ok(answer) => Ok(answer),
            Err(error) => Err(ChatError::Gateway(error)),
        };

        match result {
            Ok(answer) => {
                let reply = Message::assistant(answer, self.clock.now());
                let kept = {
                    let mut state = self.state();
                    let asked = state.messages.iter().any(|m| m.id == user.id);
                    if asked {
                        state.last_sources = reply.chunks_used.clone().unwrap_or_default();
                        state.last_confidence = reply.confidence;
                        state.messages.push(reply.clone());
                    }
                    asked
                };
                guard.pending = None;
                if !kept {
                    tracing::debug!(%session_id, "Conversation cleared while waiting; dropping answer");
                    return Ok(SendOutcome::Discarded);
                }
                self.metrics.record_chat_turn();
                tracing::info!(
                    %session_id,
                    top_k,
                    sources = self.state().last_sources.len(),
                    "Chat answer received"
                );
                Ok(SendOutcome::Answered(reply))
            }
            Err(error) => {
                let message = error.user_message();
                {
                    let mut state = self.state();
                    state.messages.retain(|m| m.id != user.id);
                    state.error = Some(message);
                }
                guard.pending = None;
                self.metrics.record_failed_turn();
                tracing::error!(%session_id, error = %error, "Chat message failed");
                Err(error)
            }
        }
    }

    /// Remove every message.
    pub fn clear_messages(&self) {
        self.state().messages.clear();
    }

    /// Return to the initial state.
    pub fn reset(&self) {
        *self.state() = ChatState::default();
    }

    /// Copy of the current conversation state.
    pub fn snapshot(&self) -> ChatState {
        self.state().clone()
    }

    /// Whether a send is waiting on the backend.
    pub fn is_sending(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single-flight token. Dropping it releases the slot and, if the send was cancelled before it
/// settled, removes the optimistic message.
struct SendGuard<'a> {
    chat: &'a ChatOrchestrator,
    pending: Option<String>,
}

impl<'a> SendGuard<'a> {
    fn acquire(chat: &'a ChatOrchestrator) -> Option<Self> {
        chat.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                chat,
                pending: None,
            })
    }
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.chat.state();
            if let Some(id) = self.pending.take() {
                state.messages.retain(|m| m.id != id);
            }
            state.is_streaming = false;
            state.input_disabled = false;
            state.current_query = None;
        }
        self.chat.in_flight.store(false, Ordering::Release);
    }
}
